//! How actions reach the database.
//!
//! [`DirectTransport`] calls the engine in-process; [`WireTransport`] sends
//! each action as one command through the MongoDB driver to a loopback
//! server. Both fill the same [`Reply`] shape so outcomes compare across modes.

mod direct;
mod wire;

pub use direct::DirectTransport;
pub use wire::WireTransport;

use bson::{Bson, Document};
use mongodb::error::ErrorKind;
use parity_engine::DbError;
use parity_suite::{Mode, Outcome, Value};
use parity_wire::WireError;

use crate::action::Action;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Wire(#[from] WireError),

    /// A command or write the server rejected. Displays the server's
    /// message unchanged.
    #[error("{message}")]
    Server { code: i32, message: String },

    #[error(transparent)]
    Driver(mongodb::error::Error),

    #[error("unexpected reply to {command}: {detail}")]
    Reply { command: &'static str, detail: String },
}

impl From<mongodb::error::Error> for TransportError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Command(e) => TransportError::Server {
                code: e.code,
                message: e.message.clone(),
            },
            _ => TransportError::Driver(err),
        }
    }
}

pub trait Transport {
    fn mode(&self) -> Mode;

    /// Run one action against `collection`.
    fn execute(&mut self, collection: &str, action: &Action) -> Result<Reply, TransportError>;

    /// Release the database (and server, for wire) and persist the fixture.
    fn close(self) -> Result<(), TransportError>
    where
        Self: Sized;
}

/// The result fields an action produced. Unset fields stay out of the outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub count: Option<i64>,
    pub matched_count: Option<i64>,
    pub modified_count: Option<i64>,
    pub deleted_count: Option<i64>,
    pub upserted_id: Option<Bson>,
    pub documents: Option<Vec<Document>>,
}

impl Reply {
    pub fn count(n: usize) -> Self {
        Self {
            count: Some(to_i64(n)),
            ..Default::default()
        }
    }

    /// `count` plus the documents themselves.
    pub fn documents(docs: Vec<Document>) -> Self {
        Self {
            count: Some(to_i64(docs.len())),
            documents: Some(docs),
            ..Default::default()
        }
    }

    /// A zero-or-one document result, as `findOne` and `findAndModify` report it.
    pub fn optional(doc: Option<Document>) -> Self {
        match doc {
            Some(doc) => Self::documents(vec![doc]),
            None => Self::count(0),
        }
    }

    pub fn updated(matched: i64, modified: i64, upserted_id: Option<Bson>) -> Self {
        Self {
            matched_count: Some(matched),
            modified_count: Some(modified),
            upserted_id,
            ..Default::default()
        }
    }

    pub fn deleted(n: i64) -> Self {
        Self {
            deleted_count: Some(n),
            ..Default::default()
        }
    }

    pub fn index_created(name: String) -> Self {
        Self::documents(vec![bson::doc! { "indexName": name }])
    }

    /// Copy the fields into `outcome`, converting BSON into suite values.
    pub fn fill(self, outcome: &mut Outcome) {
        outcome.count = self.count;
        outcome.matched_count = self.matched_count;
        outcome.modified_count = self.modified_count;
        outcome.deleted_count = self.deleted_count;
        outcome.upserted_id = self.upserted_id.as_ref().map(Value::from_bson);
        outcome.documents = self
            .documents
            .map(|docs| docs.iter().map(Value::from_document).collect());
    }
}

pub(crate) fn to_i64(n: impl TryInto<i64>) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}
