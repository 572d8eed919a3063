use std::path::Path;

use parity_engine::Database;
use parity_suite::Mode;
use tracing::debug;

use super::{Reply, Transport, TransportError, to_i64};
use crate::action::Action;

/// Calls straight into an in-process [`Database`].
#[derive(Debug)]
pub struct DirectTransport {
    db: Database,
}

impl DirectTransport {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            db: Database::in_memory(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl Transport for DirectTransport {
    fn mode(&self) -> Mode {
        Mode::Api
    }

    fn execute(&mut self, collection: &str, action: &Action) -> Result<Reply, TransportError> {
        debug!(collection, ?action, "direct call");
        let coll = self.db.collection(collection);
        coll.ensure();

        let reply = match action {
            Action::InsertOne { doc } => {
                coll.insert_one(doc.clone())?;
                Reply::count(1)
            }
            Action::InsertMany { docs } => {
                let result = coll.insert_many(docs.clone())?;
                Reply::count(result.inserted_ids.len())
            }
            Action::Find { filter, options } => Reply::documents(coll.find(filter, options)?),
            Action::FindOne { filter } => Reply::optional(coll.find_one(filter)?),
            Action::UpdateOne { filter, update, options } => {
                let r = coll.update_one(filter, update, options.upsert)?;
                Reply::updated(to_i64(r.matched), to_i64(r.modified), r.upserted_id)
            }
            Action::UpdateMany { filter, update, options } => {
                let r = coll.update_many(filter, update, options.upsert)?;
                Reply::updated(to_i64(r.matched), to_i64(r.modified), r.upserted_id)
            }
            Action::ReplaceOne { filter, replacement } => {
                let r = coll.replace_one(filter, replacement, false)?;
                Reply::updated(to_i64(r.matched), to_i64(r.modified), None)
            }
            Action::DeleteOne { filter } => Reply::deleted(to_i64(coll.delete_one(filter)?.deleted)),
            Action::DeleteMany { filter } => Reply::deleted(to_i64(coll.delete_many(filter)?.deleted)),
            Action::FindAndModify { filter, options } => {
                Reply::optional(coll.find_and_modify(filter, options)?)
            }
            Action::Distinct { field, filter } => Reply::count(coll.distinct(field, filter)?.len()),
            Action::Aggregate { pipeline } => Reply::documents(coll.aggregate(pipeline)?),
            Action::CreateIndex { model } => Reply::index_created(coll.create_index(model.clone())?),
            Action::ListIndexes => Reply::count(coll.list_indexes()?.len()),
            Action::DropIndex { name } => {
                coll.drop_index(name)?;
                Reply::default()
            }
        };
        Ok(reply)
    }

    fn close(self) -> Result<(), TransportError> {
        Ok(self.db.close()?)
    }
}
