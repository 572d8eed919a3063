use std::sync::Arc;

use bson::{Document, doc};
use parity_engine::{DEFAULT_DB_NAME, Database, DbError};
use tracing::debug;

use crate::message::Message;

/// Routes decoded requests to the database and shapes the replies.
pub struct Session {
    db: Arc<Database>,
}

impl Session {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Run the command carried by `request`. Always produces a reply body:
    /// failures become `{ok: 0, errmsg, code, codeName}`.
    pub fn handle(&self, request: Message) -> Document {
        let cmd = request.into_command();
        let db_name = cmd.get_str("$db").unwrap_or(DEFAULT_DB_NAME).to_string();
        match self.db.run_command(&db_name, &cmd) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(error = %e, "command failed");
                error_reply(&e)
            }
        }
    }
}

pub fn error_reply(err: &DbError) -> Document {
    doc! {
        "ok": 0.0,
        "errmsg": err.to_string(),
        "code": err.code(),
        "codeName": err.code_name(),
    }
}
