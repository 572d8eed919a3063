//! Named-command channel: the document-in, document-out interface the wire
//! server routes requests through.

use bson::{Bson, Document, doc};
use tracing::debug;

use crate::collection::Collection;
use crate::database::Database;
use crate::error::DbError;
use crate::index::{IndexModel, default_index_name};
use crate::mutation::Update;
use crate::options::{FindAndModifyOptions, FindOptions};

const MAX_BSON_OBJECT_SIZE: i32 = 16 * 1024 * 1024;
const MAX_MESSAGE_SIZE_BYTES: i32 = 48_000_000;

impl Database {
    /// Run one command document against database `db` and return the reply.
    ///
    /// Command-level failures come back as `Err`. Per-document write
    /// failures of `insert`, `update` and `delete` are reported inside the
    /// reply under `writeErrors`, next to the counts of what succeeded.
    pub fn run_command(&self, db: &str, cmd: &Document) -> Result<Document, DbError> {
        let Some(name) = cmd.keys().next() else {
            return Err(DbError::bad_value("empty command document"));
        };
        debug!(command = %name, db, "running command");

        match name.as_str() {
            "ping" => Ok(doc! { "ok": 1.0 }),
            "hello" | "isMaster" | "ismaster" => Ok(doc! {
                "helloOk": true,
                "isWritablePrimary": true,
                "ismaster": true,
                "maxBsonObjectSize": MAX_BSON_OBJECT_SIZE,
                "maxMessageSizeBytes": MAX_MESSAGE_SIZE_BYTES,
                "maxWriteBatchSize": 100_000,
                "minWireVersion": 0,
                "maxWireVersion": 21,
                "readOnly": false,
                "ok": 1.0,
            }),
            "buildInfo" | "buildinfo" => Ok(doc! {
                "version": env!("CARGO_PKG_VERSION"),
                "maxBsonObjectSize": MAX_BSON_OBJECT_SIZE,
                "ok": 1.0,
            }),
            "listCollections" => {
                let batch: Vec<Bson> = self
                    .list_collection_names()
                    .into_iter()
                    .map(|name| Bson::Document(doc! { "name": name, "type": "collection" }))
                    .collect();
                Ok(cursor_reply(&format!("{db}.$cmd.listCollections"), batch))
            }
            // Idempotent: an existing collection is left as it is.
            "create" => {
                self.collection(collection_name(cmd, "create")?).ensure();
                Ok(doc! { "ok": 1.0 })
            }
            "drop" => {
                let coll = self.collection(collection_name(cmd, "drop")?);
                let indexes = coll.list_indexes()?.len();
                coll.drop();
                Ok(doc! { "ns": coll.namespace(), "nIndexesWas": count(indexes), "ok": 1.0 })
            }
            "insert" => self.insert_command(cmd),
            "update" => self.update_command(cmd),
            "delete" => self.delete_command(cmd),
            "find" => self.find_command(cmd),
            "count" => {
                let coll = self.collection(collection_name(cmd, "count")?);
                let n = coll.count_documents(&optional_doc(cmd, "query")?)?;
                Ok(doc! { "n": n as i64, "ok": 1.0 })
            }
            "distinct" => {
                let coll = self.collection(collection_name(cmd, "distinct")?);
                let key = cmd
                    .get_str("key")
                    .map_err(|_| DbError::bad_value("distinct requires a string 'key'"))?;
                let values = coll.distinct(key, &optional_doc(cmd, "query")?)?;
                Ok(doc! { "values": values, "ok": 1.0 })
            }
            "aggregate" => {
                let coll = self.collection(collection_name(cmd, "aggregate")?);
                let pipeline = document_array(cmd, "pipeline")?;
                let batch = coll.aggregate(&pipeline)?;
                Ok(cursor_reply(&coll.namespace(), batch.into_iter().map(Bson::Document).collect()))
            }
            "findAndModify" | "findandmodify" => self.find_and_modify_command(cmd, name),
            "createIndexes" => self.create_indexes_command(cmd),
            "listIndexes" => {
                let coll = self.collection(collection_name(cmd, "listIndexes")?);
                let batch = coll.list_indexes()?;
                Ok(cursor_reply(&coll.namespace(), batch.into_iter().map(Bson::Document).collect()))
            }
            "dropIndexes" | "deleteIndexes" => {
                let coll = self.collection(collection_name(cmd, name)?);
                let before = coll.list_indexes()?.len();
                let index = match cmd.get("index") {
                    Some(Bson::String(name)) => name.clone(),
                    Some(Bson::Document(keys)) => default_index_name(keys),
                    _ => return Err(DbError::bad_value("dropIndexes requires an 'index' name")),
                };
                coll.drop_index(&index)?;
                Ok(doc! { "nIndexesWas": count(before), "ok": 1.0 })
            }
            other => Err(DbError::CommandNotFound(other.to_string())),
        }
    }

    fn insert_command(&self, cmd: &Document) -> Result<Document, DbError> {
        let coll = self.collection(collection_name(cmd, "insert")?);
        let documents = document_array(cmd, "documents")?;
        let ordered = flag(cmd, "ordered", true);

        let mut n = 0;
        let mut write_errors = Vec::new();
        for (index, doc) in documents.into_iter().enumerate() {
            match coll.insert_one(doc) {
                Ok(_) => n += 1,
                Err(e) => {
                    write_errors.push(write_error(index, &e));
                    if ordered {
                        break;
                    }
                }
            }
        }
        Ok(write_reply(doc! { "n": n }, write_errors))
    }

    fn update_command(&self, cmd: &Document) -> Result<Document, DbError> {
        let coll = self.collection(collection_name(cmd, "update")?);
        let updates = document_array(cmd, "updates")?;
        let ordered = flag(cmd, "ordered", true);

        let mut n: i64 = 0;
        let mut modified: i64 = 0;
        let mut upserted = Vec::new();
        let mut write_errors = Vec::new();
        for (index, statement) in updates.iter().enumerate() {
            match run_update_statement(&coll, statement) {
                Ok(result) => {
                    n += result.matched as i64;
                    modified += result.modified as i64;
                    if let Some(id) = result.upserted_id {
                        n += 1;
                        upserted.push(Bson::Document(doc! { "index": count(index), "_id": id }));
                    }
                }
                Err(e) => {
                    write_errors.push(write_error(index, &e));
                    if ordered {
                        break;
                    }
                }
            }
        }

        let mut reply = doc! { "n": n, "nModified": modified };
        if !upserted.is_empty() {
            reply.insert("upserted", upserted);
        }
        Ok(write_reply(reply, write_errors))
    }

    fn delete_command(&self, cmd: &Document) -> Result<Document, DbError> {
        let coll = self.collection(collection_name(cmd, "delete")?);
        let deletes = document_array(cmd, "deletes")?;
        let ordered = flag(cmd, "ordered", true);

        let mut n: i64 = 0;
        let mut write_errors = Vec::new();
        for (index, statement) in deletes.iter().enumerate() {
            let outcome = optional_doc(statement, "q").and_then(|filter| {
                let multi = match statement.get("limit") {
                    Some(limit) => integer(limit).unwrap_or(0) == 0,
                    None => true,
                };
                coll.delete(&filter, multi)
            });
            match outcome {
                Ok(result) => n += result.deleted as i64,
                Err(e) => {
                    write_errors.push(write_error(index, &e));
                    if ordered {
                        break;
                    }
                }
            }
        }
        Ok(write_reply(doc! { "n": n }, write_errors))
    }

    fn find_command(&self, cmd: &Document) -> Result<Document, DbError> {
        let coll = self.collection(collection_name(cmd, "find")?);
        let filter = optional_doc(cmd, "filter")?;
        let mut options = FindOptions {
            sort: cmd.get_document("sort").ok().cloned(),
            projection: cmd.get_document("projection").ok().cloned(),
            ..Default::default()
        };
        if let Some(skip) = cmd.get("skip").and_then(integer) {
            options.skip = u64::try_from(skip)
                .map_err(|_| DbError::bad_value("skip value must be non-negative"))?;
        }
        if let Some(limit) = cmd.get("limit").and_then(integer) {
            options.limit = limit;
        }
        let batch = coll.find(&filter, &options)?;
        Ok(cursor_reply(&coll.namespace(), batch.into_iter().map(Bson::Document).collect()))
    }

    fn find_and_modify_command(&self, cmd: &Document, name: &str) -> Result<Document, DbError> {
        let coll = self.collection(collection_name(cmd, name)?);
        let filter = optional_doc(cmd, "query")?;
        let options = FindAndModifyOptions {
            sort: cmd.get_document("sort").ok().cloned(),
            update: cmd.get_document("update").ok().cloned(),
            remove: flag(cmd, "remove", false),
            new: flag(cmd, "new", false),
            upsert: flag(cmd, "upsert", false),
            projection: cmd.get_document("fields").ok().cloned(),
        };
        let value = coll.find_and_modify(&filter, &options)?;
        let n = i32::from(value.is_some());
        Ok(doc! {
            "lastErrorObject": { "n": n },
            "value": value.map_or(Bson::Null, Bson::Document),
            "ok": 1.0,
        })
    }

    fn create_indexes_command(&self, cmd: &Document) -> Result<Document, DbError> {
        let coll = self.collection(collection_name(cmd, "createIndexes")?);
        let specs = document_array(cmd, "indexes")?;
        let created_collection = !self.read(|cols| cols.contains_key(coll.name()));
        let before = if created_collection { 1 } else { coll.list_indexes()?.len() };

        for spec in &specs {
            let keys = spec
                .get_document("key")
                .map_err(|_| DbError::bad_value("index specification requires a 'key' document"))?;
            let mut model = IndexModel::new(keys.clone()).unique(flag(spec, "unique", false));
            if let Ok(name) = spec.get_str("name") {
                model = model.with_name(name);
            }
            coll.create_index(model)?;
        }

        let after = coll.list_indexes()?.len();
        Ok(doc! {
            "createdCollectionAutomatically": created_collection,
            "numIndexesBefore": count(before),
            "numIndexesAfter": count(after),
            "ok": 1.0,
        })
    }
}

fn run_update_statement(
    coll: &Collection<'_>,
    statement: &Document,
) -> Result<crate::result::UpdateResult, DbError> {
    let filter = optional_doc(statement, "q")?;
    let update = match statement.get("u") {
        Some(Bson::Document(u)) => Update::parse(u)?,
        Some(Bson::Array(_)) => {
            return Err(DbError::bad_value("pipeline-style updates are not supported"));
        }
        _ => return Err(DbError::bad_value("update statement requires a 'u' document")),
    };
    coll.update(&filter, &update, flag(statement, "multi", false), flag(statement, "upsert", false))
}

fn collection_name<'a>(cmd: &'a Document, key: &str) -> Result<&'a str, DbError> {
    match cmd.get(key) {
        Some(Bson::String(name)) if !name.is_empty() => Ok(name),
        _ => Err(DbError::bad_value(format!(
            "collection name has invalid type for command {key}"
        ))),
    }
}

fn optional_doc(cmd: &Document, key: &str) -> Result<Document, DbError> {
    match cmd.get(key) {
        None | Some(Bson::Null) => Ok(Document::new()),
        Some(Bson::Document(d)) => Ok(d.clone()),
        Some(other) => Err(DbError::TypeMismatch(format!(
            "BSON field '{key}' is the wrong type '{}', expected type 'object'",
            crate::mutation::type_name(other)
        ))),
    }
}

fn document_array(cmd: &Document, key: &str) -> Result<Vec<Document>, DbError> {
    let Some(Bson::Array(items)) = cmd.get(key) else {
        return Err(DbError::bad_value(format!("BSON field '{key}' is missing or not an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d.clone()),
            other => Err(DbError::TypeMismatch(format!(
                "BSON field '{key}' element is the wrong type '{}', expected type 'object'",
                crate::mutation::type_name(other)
            ))),
        })
        .collect()
}

fn integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

fn flag(cmd: &Document, key: &str, default: bool) -> bool {
    match cmd.get(key) {
        Some(Bson::Boolean(b)) => *b,
        Some(other) => integer(other).map_or(default, |n| n != 0),
        None => default,
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn cursor_reply(ns: &str, batch: Vec<Bson>) -> Document {
    doc! {
        "cursor": { "firstBatch": batch, "id": 0_i64, "ns": ns },
        "ok": 1.0,
    }
}

fn write_error(index: usize, err: &DbError) -> Bson {
    Bson::Document(doc! {
        "index": count(index),
        "code": err.code(),
        "codeName": err.code_name(),
        "errmsg": err.to_string(),
    })
}

fn write_reply(mut reply: Document, write_errors: Vec<Bson>) -> Document {
    if !write_errors.is_empty() {
        reply.insert("writeErrors", write_errors);
    }
    reply.insert("ok", 1.0);
    reply
}
