use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bson::{Bson, Document, doc};
use mongodb::sync::Client;
use parity_engine::{DEFAULT_DB_NAME, Database};
use parity_suite::Mode;
use parity_wire::{Server, ServerHandle};
use tracing::{debug, info};

use super::{Reply, Transport, TransportError, to_i64};
use crate::action::Action;

/// Time given to the server thread before the client connects.
const STARTUP_DELAY: Duration = Duration::from_millis(100);

/// Sends every action as a database command, through the MongoDB driver, to
/// a loopback server that owns the database.
pub struct WireTransport {
    db: Arc<Database>,
    server: ServerHandle,
    remote: mongodb::sync::Database,
}

impl WireTransport {
    /// Open the fixture, serve it on `127.0.0.1:<port>` and connect. Port 0
    /// picks a free port.
    pub fn open(path: impl AsRef<Path>, port: u16) -> Result<Self, TransportError> {
        let db = Arc::new(Database::open(path)?);
        let server = Server::bind(Arc::clone(&db), ("127.0.0.1", port))?.spawn()?;
        thread::sleep(STARTUP_DELAY);

        let remote = Client::with_uri_str(connection_uri(server.local_addr()))?.database(DEFAULT_DB_NAME);
        remote.run_command(doc! { "ping": 1 }).run()?;
        info!(addr = %server.local_addr(), "wire transport connected");
        Ok(Self { db, server, remote })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run `cmd`. Rejected commands come back as errors from the driver;
    /// the first per-document write error is raised here.
    fn command(&mut self, cmd: Document) -> Result<Document, TransportError> {
        let reply = self.remote.run_command(cmd).run()?;
        let first_error = reply.get_array("writeErrors").ok().and_then(|errors| errors.first());
        if let Some(Bson::Document(first)) = first_error {
            return Err(TransportError::Server {
                code: first.get_i32("code").unwrap_or_default(),
                message: first.get_str("errmsg").unwrap_or_default().to_string(),
            });
        }
        Ok(reply)
    }
}

/// Always a direct connection: the server is a standalone and never takes
/// part in discovery.
fn connection_uri(addr: SocketAddr) -> String {
    format!("mongodb://{addr}/?directConnection=true&serverSelectionTimeoutMS=5000")
}

impl Transport for WireTransport {
    fn mode(&self) -> Mode {
        Mode::Wire
    }

    fn execute(&mut self, collection: &str, action: &Action) -> Result<Reply, TransportError> {
        debug!(collection, ?action, "wire call");
        // Every action sees an existing collection, as the direct transport does.
        self.command(doc! { "create": collection })?;

        let reply = match action {
            // ── Insert operations ───────────────────────────────────
            Action::InsertOne { doc } => {
                self.command(doc! { "insert": collection, "documents": [doc.clone()] })?;
                Reply::count(1)
            }
            Action::InsertMany { docs } => {
                let reply = self.command(doc! { "insert": collection, "documents": docs.clone() })?;
                Reply {
                    count: Some(integer(&reply, "insert", "n")?),
                    ..Default::default()
                }
            }

            // ── Reads ───────────────────────────────────────────────
            Action::Find { filter, options } => {
                let mut cmd = doc! { "find": collection, "filter": filter.clone() };
                if let Some(sort) = &options.sort {
                    cmd.insert("sort", sort.clone());
                }
                if options.skip > 0 {
                    cmd.insert("skip", to_i64(options.skip));
                }
                if options.limit != 0 {
                    cmd.insert("limit", options.limit);
                }
                if let Some(projection) = &options.projection {
                    cmd.insert("projection", projection.clone());
                }
                let reply = self.command(cmd)?;
                Reply::documents(first_batch(&reply, "find")?)
            }
            Action::FindOne { filter } => {
                let reply = self.command(doc! { "find": collection, "filter": filter.clone(), "limit": 1_i64 })?;
                Reply::optional(first_batch(&reply, "find")?.into_iter().next())
            }
            Action::Distinct { field, filter } => {
                let reply = self.command(doc! {
                    "distinct": collection,
                    "key": field.as_str(),
                    "query": filter.clone(),
                })?;
                let values = reply.get_array("values").map_err(|_| missing("distinct", "values"))?;
                Reply::count(values.len())
            }
            Action::Aggregate { pipeline } => {
                let reply = self.command(doc! {
                    "aggregate": collection,
                    "pipeline": pipeline.clone(),
                    "cursor": {},
                })?;
                Reply::documents(first_batch(&reply, "aggregate")?)
            }

            // ── Updates and deletes ─────────────────────────────────
            Action::UpdateOne { filter, update, options } => {
                self.update(collection, filter, update, options.upsert, false)?
            }
            Action::UpdateMany { filter, update, options } => {
                self.update(collection, filter, update, options.upsert, true)?
            }
            Action::ReplaceOne { filter, replacement } => {
                let r = self.update(collection, filter, replacement, false, false)?;
                Reply { upserted_id: None, ..r }
            }
            Action::DeleteOne { filter } => self.delete(collection, filter, 1)?,
            Action::DeleteMany { filter } => self.delete(collection, filter, 0)?,
            Action::FindAndModify { filter, options } => {
                let mut cmd = doc! {
                    "findAndModify": collection,
                    "query": filter.clone(),
                };
                if let Some(sort) = &options.sort {
                    cmd.insert("sort", sort.clone());
                }
                if let Some(update) = &options.update {
                    cmd.insert("update", update.clone());
                }
                cmd.insert("new", options.new);
                cmd.insert("upsert", options.upsert);
                cmd.insert("remove", options.remove);
                let reply = self.command(cmd)?;
                let value = match reply.get("value") {
                    Some(Bson::Document(d)) => Some(d.clone()),
                    Some(Bson::Null) | None => None,
                    Some(_) => return Err(malformed("findAndModify", "value is not a document")),
                };
                Reply::optional(value)
            }

            // ── Index operations ────────────────────────────────────
            Action::CreateIndex { model } => {
                let name = model.resolved_name();
                let mut spec = doc! { "key": model.keys.clone(), "name": name.as_str() };
                if model.unique {
                    spec.insert("unique", true);
                }
                self.command(doc! { "createIndexes": collection, "indexes": [spec] })?;
                Reply::index_created(name)
            }
            Action::ListIndexes => {
                let reply = self.command(doc! { "listIndexes": collection })?;
                Reply::count(first_batch(&reply, "listIndexes")?.len())
            }
            Action::DropIndex { name } => {
                self.command(doc! { "dropIndexes": collection, "index": name.as_str() })?;
                Reply::default()
            }
        };
        Ok(reply)
    }

    fn close(self) -> Result<(), TransportError> {
        let WireTransport { db, server, remote } = self;
        drop(remote);
        server.stop();
        match Arc::try_unwrap(db) {
            Ok(db) => db.close()?,
            Err(shared) => shared.flush()?,
        }
        Ok(())
    }
}

impl WireTransport {
    fn update(
        &mut self,
        collection: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> Result<Reply, TransportError> {
        let reply = self.command(doc! {
            "update": collection,
            "updates": [{ "q": filter.clone(), "u": update.clone(), "upsert": upsert, "multi": multi }],
        })?;

        let upserted_id = match reply.get_array("upserted") {
            Ok(entries) => entries.first().and_then(|e| match e {
                Bson::Document(d) => d.get("_id").cloned(),
                _ => None,
            }),
            Err(_) => None,
        };
        // `n` counts upserted documents as well as matched ones.
        let n = integer(&reply, "update", "n")?;
        let matched = n - i64::from(upserted_id.is_some());
        let modified = integer(&reply, "update", "nModified")?;
        Ok(Reply::updated(matched, modified, upserted_id))
    }

    fn delete(&mut self, collection: &str, filter: &Document, limit: i32) -> Result<Reply, TransportError> {
        let reply = self.command(doc! {
            "delete": collection,
            "deletes": [{ "q": filter.clone(), "limit": limit }],
        })?;
        Ok(Reply::deleted(integer(&reply, "delete", "n")?))
    }
}

fn first_batch(reply: &Document, command: &'static str) -> Result<Vec<Document>, TransportError> {
    let batch = reply
        .get_document("cursor")
        .and_then(|c| c.get_array("firstBatch"))
        .map_err(|_| missing(command, "cursor.firstBatch"))?;
    batch
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d.clone()),
            _ => Err(malformed(command, "firstBatch entry is not a document")),
        })
        .collect()
}

fn integer(reply: &Document, command: &'static str, key: &str) -> Result<i64, TransportError> {
    match reply.get(key) {
        Some(Bson::Int32(n)) => Ok(i64::from(*n)),
        Some(Bson::Int64(n)) => Ok(*n),
        Some(Bson::Double(f)) => Ok(*f as i64),
        _ => Err(missing(command, key)),
    }
}

fn missing(command: &'static str, key: &str) -> TransportError {
    malformed(command, &format!("missing {key}"))
}

fn malformed(command: &'static str, detail: &str) -> TransportError {
    TransportError::Reply {
        command,
        detail: detail.to_string(),
    }
}
