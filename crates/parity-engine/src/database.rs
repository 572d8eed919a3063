use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::collection::{Collection, CollectionData};
use crate::error::DbError;
use crate::snapshot;

pub const DEFAULT_DB_NAME: &str = "test";

/// An in-process document database.
///
/// All collections live in memory behind one lock. A database opened on a
/// path loads the snapshot found there and writes it back on
/// [`flush`](Database::flush) and [`close`](Database::close).
pub struct Database {
    name: String,
    path: Option<PathBuf>,
    collections: Mutex<BTreeMap<String, CollectionData>>,
}

impl Database {
    /// Open the database stored at `path`, creating the file when it does
    /// not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let collections = if path.exists() {
            snapshot::load(&path)?
        } else {
            BTreeMap::new()
        };
        let db = Self {
            name: DEFAULT_DB_NAME.to_string(),
            path: Some(path),
            collections: Mutex::new(collections),
        };
        db.flush()?;
        info!(path = ?db.path, collections = db.read(|c| c.len()), "database opened");
        Ok(db)
    }

    /// A database with no backing file.
    pub fn in_memory() -> Self {
        Self {
            name: DEFAULT_DB_NAME.to_string(),
            path: None,
            collections: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Handle to `name`. Nothing is created until the first write.
    pub fn collection(&self, name: &str) -> Collection<'_> {
        Collection::new(self, name)
    }

    pub fn list_collection_names(&self) -> Vec<String> {
        self.read(|cols| cols.keys().cloned().collect())
    }

    /// Write the snapshot if the database is file-backed.
    pub fn flush(&self) -> Result<(), DbError> {
        match &self.path {
            Some(path) => self.read(|cols| snapshot::save(path, cols)),
            None => Ok(()),
        }
    }

    /// Flush and release the database.
    pub fn close(self) -> Result<(), DbError> {
        self.flush()?;
        info!(path = ?self.path, "database closed");
        Ok(())
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&BTreeMap<String, CollectionData>) -> R) -> R {
        let guard = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut BTreeMap<String, CollectionData>) -> R) -> R {
        let mut guard = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
