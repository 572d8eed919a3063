//! On-disk snapshot: one BSON document per collection, concatenated.
//!
//! ```text
//! { name: "users", indexes: [ {v, key, name, unique?}, ... ], documents: [ ... ] }
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use bson::{Bson, Document, RawDocumentBuf, doc};

use crate::collection::CollectionData;
use crate::error::DbError;
use crate::index::{ID_INDEX_NAME, IndexSpec};

pub(crate) fn load(path: &Path) -> Result<BTreeMap<String, CollectionData>, DbError> {
    let bytes = fs::read(path)?;
    let mut collections = BTreeMap::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + 4)
            .ok_or_else(|| DbError::Snapshot(format!("truncated length at byte {offset}")))?;
        let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let len = usize::try_from(len)
            .ok()
            .filter(|n| *n >= 5)
            .ok_or_else(|| DbError::Snapshot(format!("invalid document length {len} at byte {offset}")))?;
        let chunk = bytes
            .get(offset..offset + len)
            .ok_or_else(|| DbError::Snapshot(format!("truncated document at byte {offset}")))?;
        let raw = RawDocumentBuf::from_bytes(chunk.to_vec())?;
        let entry: Document = bson::deserialize_from_slice(raw.as_bytes())?;
        let (name, data) = decode_collection(&entry)?;
        collections.insert(name, data);
        offset += len;
    }

    Ok(collections)
}

fn decode_collection(entry: &Document) -> Result<(String, CollectionData), DbError> {
    let name = entry
        .get_str("name")
        .map_err(|_| DbError::Snapshot("collection entry without a name".into()))?
        .to_string();

    let mut data = CollectionData::new();
    if let Ok(indexes) = entry.get_array("indexes") {
        for index in indexes {
            let Bson::Document(index) = index else {
                return Err(DbError::Snapshot(format!("{name}: index entry is not a document")));
            };
            let spec = IndexSpec::from_document(index)?;
            if spec.name != ID_INDEX_NAME {
                data.indexes.push(spec);
            }
        }
    }
    if let Ok(documents) = entry.get_array("documents") {
        for doc in documents {
            let Bson::Document(doc) = doc else {
                return Err(DbError::Snapshot(format!("{name}: stored value is not a document")));
            };
            data.documents.push(doc.clone());
        }
    }
    Ok((name, data))
}

/// Write every collection to `path` through a temporary sibling file that is
/// renamed into place.
pub(crate) fn save(path: &Path, collections: &BTreeMap<String, CollectionData>) -> Result<(), DbError> {
    let mut buf = Vec::new();
    for (name, data) in collections {
        let entry = doc! {
            "name": name.clone(),
            "indexes": data.indexes.iter().map(|i| Bson::Document(i.to_document())).collect::<Vec<_>>(),
            "documents": data.documents.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
        };
        let raw = RawDocumentBuf::try_from(&entry)?;
        buf.extend_from_slice(raw.as_bytes());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, &buf)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
