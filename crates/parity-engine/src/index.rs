use bson::{Bson, Document, doc};

use crate::compare::values_equal;
use crate::error::DbError;
use crate::field;

pub const ID_INDEX_NAME: &str = "_id_";

/// A request to create an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexModel {
    /// Field → direction, in key order.
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
}

impl IndexModel {
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The explicit name, or the one derived from the keys.
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => default_index_name(&self.keys),
        }
    }
}

/// `{a: 1, b: -1}` → `"a_1_b_-1"`.
pub fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| format!("{field}_{}", direction_label(direction)))
        .collect::<Vec<_>>()
        .join("_")
}

fn direction_label(direction: &Bson) -> String {
    match direction {
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => (*f as i64).to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An index as stored on a collection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexSpec {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
}

impl IndexSpec {
    pub(crate) fn id_index() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            keys: doc! { "_id": 1 },
            unique: true,
        }
    }

    pub(crate) fn from_model(model: &IndexModel) -> Result<Self, DbError> {
        if model.keys.is_empty() {
            return Err(DbError::bad_value("Index keys cannot be empty."));
        }
        for (field, direction) in &model.keys {
            let valid = match direction {
                Bson::Int32(n) => *n != 0,
                Bson::Int64(n) => *n != 0,
                Bson::Double(f) => *f != 0.0 && f.is_finite(),
                Bson::String(_) => true,
                _ => false,
            };
            if !valid {
                return Err(DbError::bad_value(format!(
                    "Values in the index key pattern can only be numbers or strings, got {field}: {direction}"
                )));
            }
        }
        let name = model.resolved_name();
        // The _id index is always unique.
        let unique = model.unique || name == ID_INDEX_NAME;
        Ok(Self {
            name,
            keys: model.keys.clone(),
            unique,
        })
    }

    pub(crate) fn same_keys(&self, other: &IndexSpec) -> bool {
        self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .zip(other.keys.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
    }

    pub(crate) fn to_document(&self) -> Document {
        let mut out = doc! { "v": 2, "key": self.keys.clone(), "name": self.name.clone() };
        if self.unique && self.name != ID_INDEX_NAME {
            out.insert("unique", true);
        }
        out
    }

    pub(crate) fn from_document(doc: &Document) -> Result<Self, DbError> {
        let name = doc
            .get_str("name")
            .map_err(|_| DbError::Snapshot("index without a name".into()))?;
        let keys = doc
            .get_document("key")
            .map_err(|_| DbError::Snapshot(format!("index {name} without a key")))?;
        Ok(Self {
            name: name.to_string(),
            keys: keys.clone(),
            unique: doc.get_bool("unique").unwrap_or(name == ID_INDEX_NAME),
        })
    }

    /// The values this index sees for `doc`. Missing fields index as null.
    pub(crate) fn key_of(&self, doc: &Document) -> Vec<Bson> {
        self.keys
            .keys()
            .map(|path| field::get(doc, path).cloned().unwrap_or(Bson::Null))
            .collect()
    }

    /// Rendered like `{ email: "a@x" }`, for duplicate key messages.
    pub(crate) fn describe_key(&self, key: &[Bson]) -> String {
        let parts: Vec<String> = self
            .keys
            .keys()
            .zip(key)
            .map(|(path, value)| format!("{path}: {value}"))
            .collect();
        format!("{{ {} }}", parts.join(", "))
    }
}

/// Check `candidate` against `existing` for every unique index. `skip` is
/// the position of the document being replaced, if any.
pub(crate) fn check_unique(
    namespace: &str,
    indexes: &[IndexSpec],
    existing: &[Document],
    candidate: &Document,
    skip: Option<usize>,
) -> Result<(), DbError> {
    for index in indexes.iter().filter(|i| i.unique) {
        let key = index.key_of(candidate);
        let clash = existing.iter().enumerate().any(|(pos, other)| {
            Some(pos) != skip
                && index
                    .key_of(other)
                    .iter()
                    .zip(&key)
                    .all(|(a, b)| values_equal(a, b))
        });
        if clash {
            return Err(DbError::DuplicateKey {
                namespace: namespace.to_string(),
                index: index.name.clone(),
                key: index.describe_key(&key),
            });
        }
    }
    Ok(())
}
