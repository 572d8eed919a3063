use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// A JSON-shaped value moving between suite files and database documents.
///
/// The variant set is closed: every conversion in and out of this type is
/// total. JSON numbers that fit an `i64` become [`Value::Int`], everything
/// else numeric becomes [`Value::Double`]. Object key order is preserved,
/// which matters for index key specifications and sort documents.
///
/// BSON types without a JSON counterpart are mapped explicitly by
/// [`Value::from_bson`]; nothing is dropped silently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Document(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integral view of a numeric value. Doubles truncate toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Double(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a top-level field of a document value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Document(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Convert to a BSON document. Returns `None` unless this is a
    /// [`Value::Document`].
    pub fn to_document(&self) -> Option<Document> {
        match self {
            Value::Document(fields) => Some(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_bson()))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(n) => Bson::Int64(*n),
            Value::Double(f) => Bson::Double(*f),
            Value::String(s) => Bson::String(s.clone()),
            Value::Array(items) => Bson::Array(items.iter().map(Value::to_bson).collect()),
            Value::Document(_) => Bson::Document(self.to_document().unwrap_or_default()),
        }
    }

    /// Map a BSON value into the closed variant set.
    ///
    /// `ObjectId` becomes its hex string, `DateTime` its epoch milliseconds and
    /// `Symbol` a plain string. Every other BSON-only type (binary, regex,
    /// timestamps, decimals, code, min/max keys, undefined, db pointers) is
    /// coerced to [`Value::Null`].
    pub fn from_bson(value: &Bson) -> Value {
        match value {
            Bson::Null => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(n) => Value::Int(i64::from(*n)),
            Bson::Int64(n) => Value::Int(*n),
            Bson::Double(f) => Value::Double(*f),
            Bson::String(s) | Bson::Symbol(s) => Value::String(s.clone()),
            Bson::Array(items) => Value::Array(items.iter().map(Value::from_bson).collect()),
            Bson::Document(doc) => Value::from_document(doc),
            Bson::ObjectId(oid) => Value::String(oid.to_hex()),
            Bson::DateTime(dt) => Value::Int(dt.timestamp_millis()),
            _ => Value::Null,
        }
    }

    pub fn from_document(doc: &Document) -> Value {
        Value::Document(
            doc.iter()
                .map(|(k, v)| (k.clone(), Value::from_bson(v)))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Double),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Document(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::Double(f) => {
                serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Document(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Bson> for Value {
    fn from(value: &Bson) -> Self {
        Value::from_bson(value)
    }
}

impl From<&Document> for Value {
    fn from(doc: &Document) -> Self {
        Value::from_document(doc)
    }
}
