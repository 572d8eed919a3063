use bson::Document;
use parity_engine::{FindAndModifyOptions, FindOptions, IndexModel};
use parity_suite::{TestAction, Value};

use crate::error::ExecError;

/// Options for `updateOne` / `updateMany`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
}

/// A suite action parsed into its per-method form.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    InsertOne { doc: Document },
    InsertMany { docs: Vec<Document> },
    Find { filter: Document, options: FindOptions },
    FindOne { filter: Document },
    UpdateOne { filter: Document, update: Document, options: UpdateOptions },
    UpdateMany { filter: Document, update: Document, options: UpdateOptions },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
    ReplaceOne { filter: Document, replacement: Document },
    FindAndModify { filter: Document, options: FindAndModifyOptions },
    Distinct { field: String, filter: Document },
    Aggregate { pipeline: Vec<Document> },
    CreateIndex { model: IndexModel },
    ListIndexes,
    DropIndex { name: String },
}

impl Action {
    pub fn parse(action: &TestAction) -> Result<Self, ExecError> {
        let options = action.options.as_ref();
        let option = |key: &str| options.and_then(|o| o.get(key)).filter(|v| !v.is_null());

        Ok(match action.method.as_str() {
            "insertOne" => Action::InsertOne {
                doc: required_document(action.doc.as_ref(), "doc")?,
            },
            "insertMany" => {
                let docs = action
                    .docs
                    .as_deref()
                    .ok_or_else(|| invalid("insertMany requires docs"))?;
                Action::InsertMany {
                    docs: docs
                        .iter()
                        .map(|d| document(d, "docs entry"))
                        .collect::<Result<_, _>>()?,
                }
            }
            "find" => Action::Find {
                filter: filter(action)?,
                options: FindOptions {
                    sort: option("sort").map(|v| document(v, "options.sort")).transpose()?,
                    skip: u64::try_from(integer(option("skip"), "options.skip")?).unwrap_or(0),
                    limit: integer(option("limit"), "options.limit")?,
                    projection: option("projection")
                        .map(|v| document(v, "options.projection"))
                        .transpose()?,
                },
            },
            "findOne" => Action::FindOne { filter: filter(action)? },
            "updateOne" | "updateMany" => {
                let filter = filter(action)?;
                let update = required_document(action.update.as_ref(), "update")?;
                let options = UpdateOptions {
                    upsert: option("upsert").is_some_and(truthy),
                };
                if action.method == "updateOne" {
                    Action::UpdateOne { filter, update, options }
                } else {
                    Action::UpdateMany { filter, update, options }
                }
            }
            "deleteOne" => Action::DeleteOne { filter: filter(action)? },
            "deleteMany" => Action::DeleteMany { filter: filter(action)? },
            "replaceOne" => Action::ReplaceOne {
                filter: filter(action)?,
                replacement: required_document(action.doc.as_ref(), "doc")?,
            },
            "findAndModify" => Action::FindAndModify {
                filter: filter(action)?,
                options: FindAndModifyOptions {
                    sort: option("sort").map(|v| document(v, "options.sort")).transpose()?,
                    update: action
                        .update
                        .as_ref()
                        .filter(|v| !v.is_null())
                        .map(|v| document(v, "update"))
                        .transpose()?,
                    remove: option("remove").is_some_and(truthy),
                    new: option("new").is_some_and(truthy),
                    upsert: option("upsert").is_some_and(truthy),
                    projection: None,
                },
            },
            "distinct" => Action::Distinct {
                field: option("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("distinct requires options.field"))?
                    .to_string(),
                filter: filter(action)?,
            },
            "aggregate" => {
                let stages = option("pipeline")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid("aggregate requires options.pipeline"))?;
                Action::Aggregate {
                    pipeline: stages
                        .iter()
                        .map(|s| document(s, "pipeline stage"))
                        .collect::<Result<_, _>>()?,
                }
            }
            "createIndex" => Action::CreateIndex {
                model: index_model(options.ok_or_else(|| invalid("createIndex requires options"))?)?,
            },
            "listIndexes" => Action::ListIndexes,
            "dropIndex" => Action::DropIndex {
                name: option("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("dropIndex requires options.name"))?
                    .to_string(),
            },
            other => return Err(ExecError::UnknownMethod(other.to_string())),
        })
    }
}

/// Build an [`IndexModel`] from `{keys: {...}, options: {name?, unique?}}`.
/// Used both by the `createIndex` action and the `createIndex` setup step.
pub fn index_model(spec: &Value) -> Result<IndexModel, ExecError> {
    let keys = spec
        .get("keys")
        .ok_or_else(|| invalid("createIndex requires keys"))
        .and_then(|k| document(k, "keys"))?;
    if keys.is_empty() {
        return Err(invalid("createIndex keys must not be empty"));
    }

    let mut model = IndexModel::new(keys);
    if let Some(opts) = spec.get("options").filter(|o| !o.is_null()) {
        if let Some(name) = opts.get("name").and_then(Value::as_str) {
            model = model.with_name(name);
        }
        model = model.unique(opts.get("unique").is_some_and(truthy));
    }
    Ok(model)
}

fn filter(action: &TestAction) -> Result<Document, ExecError> {
    match &action.filter {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(v) => document(v, "filter"),
    }
}

fn required_document(value: Option<&Value>, field: &str) -> Result<Document, ExecError> {
    match value {
        None | Some(Value::Null) => Err(invalid(format!("missing {field}"))),
        Some(v) => document(v, field),
    }
}

fn document(value: &Value, field: &str) -> Result<Document, ExecError> {
    value
        .to_document()
        .ok_or_else(|| invalid(format!("{field} must be an object")))
}

// Absent numbers read as zero.
fn integer(value: Option<&Value>, field: &str) -> Result<i64, ExecError> {
    match value {
        None => Ok(0),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| invalid(format!("{field} must be a number"))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Double(f) => *f != 0.0,
        _ => false,
    }
}

fn invalid(detail: impl Into<String>) -> ExecError {
    ExecError::InvalidAction(detail.into())
}
