use bson::{Bson, Document};

use crate::error::DbError;
use crate::field;

/// A find-style projection: either a list of fields to keep or a list of
/// fields to drop. `_id` is kept unless explicitly excluded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    Include { fields: Vec<String>, id: bool },
    Exclude(Vec<String>),
}

impl Projection {
    pub(crate) fn parse(doc: &Document) -> Result<Self, DbError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id = true;

        for (path, flag) in doc {
            let keep = match flag {
                Bson::Boolean(b) => *b,
                Bson::Int32(n) => *n != 0,
                Bson::Int64(n) => *n != 0,
                Bson::Double(f) => *f != 0.0,
                other => {
                    return Err(DbError::bad_value(format!(
                        "Unsupported projection option: {path}: {other}"
                    )));
                }
            };
            if path == "_id" {
                id = keep;
            } else if keep {
                include.push(path.clone());
            } else {
                exclude.push(path.clone());
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (false, false) => Err(DbError::bad_value(format!(
                "Cannot do exclusion on field {} in inclusion projection",
                exclude[0]
            ))),
            (false, true) => Ok(Projection::Include { fields: include, id }),
            (true, _) => {
                if !id {
                    exclude.insert(0, "_id".to_string());
                }
                Ok(Projection::Exclude(exclude))
            }
        }
    }

    pub(crate) fn apply(&self, doc: &Document) -> Document {
        match self {
            Projection::Include { fields, id } => {
                let mut out = Document::new();
                if *id {
                    if let Some(value) = doc.get("_id") {
                        out.insert("_id", value.clone());
                    }
                }
                // Walk the source so output keeps source field order.
                for (key, value) in doc {
                    if key == "_id" {
                        continue;
                    }
                    let nested: Vec<&str> = fields
                        .iter()
                        .filter_map(|f| {
                            if f == key {
                                Some("")
                            } else {
                                f.strip_prefix(key.as_str()).and_then(|rest| rest.strip_prefix('.'))
                            }
                        })
                        .collect();
                    if nested.is_empty() {
                        continue;
                    }
                    if nested.contains(&"") {
                        out.insert(key.clone(), value.clone());
                    } else if let Some(projected) = project_nested(value, &nested) {
                        out.insert(key.clone(), projected);
                    }
                }
                out
            }
            Projection::Exclude(fields) => {
                let mut out = doc.clone();
                for path in fields {
                    // remove never creates parents, so it cannot fail.
                    let _ = field::remove(&mut out, path);
                }
                out
            }
        }
    }
}

fn project_nested(value: &Bson, paths: &[&str]) -> Option<Bson> {
    match value {
        Bson::Document(sub) => {
            let projection = Projection::Include {
                fields: paths.iter().map(|p| p.to_string()).collect(),
                id: false,
            };
            Some(Bson::Document(projection.apply(sub)))
        }
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Bson::Document(_) => project_nested(item, paths),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn inclusion_keeps_id_by_default() {
        let p = Projection::parse(&doc! { "name": 1 }).unwrap();
        let out = p.apply(&doc! { "_id": 1, "name": "a", "age": 3 });
        assert_eq!(out, doc! { "_id": 1, "name": "a" });
    }

    #[test]
    fn inclusion_without_id() {
        let p = Projection::parse(&doc! { "_id": 0, "a.b": 1 }).unwrap();
        let out = p.apply(&doc! { "_id": 1, "a": { "b": 2, "c": 3 }, "d": 4 });
        assert_eq!(out, doc! { "a": { "b": 2 } });
    }

    #[test]
    fn exclusion_drops_fields() {
        let p = Projection::parse(&doc! { "secret": 0, "_id": false }).unwrap();
        let out = p.apply(&doc! { "_id": 1, "name": "a", "secret": "x" });
        assert_eq!(out, doc! { "name": "a" });
    }

    #[test]
    fn mixed_projection_is_rejected() {
        assert!(Projection::parse(&doc! { "a": 1, "b": 0 }).is_err());
    }
}
