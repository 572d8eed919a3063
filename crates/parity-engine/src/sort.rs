use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::compare::compare;
use crate::error::DbError;
use crate::field;

/// A parsed sort document: `(path, ascending)` pairs in priority order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SortSpec(Vec<(String, bool)>);

impl SortSpec {
    pub(crate) fn parse(doc: &Document) -> Result<Self, DbError> {
        let mut keys = Vec::with_capacity(doc.len());
        for (path, direction) in doc {
            let ascending = match direction {
                Bson::Int32(1) | Bson::Int64(1) => true,
                Bson::Int32(-1) | Bson::Int64(-1) => false,
                Bson::Double(f) if *f == 1.0 => true,
                Bson::Double(f) if *f == -1.0 => false,
                other => {
                    return Err(DbError::bad_value(format!(
                        "$sort key ordering must be 1 (for ascending) or -1 (for descending), got {other}"
                    )));
                }
            };
            keys.push((path.clone(), ascending));
        }
        if keys.is_empty() {
            return Err(DbError::bad_value("$sort stage must have at least one sort key"));
        }
        Ok(SortSpec(keys))
    }

    pub(crate) fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (path, ascending) in &self.0 {
            let ord = compare(&sort_key(a, path, *ascending), &sort_key(b, path, *ascending));
            let ord = if *ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort, so ties keep insertion order.
    pub(crate) fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| self.compare(a, b));
    }
}

// Arrays sort by their smallest element ascending and largest descending.
fn sort_key(doc: &Document, path: &str, ascending: bool) -> Bson {
    let mut values: Vec<&Bson> = Vec::new();
    for value in field::lookup(doc, path) {
        match value {
            Bson::Array(items) if !items.is_empty() => values.extend(items.iter()),
            other => values.push(other),
        }
    }
    let pick = if ascending {
        values.into_iter().min_by(|a, b| compare(a, b))
    } else {
        values.into_iter().max_by(|a, b| compare(a, b))
    };
    pick.cloned().unwrap_or(Bson::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn multi_key_sort() {
        let spec = SortSpec::parse(&doc! { "a": 1, "b": -1 }).unwrap();
        let mut docs = vec![
            doc! { "a": 2, "b": 1 },
            doc! { "a": 1, "b": 1 },
            doc! { "a": 1, "b": 5 },
            doc! { "b": 9 },
        ];
        spec.sort(&mut docs);
        assert_eq!(
            docs,
            vec![
                doc! { "b": 9 },
                doc! { "a": 1, "b": 5 },
                doc! { "a": 1, "b": 1 },
                doc! { "a": 2, "b": 1 },
            ]
        );
    }

    #[test]
    fn invalid_direction_is_rejected() {
        assert!(SortSpec::parse(&doc! { "a": 2 }).is_err());
        assert!(SortSpec::parse(&doc! {}).is_err());
    }
}
