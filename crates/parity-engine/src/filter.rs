use bson::{Bson, Document};
use regex::Regex;

use crate::compare::{compare, type_bracket, values_equal};
use crate::error::DbError;
use crate::field;

/// A parsed query predicate.
#[derive(Debug, Clone)]
pub enum Expression {
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Nor(Vec<Expression>),
    Not(Box<Expression>),
    Eq(String, Bson),
    Ne(String, Bson),
    Gt(String, Bson),
    Gte(String, Bson),
    Lt(String, Bson),
    Lte(String, Bson),
    In(String, Vec<Bson>),
    Nin(String, Vec<Bson>),
    Exists(String, bool),
    Size(String, usize),
    Regex(String, Regex),
}

/// Parse a filter document into an [`Expression`].
///
/// - the top-level document is an implicit AND; an empty document matches everything
/// - `{ field: value }` is implicit `$eq`
/// - `{ field: { $gt: v, $lte: w } }` uses operator sub-documents
/// - `$and` / `$or` / `$nor` take arrays of filter documents
/// - `$regex` takes an optional `$options` sibling
pub fn parse_filter(doc: &Document) -> Result<Expression, DbError> {
    let mut children = Vec::with_capacity(doc.len());

    for (key, value) in doc {
        match key.as_str() {
            "$and" => children.push(Expression::And(parse_logical_array(key, value)?)),
            "$or" => children.push(Expression::Or(parse_logical_array(key, value)?)),
            "$nor" => children.push(Expression::Nor(parse_logical_array(key, value)?)),
            k if k.starts_with('$') => {
                return Err(DbError::bad_value(format!("unknown top level operator: {k}")));
            }
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    if children.len() == 1 {
        return Ok(children.remove(0));
    }
    Ok(Expression::And(children))
}

fn parse_logical_array(op: &str, value: &Bson) -> Result<Vec<Expression>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::bad_value(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(DbError::bad_value(format!("{op} argument must be a non-empty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(sub) => parse_filter(sub),
            _ => Err(DbError::bad_value(format!("{op} argument's entries must be objects"))),
        })
        .collect()
}

fn parse_field_condition(field: &str, value: &Bson) -> Result<Expression, DbError> {
    if let Bson::Document(sub) = value {
        let is_operator_doc = sub.keys().next().is_some_and(|k| k.starts_with('$'));
        if is_operator_doc {
            return parse_operator_doc(field, sub);
        }
    }
    Ok(Expression::Eq(field.to_string(), value.clone()))
}

fn parse_operator_doc(field: &str, doc: &Document) -> Result<Expression, DbError> {
    if doc.contains_key("$regex") {
        return parse_regex(field, doc);
    }

    let mut conditions = Vec::with_capacity(doc.len());
    for (op, operand) in doc {
        let f = field.to_string();
        let expr = match op.as_str() {
            "$eq" => Expression::Eq(f, operand.clone()),
            "$ne" => Expression::Ne(f, operand.clone()),
            "$gt" => Expression::Gt(f, operand.clone()),
            "$gte" => Expression::Gte(f, operand.clone()),
            "$lt" => Expression::Lt(f, operand.clone()),
            "$lte" => Expression::Lte(f, operand.clone()),
            "$in" => Expression::In(f, operand_array(op, operand)?),
            "$nin" => Expression::Nin(f, operand_array(op, operand)?),
            "$exists" => Expression::Exists(f, truthy(operand)),
            "$size" => match operand {
                Bson::Int32(n) if *n >= 0 => Expression::Size(f, *n as usize),
                Bson::Int64(n) if *n >= 0 => Expression::Size(f, *n as usize),
                Bson::Double(n) if *n >= 0.0 && n.fract() == 0.0 => Expression::Size(f, *n as usize),
                _ => return Err(DbError::bad_value("$size needs a non-negative integer")),
            },
            "$not" => match operand {
                Bson::Document(sub) => Expression::Not(Box::new(parse_operator_doc(field, sub)?)),
                _ => return Err(DbError::bad_value("$not needs a document")),
            },
            "$options" => return Err(DbError::bad_value("$options needs a $regex")),
            other => return Err(DbError::bad_value(format!("unknown operator: {other}"))),
        };
        conditions.push(expr);
    }

    match conditions.len() {
        1 => Ok(conditions.remove(0)),
        _ => Ok(Expression::And(conditions)),
    }
}

fn operand_array(op: &str, operand: &Bson) -> Result<Vec<Bson>, DbError> {
    match operand {
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(DbError::bad_value(format!("{op} needs an array"))),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn parse_regex(field: &str, doc: &Document) -> Result<Expression, DbError> {
    let mut pattern: Option<&str> = None;
    let mut options: Option<&str> = None;

    for (key, value) in doc {
        match (key.as_str(), value) {
            ("$regex", Bson::String(s)) => pattern = Some(s),
            ("$regex", _) => return Err(DbError::bad_value("$regex has to be a string")),
            ("$options", Bson::String(s)) => options = Some(s),
            ("$options", _) => return Err(DbError::bad_value("$options has to be a string")),
            (other, _) => {
                return Err(DbError::bad_value(format!("unexpected key alongside $regex: {other}")));
            }
        }
    }

    let pattern = pattern.ok_or_else(|| DbError::bad_value("missing $regex pattern"))?;
    let full = match options {
        Some(opts) if !opts.is_empty() => {
            let mut flags = String::with_capacity(opts.len());
            for ch in opts.chars() {
                match ch {
                    'i' | 's' | 'm' | 'x' => flags.push(ch),
                    c => return Err(DbError::bad_value(format!("invalid flag in regex options: {c}"))),
                }
            }
            format!("(?{flags}){pattern}")
        }
        _ => pattern.to_string(),
    };

    let re = Regex::new(&full)
        .map_err(|e| DbError::bad_value(format!("Regular expression is invalid: {e}")))?;
    Ok(Expression::Regex(field.to_string(), re))
}

impl Expression {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Expression::And(children) => children.iter().all(|c| c.matches(doc)),
            Expression::Or(children) => children.iter().any(|c| c.matches(doc)),
            Expression::Nor(children) => !children.iter().any(|c| c.matches(doc)),
            Expression::Not(inner) => !inner.matches(doc),
            Expression::Eq(path, target) => eq_matches(doc, path, target),
            Expression::Ne(path, target) => !eq_matches(doc, path, target),
            Expression::Gt(path, target) => range_matches(doc, path, target, |o| o.is_gt()),
            Expression::Gte(path, target) => range_matches(doc, path, target, |o| o.is_ge()),
            Expression::Lt(path, target) => range_matches(doc, path, target, |o| o.is_lt()),
            Expression::Lte(path, target) => range_matches(doc, path, target, |o| o.is_le()),
            Expression::In(path, targets) => targets.iter().any(|t| eq_matches(doc, path, t)),
            Expression::Nin(path, targets) => !targets.iter().any(|t| eq_matches(doc, path, t)),
            Expression::Exists(path, want) => !field::lookup(doc, path).is_empty() == *want,
            Expression::Size(path, n) => field::lookup(doc, path)
                .iter()
                .any(|v| matches!(v, Bson::Array(items) if items.len() == *n)),
            Expression::Regex(path, re) => candidates(doc, path)
                .iter()
                .any(|v| matches!(v, Bson::String(s) if re.is_match(s))),
        }
    }
}

/// Candidate values for comparison: each value at the path, plus the
/// elements of any array found there.
fn candidates<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    for value in field::lookup(doc, path) {
        out.push(value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn eq_matches(doc: &Document, path: &str, target: &Bson) -> bool {
    let found = candidates(doc, path);
    if found.is_empty() {
        return matches!(target, Bson::Null);
    }
    found.iter().any(|v| values_equal(v, target))
}

fn range_matches(
    doc: &Document,
    path: &str,
    target: &Bson,
    accept: fn(std::cmp::Ordering) -> bool,
) -> bool {
    let bracket = type_bracket(target);
    candidates(doc, path)
        .iter()
        .any(|v| type_bracket(v) == bracket && accept(compare(v, target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(filter: Document, doc: Document) -> bool {
        parse_filter(&filter).unwrap().matches(&doc)
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(doc! {}, doc! { "a": 1 }));
    }

    #[test]
    fn implicit_eq_and_null_semantics() {
        assert!(matches(doc! { "name": "a" }, doc! { "name": "a" }));
        assert!(!matches(doc! { "name": "a" }, doc! { "name": "b" }));
        assert!(matches(doc! { "gone": Bson::Null }, doc! { "name": "a" }));
        assert!(matches(doc! { "n": 5_i64 }, doc! { "n": 5.0 }));
    }

    #[test]
    fn range_operators_stay_within_type_bracket() {
        let f = doc! { "value": { "$gt": 15 } };
        assert!(matches(f.clone(), doc! { "value": 20 }));
        assert!(!matches(f.clone(), doc! { "value": 10 }));
        assert!(!matches(f, doc! { "value": "zzz" }));
        assert!(matches(doc! { "v": { "$gte": 1, "$lt": 3 } }, doc! { "v": 2 }));
    }

    #[test]
    fn arrays_match_elementwise() {
        let d = doc! { "tags": ["red", "blue"] };
        assert!(matches(doc! { "tags": "red" }, d.clone()));
        assert!(matches(doc! { "tags": { "$in": ["green", "blue"] } }, d.clone()));
        assert!(matches(doc! { "tags": { "$size": 2 } }, d.clone()));
        assert!(!matches(doc! { "tags": { "$nin": ["red"] } }, d));
    }

    #[test]
    fn logical_operators() {
        let d = doc! { "a": 1, "b": 2 };
        assert!(matches(doc! { "$or": [ { "a": 5 }, { "b": 2 } ] }, d.clone()));
        assert!(!matches(doc! { "$and": [ { "a": 1 }, { "b": 3 } ] }, d.clone()));
        assert!(matches(doc! { "$nor": [ { "a": 5 } ] }, d.clone()));
        assert!(matches(doc! { "a": { "$not": { "$gt": 3 } } }, d));
    }

    #[test]
    fn exists_and_ne() {
        let d = doc! { "a": 1 };
        assert!(matches(doc! { "a": { "$exists": true } }, d.clone()));
        assert!(matches(doc! { "b": { "$exists": false } }, d.clone()));
        assert!(matches(doc! { "a": { "$ne": 2 } }, d.clone()));
        assert!(!matches(doc! { "a": { "$ne": 1 } }, d));
    }

    #[test]
    fn regex_with_options() {
        let f = doc! { "name": { "$regex": "^al", "$options": "i" } };
        assert!(matches(f.clone(), doc! { "name": "Alice" }));
        assert!(!matches(f, doc! { "name": "Bob" }));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let err = parse_filter(&doc! { "a": { "$near": 1 } }).unwrap_err();
        assert!(err.to_string().contains("unknown operator: $near"));
        assert!(parse_filter(&doc! { "$where": "1" }).is_err());
        assert!(parse_filter(&doc! { "$or": [] }).is_err());
    }
}
