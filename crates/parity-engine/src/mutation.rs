use bson::{Bson, Document};

use crate::compare::{Number, compare, number, values_equal};
use crate::error::DbError;
use crate::field;
use crate::filter::Expression;

/// A single field-level update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Set a field to a value. Creates the field if it doesn't exist.
    Set(Bson),
    /// Remove a field from the document.
    Unset,
    /// Add to a numeric field. Missing fields start at zero.
    Inc(Bson),
    /// Multiply a numeric field. Missing fields become zero.
    Mul(Bson),
    /// Move a field to a new path.
    Rename(String),
    /// Append values to an array field, creating it if missing.
    Push(Vec<Bson>),
    /// Append values not already present.
    AddToSet(Vec<Bson>),
    /// Remove the last (`1`) or first (`-1`) element.
    Pop(i64),
    /// Remove every element equal to the value.
    Pull(Bson),
    /// Replace the field when the operand is smaller.
    Min(Bson),
    /// Replace the field when the operand is larger.
    Max(Bson),
    /// `$set`, but only when the update inserts a new document.
    SetOnInsert(Bson),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMutation {
    pub field: String,
    pub op: MutationOp,
}

/// A parsed update document.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// `{ $set: {...}, $inc: {...} }`
    Operators(Vec<FieldMutation>),
    /// A plain document replacing everything except `_id`.
    Replacement(Document),
}

impl Update {
    /// Parse an update document. A document whose keys all start with `$`
    /// is an operator update; one with no `$` keys is a replacement. Mixing
    /// the two is an error.
    pub fn parse(doc: &Document) -> Result<Self, DbError> {
        let operator_keys = doc.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Update::replacement(doc);
        }
        if operator_keys != doc.len() {
            return Err(DbError::bad_value(
                "Update documents cannot mix operators and plain fields",
            ));
        }

        let mut ops = Vec::new();
        for (key, value) in doc {
            let Bson::Document(fields) = value else {
                return Err(DbError::bad_value(format!(
                    "Modifiers operate on fields but we found type {} instead. For example: {{$mod: {{<field>: ...}}}} not {{{key}: {value}}}",
                    type_name(value)
                )));
            };
            for (path, operand) in fields {
                let op = parse_op(key, path, operand)?;
                ops.push(FieldMutation {
                    field: path.clone(),
                    op,
                });
            }
        }

        if ops.is_empty() {
            return Err(DbError::bad_value("'update' is empty. You must specify a field for the update"));
        }
        for fm in &ops {
            if targets_id(&fm.field) || matches!(&fm.op, MutationOp::Rename(to) if targets_id(to)) {
                return Err(DbError::ImmutableField(
                    "Performing an update on the path '_id' would modify the immutable field '_id'"
                        .into(),
                ));
            }
        }
        Ok(Update::Operators(ops))
    }

    /// Parse a document that must be a replacement.
    pub fn replacement(doc: &Document) -> Result<Self, DbError> {
        if let Some(key) = doc.keys().find(|k| k.starts_with('$')) {
            return Err(DbError::bad_value(format!(
                "replacement document must not contain update operators, found {key}"
            )));
        }
        Ok(Update::Replacement(doc.clone()))
    }

    /// Apply to `doc` in place. Returns whether anything changed.
    ///
    /// `inserting` enables `$setOnInsert`.
    pub fn apply(&self, doc: &mut Document, inserting: bool) -> Result<bool, DbError> {
        match self {
            Update::Replacement(replacement) => {
                if let (Some(old), Some(new)) = (doc.get("_id"), replacement.get("_id")) {
                    if !values_equal(old, new) {
                        return Err(DbError::ImmutableField(
                            "After applying the update, the (immutable) field '_id' was found to have been altered"
                                .into(),
                        ));
                    }
                }
                let id = doc
                    .get("_id")
                    .or_else(|| replacement.get("_id"))
                    .cloned();
                let mut next = Document::new();
                if let Some(id) = id {
                    next.insert("_id", id);
                }
                for (k, v) in replacement {
                    if k != "_id" {
                        next.insert(k.clone(), v.clone());
                    }
                }
                let changed = next != *doc;
                *doc = next;
                Ok(changed)
            }
            Update::Operators(ops) => {
                let mut changed = false;
                for fm in ops {
                    changed |= apply_op(doc, &fm.field, &fm.op, inserting)?;
                }
                Ok(changed)
            }
        }
    }
}

fn targets_id(path: &str) -> bool {
    path.split('.').next() == Some("_id")
}

fn parse_op(op: &str, path: &str, operand: &Bson) -> Result<MutationOp, DbError> {
    Ok(match op {
        "$set" => MutationOp::Set(operand.clone()),
        "$unset" => MutationOp::Unset,
        "$setOnInsert" => MutationOp::SetOnInsert(operand.clone()),
        "$inc" | "$mul" => {
            if number(operand).is_none() {
                return Err(DbError::TypeMismatch(format!(
                    "Cannot {} with non-numeric argument: {{{path}: {operand}}}",
                    if op == "$inc" { "increment" } else { "multiply" }
                )));
            }
            if op == "$inc" {
                MutationOp::Inc(operand.clone())
            } else {
                MutationOp::Mul(operand.clone())
            }
        }
        "$rename" => match operand {
            Bson::String(to) => MutationOp::Rename(to.clone()),
            _ => {
                return Err(DbError::bad_value(format!(
                    "The 'to' field for $rename must be a string: {path}: {operand}"
                )));
            }
        },
        "$push" => MutationOp::Push(each_values(operand)),
        "$addToSet" => MutationOp::AddToSet(each_values(operand)),
        "$pop" => match number(operand) {
            Some(Number::Int(n)) if n == 1 || n == -1 => MutationOp::Pop(n),
            Some(Number::Float(f)) if f == 1.0 || f == -1.0 => MutationOp::Pop(f as i64),
            _ => return Err(DbError::bad_value("$pop expects 1 or -1")),
        },
        "$pull" => MutationOp::Pull(operand.clone()),
        "$min" => MutationOp::Min(operand.clone()),
        "$max" => MutationOp::Max(operand.clone()),
        other => {
            return Err(DbError::bad_value(format!("Unknown modifier: {other}")));
        }
    })
}

fn each_values(operand: &Bson) -> Vec<Bson> {
    if let Bson::Document(d) = operand {
        if let Some(Bson::Array(items)) = d.get("$each") {
            return items.clone();
        }
    }
    vec![operand.clone()]
}

fn apply_op(doc: &mut Document, path: &str, op: &MutationOp, inserting: bool) -> Result<bool, DbError> {
    match op {
        MutationOp::Set(value) => set_if_changed(doc, path, value),
        MutationOp::SetOnInsert(value) => {
            if inserting {
                set_if_changed(doc, path, value)
            } else {
                Ok(false)
            }
        }
        MutationOp::Unset => Ok(field::remove(doc, path)?.is_some()),
        MutationOp::Inc(amount) => {
            let current = field::get(doc, path).cloned();
            let next = match current {
                None => amount.clone(),
                Some(existing) => arithmetic(&existing, amount, path, "$inc", |a, b| a.checked_add(b), |a, b| a + b)?,
            };
            set_if_changed(doc, path, &next)
        }
        MutationOp::Mul(factor) => {
            let current = field::get(doc, path).cloned();
            let next = match current {
                None => zero_like(factor),
                Some(existing) => arithmetic(&existing, factor, path, "$mul", |a, b| a.checked_mul(b), |a, b| a * b)?,
            };
            set_if_changed(doc, path, &next)
        }
        MutationOp::Rename(to) => {
            let Some(value) = field::remove(doc, path)? else {
                return Ok(false);
            };
            field::set(doc, to, value)?;
            Ok(true)
        }
        MutationOp::Push(values) => {
            let mut items = existing_array(doc, path, "$push")?;
            items.extend(values.iter().cloned());
            field::set(doc, path, Bson::Array(items))?;
            Ok(!values.is_empty())
        }
        MutationOp::AddToSet(values) => {
            let mut items = existing_array(doc, path, "$addToSet")?;
            let had = field::get(doc, path).is_some();
            let mut changed = false;
            for value in values {
                if !items.iter().any(|i| values_equal(i, value)) {
                    items.push(value.clone());
                    changed = true;
                }
            }
            if changed || !had {
                field::set(doc, path, Bson::Array(items))?;
                changed = true;
            }
            Ok(changed)
        }
        MutationOp::Pop(direction) => {
            let Some(Bson::Array(items)) = field::get(doc, path).cloned() else {
                return Ok(false);
            };
            let mut items = items;
            if items.is_empty() {
                return Ok(false);
            }
            if *direction < 0 {
                items.remove(0);
            } else {
                items.pop();
            }
            field::set(doc, path, Bson::Array(items))?;
            Ok(true)
        }
        MutationOp::Pull(target) => {
            let Some(Bson::Array(items)) = field::get(doc, path).cloned() else {
                return Ok(false);
            };
            let condition = match target {
                Bson::Document(cond) if cond.keys().next().is_some_and(|k| k.starts_with('$')) => {
                    let mut wrapped = Document::new();
                    wrapped.insert("v", Bson::Document(cond.clone()));
                    Some(crate::filter::parse_filter(&wrapped)?)
                }
                _ => None,
            };
            let before = items.len();
            let kept: Vec<Bson> = items
                .into_iter()
                .filter(|item| !pull_matches(item, target, condition.as_ref()))
                .collect();
            if kept.len() == before {
                return Ok(false);
            }
            field::set(doc, path, Bson::Array(kept))?;
            Ok(true)
        }
        MutationOp::Min(value) | MutationOp::Max(value) => {
            let want = if matches!(op, MutationOp::Min(_)) {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
            match field::get(doc, path) {
                Some(existing) if compare(value, existing) != want => Ok(false),
                _ => set_if_changed(doc, path, value),
            }
        }
    }
}

fn pull_matches(item: &Bson, target: &Bson, condition: Option<&Expression>) -> bool {
    match condition {
        Some(expr) => {
            let mut candidate = Document::new();
            candidate.insert("v", item.clone());
            expr.matches(&candidate)
        }
        None => values_equal(item, target),
    }
}

fn set_if_changed(doc: &mut Document, path: &str, value: &Bson) -> Result<bool, DbError> {
    if let Some(existing) = field::get(doc, path) {
        if existing == value {
            return Ok(false);
        }
    }
    field::set(doc, path, value.clone())?;
    Ok(true)
}

fn existing_array(doc: &Document, path: &str, op: &str) -> Result<Vec<Bson>, DbError> {
    match field::get(doc, path) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => Ok(items.clone()),
        Some(other) => Err(DbError::bad_value(format!(
            "The field '{path}' must be an array but is of type {} in document, {op} cannot be applied",
            type_name(other)
        ))),
    }
}

fn zero_like(value: &Bson) -> Bson {
    match value {
        Bson::Int32(_) => Bson::Int32(0),
        Bson::Int64(_) => Bson::Int64(0),
        _ => Bson::Double(0.0),
    }
}

fn arithmetic(
    existing: &Bson,
    operand: &Bson,
    path: &str,
    op: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Bson, DbError> {
    let (Some(a), Some(b)) = (number(existing), number(operand)) else {
        return Err(DbError::TypeMismatch(format!(
            "Cannot apply {op} to a value of non-numeric type. {{_id: ...}} has the field '{path}' of non-numeric type {}",
            type_name(existing)
        )));
    };
    Ok(match (a, b) {
        (Number::Int(x), Number::Int(y)) => match int_op(x, y) {
            Some(n) if matches!((existing, operand), (Bson::Int32(_), Bson::Int32(_))) => {
                i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32)
            }
            Some(n) => Bson::Int64(n),
            None => Bson::Double(float_op(x as f64, y as f64)),
        },
        (Number::Int(x), Number::Float(y)) => Bson::Double(float_op(x as f64, y)),
        (Number::Float(x), Number::Int(y)) => Bson::Double(float_op(x, y as f64)),
        (Number::Float(x), Number::Float(y)) => Bson::Double(float_op(x, y)),
    })
}

pub(crate) fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal",
        _ => "unknown",
    }
}

/// Build the starting document for an upsert from the equality conditions
/// of `filter`: top-level `{field: value}` pairs, `$eq` operands and the
/// same inside `$and` branches.
pub(crate) fn upsert_seed(filter: &Document) -> Result<Document, DbError> {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed)?;
    Ok(seed)
}

fn collect_equalities(filter: &Document, seed: &mut Document) -> Result<(), DbError> {
    for (key, value) in filter {
        if key == "$and" {
            if let Bson::Array(branches) = value {
                for branch in branches {
                    if let Bson::Document(sub) = branch {
                        collect_equalities(sub, seed)?;
                    }
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        match value {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                if let Some(eq) = ops.get("$eq") {
                    field::set(seed, key, eq.clone())?;
                }
            }
            other => field::set(seed, key, other.clone())?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn apply(update: Document, mut target: Document) -> Document {
        Update::parse(&update).unwrap().apply(&mut target, false).unwrap();
        target
    }

    #[test]
    fn set_unset_and_inc() {
        let out = apply(
            doc! { "$set": { "a.b": 1 }, "$unset": { "gone": "" }, "$inc": { "n": 2 } },
            doc! { "_id": 1, "gone": true, "n": 3 },
        );
        assert_eq!(out, doc! { "_id": 1, "n": 5, "a": { "b": 1 } });
    }

    #[test]
    fn inc_mixes_widths() {
        let out = apply(doc! { "$inc": { "n": 1.5 } }, doc! { "n": 1_i64 });
        assert_eq!(out, doc! { "n": 2.5 });
        let out = apply(doc! { "$inc": { "n": 1_i64 } }, doc! {});
        assert_eq!(out, doc! { "n": 1_i64 });
    }

    #[test]
    fn inc_rejects_non_numeric_target() {
        let mut target = doc! { "n": "x" };
        let err = Update::parse(&doc! { "$inc": { "n": 1 } })
            .unwrap()
            .apply(&mut target, false)
            .unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn push_each_and_add_to_set() {
        let out = apply(
            doc! { "$push": { "tags": { "$each": ["b", "c"] } }, "$addToSet": { "seen": "a" } },
            doc! { "tags": ["a"], "seen": ["a"] },
        );
        assert_eq!(out, doc! { "tags": ["a", "b", "c"], "seen": ["a"] });
    }

    #[test]
    fn pull_with_condition() {
        let out = apply(doc! { "$pull": { "n": { "$gte": 3 } } }, doc! { "n": [1, 3, 5, 2] });
        assert_eq!(out, doc! { "n": [1, 2] });
    }

    #[test]
    fn rename_moves_value() {
        let out = apply(doc! { "$rename": { "old": "new" } }, doc! { "_id": 1, "old": 7 });
        assert_eq!(out, doc! { "_id": 1, "new": 7 });
    }

    #[test]
    fn replacement_keeps_id() {
        let out = apply(doc! { "name": "b" }, doc! { "_id": 9, "name": "a", "extra": 1 });
        assert_eq!(out, doc! { "_id": 9, "name": "b" });
    }

    #[test]
    fn id_is_immutable() {
        assert!(matches!(
            Update::parse(&doc! { "$set": { "_id": 2 } }),
            Err(DbError::ImmutableField(_))
        ));
        let mut target = doc! { "_id": 1 };
        let err = Update::parse(&doc! { "_id": 2, "x": 1 })
            .unwrap()
            .apply(&mut target, false)
            .unwrap_err();
        assert!(matches!(err, DbError::ImmutableField(_)));
    }

    #[test]
    fn unknown_and_mixed_updates_fail() {
        assert!(Update::parse(&doc! { "$frob": { "a": 1 } }).is_err());
        assert!(Update::parse(&doc! { "$set": { "a": 1 }, "b": 2 }).is_err());
    }

    #[test]
    fn unchanged_set_reports_no_change() {
        let mut target = doc! { "a": 1 };
        let changed = Update::parse(&doc! { "$set": { "a": 1 } })
            .unwrap()
            .apply(&mut target, false)
            .unwrap();
        assert!(!changed);
    }

    #[test]
    fn set_on_insert_only_when_inserting() {
        let update = Update::parse(&doc! { "$setOnInsert": { "created": true } }).unwrap();
        let mut existing = doc! { "a": 1 };
        assert!(!update.apply(&mut existing, false).unwrap());
        let mut fresh = doc! {};
        assert!(update.apply(&mut fresh, true).unwrap());
        assert_eq!(fresh, doc! { "created": true });
    }

    #[test]
    fn upsert_seed_collects_equalities() {
        let seed = upsert_seed(&doc! {
            "name": "x",
            "age": { "$gt": 3 },
            "kind": { "$eq": "k" },
            "$and": [ { "tier": 2 } ],
        })
        .unwrap();
        assert_eq!(seed, doc! { "name": "x", "kind": "k", "tier": 2 });
    }
}
