//! Aggregation pipelines over an in-memory document list.

use bson::{Bson, Document};

use crate::compare::{Number, compare, number, values_equal};
use crate::error::DbError;
use crate::field;
use crate::filter::parse_filter;
use crate::projection::Projection;
use crate::sort::SortSpec;

/// Run `pipeline` over `docs`, stage by stage.
pub(crate) fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>, DbError> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::bad_value(
                "A pipeline stage specification object must contain exactly one field.",
            ));
        };
        docs = match name.as_str() {
            "$match" => {
                let expr = parse_filter(stage_doc(name, spec)?)?;
                docs.into_iter().filter(|d| expr.matches(d)).collect()
            }
            "$sort" => {
                let spec = SortSpec::parse(stage_doc(name, spec)?)?;
                spec.sort(&mut docs);
                docs
            }
            "$skip" => {
                let n = non_negative(name, spec)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = non_negative(name, spec)?;
                if n == 0 {
                    return Err(DbError::bad_value("the limit must be positive"));
                }
                docs.into_iter().take(n).collect()
            }
            "$project" => project(docs, stage_doc(name, spec)?)?,
            "$count" => {
                let Bson::String(field_name) = spec else {
                    return Err(DbError::bad_value("the count field must be a non-empty string"));
                };
                if field_name.is_empty() || field_name.starts_with('$') || field_name.contains('.') {
                    return Err(DbError::bad_value("the count field must be a non-empty string"));
                }
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field_name.clone(), count_value(docs.len()));
                    vec![out]
                }
            }
            "$unwind" => unwind(docs, spec)?,
            "$group" => group(docs, stage_doc(name, spec)?)?,
            other => return Err(DbError::UnknownStage(other.to_string())),
        };
    }
    Ok(docs)
}

fn stage_doc<'a>(name: &str, spec: &'a Bson) -> Result<&'a Document, DbError> {
    match spec {
        Bson::Document(d) => Ok(d),
        _ => Err(DbError::bad_value(format!("{name} specification must be an object"))),
    }
}

fn non_negative(name: &str, spec: &Bson) -> Result<usize, DbError> {
    let n = match number(spec) {
        Some(Number::Int(n)) => n,
        Some(Number::Float(f)) if f.fract() == 0.0 => f as i64,
        _ => return Err(DbError::bad_value(format!("invalid argument to {name} stage: {spec}"))),
    };
    usize::try_from(n).map_err(|_| DbError::bad_value(format!("invalid argument to {name} stage: {spec}")))
}

fn count_value(n: usize) -> Bson {
    i32::try_from(n).map_or(Bson::Int64(n as i64), Bson::Int32)
}

/// Evaluate an expression: `"$path"` reads a field (missing → null),
/// documents evaluate field by field, `{$literal: v}` yields `v`, anything
/// else is a constant.
fn evaluate(doc: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(s) if s.starts_with('$') => field::get(doc, &s[1..]).cloned().unwrap_or(Bson::Null),
        Bson::Document(sub) => {
            if let Some(literal) = sub.get("$literal") {
                return literal.clone();
            }
            let mut out = Document::new();
            for (k, v) in sub {
                out.insert(k.clone(), evaluate(doc, v));
            }
            Bson::Document(out)
        }
        Bson::Array(items) => Bson::Array(items.iter().map(|i| evaluate(doc, i)).collect()),
        other => other.clone(),
    }
}

fn project(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DbError> {
    let computed = spec
        .iter()
        .any(|(_, v)| matches!(v, Bson::String(_) | Bson::Document(_) | Bson::Array(_)));
    if !computed {
        let projection = Projection::parse(spec)?;
        return Ok(docs.iter().map(|d| projection.apply(d)).collect());
    }

    let keep_id = !matches!(
        spec.get("_id"),
        Some(Bson::Boolean(false)) | Some(Bson::Int32(0)) | Some(Bson::Int64(0))
    );
    let mut out = Vec::with_capacity(docs.len());
    for doc in &docs {
        let mut projected = Document::new();
        if keep_id {
            if let Some(id) = doc.get("_id") {
                projected.insert("_id", id.clone());
            }
        }
        for (key, value) in spec {
            if key == "_id" && !matches!(value, Bson::String(_) | Bson::Document(_)) {
                continue;
            }
            match value {
                Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0) => {
                    return Err(DbError::bad_value(format!(
                        "Invalid $project :: caused by :: Cannot do exclusion on field {key} in inclusion projection"
                    )));
                }
                Bson::Boolean(true) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                    if let Some(v) = field::get(doc, key) {
                        field::set(&mut projected, key, v.clone())?;
                    }
                }
                expr => {
                    let v = evaluate(doc, expr);
                    field::set(&mut projected, key, v)?;
                }
            }
        }
        out.push(projected);
    }
    Ok(out)
}

fn unwind(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>, DbError> {
    let (path, preserve) = match spec {
        Bson::String(s) => (s.as_str(), false),
        Bson::Document(d) => (
            d.get_str("path")
                .map_err(|_| DbError::bad_value("no path specified to $unwind stage"))?,
            d.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        _ => {
            return Err(DbError::bad_value(
                "expected either a string or an object as specification for $unwind stage",
            ));
        }
    };
    let Some(path) = path.strip_prefix('$') else {
        return Err(DbError::bad_value(
            "path option to $unwind stage should be prefixed with a '$'",
        ));
    };

    let mut out = Vec::new();
    for doc in docs {
        match field::get(&doc, path).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    field::set(&mut copy, path, item)?;
                    out.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

#[derive(Debug)]
enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, DbError> {
        Ok(match op {
            "$sum" => Accumulator::Sum { int: 0, float: 0.0, is_float: false },
            "$avg" => Accumulator::Avg { total: 0.0, count: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            "$push" => Accumulator::Push(Vec::new()),
            other => {
                return Err(DbError::bad_value(format!("unknown group operator '{other}'")));
            }
        })
    }

    fn add(&mut self, value: Bson) {
        match self {
            Accumulator::Sum { int, float, is_float } => match number(&value) {
                Some(Number::Int(n)) => match int.checked_add(n) {
                    Some(next) if !*is_float => *int = next,
                    _ => {
                        *is_float = true;
                        *float += n as f64;
                    }
                },
                Some(Number::Float(f)) => {
                    *is_float = true;
                    *float += f;
                }
                None => {}
            },
            Accumulator::Avg { total, count } => match number(&value) {
                Some(Number::Int(n)) => {
                    *total += n as f64;
                    *count += 1;
                }
                Some(Number::Float(f)) => {
                    *total += f;
                    *count += 1;
                }
                None => {}
            },
            Accumulator::Min(current) => keep_extreme(current, value, std::cmp::Ordering::Less),
            Accumulator::Max(current) => keep_extreme(current, value, std::cmp::Ordering::Greater),
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = value,
            Accumulator::Push(items) => {
                if !matches!(value, Bson::Null) {
                    items.push(value);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum { int, float, is_float } => {
                if is_float {
                    Bson::Double(float + int as f64)
                } else {
                    i32::try_from(int).map_or(Bson::Int64(int), Bson::Int32)
                }
            }
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Bson::Null
                } else {
                    Bson::Double(total / count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) => v.unwrap_or(Bson::Null),
            Accumulator::Last(v) => v,
            Accumulator::Push(items) => Bson::Array(items),
        }
    }
}

// Nulls and missing values never win.
fn keep_extreme(current: &mut Option<Bson>, value: Bson, want: std::cmp::Ordering) {
    if matches!(value, Bson::Null) {
        return;
    }
    let replace = match current {
        None => true,
        Some(existing) => compare(&value, existing) == want,
    };
    if replace {
        *current = Some(value);
    }
}

fn group(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DbError> {
    let Some(id_expr) = spec.get("_id") else {
        return Err(DbError::bad_value("a group specification must include an _id"));
    };

    let mut fields: Vec<(&str, &str, &Bson)> = Vec::new();
    for (name, acc) in spec {
        if name == "_id" {
            continue;
        }
        let Bson::Document(acc_doc) = acc else {
            return Err(DbError::bad_value(format!("The field '{name}' must be an accumulator object")));
        };
        let mut entries = acc_doc.iter();
        let (Some((op, operand)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::bad_value(format!(
                "The field '{name}' must specify one accumulator"
            )));
        };
        Accumulator::new(op)?;
        fields.push((name.as_str(), op.as_str(), operand));
    }

    // Groups keep first-seen order.
    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for doc in &docs {
        let key = evaluate(doc, id_expr);
        let pos = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(pos) => pos,
            None => {
                let accs = fields
                    .iter()
                    .map(|(_, op, _)| Accumulator::new(op))
                    .collect::<Result<Vec<_>, _>>()?;
                groups.push((key, accs));
                groups.len() - 1
            }
        };
        for (acc, (_, _, operand)) in groups[pos].1.iter_mut().zip(&fields) {
            acc.add(evaluate(doc, operand));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (acc, (name, _, _)) in accs.into_iter().zip(&fields) {
                out.insert(*name, acc.finish());
            }
            out
        })
        .collect())
}
