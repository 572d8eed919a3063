//! Dotted field paths over documents.

use bson::{Bson, Document};

use crate::error::DbError;

/// Collect every value reachable by `path`.
///
/// Arrays of sub-documents fan out: `items.sku` over
/// `{items: [{sku: 1}, {sku: 2}]}` yields both `1` and `2`. A numeric
/// segment indexes into an array.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_from_doc(doc, &segments, &mut out);
    out
}

/// The first value reachable by `path`, if any.
pub(crate) fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    lookup(doc, path).into_iter().next()
}

fn collect_from_doc<'a>(doc: &'a Document, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if let Some(value) = doc.get(*first) {
        collect_from_value(value, rest, out);
    }
}

fn collect_from_value<'a>(value: &'a Bson, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((next, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Bson::Document(sub) => collect_from_doc(sub, rest, out),
        Bson::Array(items) => match next.parse::<usize>() {
            Ok(idx) => {
                if let Some(item) = items.get(idx) {
                    collect_from_value(item, tail, out);
                }
            }
            Err(_) => {
                for item in items {
                    if let Bson::Document(sub) = item {
                        collect_from_doc(sub, rest, out);
                    }
                }
            }
        },
        _ => {}
    }
}

/// Mutable access to the parent container of `path`'s last segment.
///
/// When `create` is set, missing intermediate documents are created. Returns
/// `Ok(None)` when the parent does not exist and was not created.
pub(crate) fn parent_mut<'a>(
    doc: &'a mut Document,
    path: &'a str,
    create: bool,
) -> Result<Option<(&'a mut Document, &'a str)>, DbError> {
    let mut segments = path.split('.');
    let leaf = match path.rsplit_once('.') {
        Some((_, leaf)) => leaf,
        None => path,
    };
    let depth = path.split('.').count() - 1;

    let mut current = doc;
    for _ in 0..depth {
        let Some(segment) = segments.next() else {
            break;
        };
        if !current.contains_key(segment) {
            if !create {
                return Ok(None);
            }
            current.insert(segment, Document::new());
        }
        current = match current.get_mut(segment) {
            Some(Bson::Document(sub)) => sub,
            Some(other) if create => {
                return Err(DbError::bad_value(format!(
                    "Cannot create field '{leaf}' in element {{{segment}: {other}}}"
                )));
            }
            _ => return Ok(None),
        };
    }
    Ok(Some((current, leaf)))
}

pub(crate) fn set(doc: &mut Document, path: &str, value: Bson) -> Result<(), DbError> {
    if let Some((parent, leaf)) = parent_mut(doc, path, true)? {
        parent.insert(leaf, value);
    }
    Ok(())
}

pub(crate) fn remove(doc: &mut Document, path: &str) -> Result<Option<Bson>, DbError> {
    Ok(match parent_mut(doc, path, false)? {
        Some((parent, leaf)) => parent.remove(leaf),
        None => None,
    })
}
