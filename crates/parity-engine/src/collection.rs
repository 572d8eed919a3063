use bson::oid::ObjectId;
use bson::{Bson, Document};
use tracing::debug;

use crate::aggregate::run_pipeline;
use crate::compare::values_equal;
use crate::database::Database;
use crate::error::DbError;
use crate::field;
use crate::filter::{Expression, parse_filter};
use crate::index::{ID_INDEX_NAME, IndexModel, IndexSpec, check_unique};
use crate::mutation::{Update, upsert_seed};
use crate::options::{FindAndModifyOptions, FindOptions};
use crate::projection::Projection;
use crate::result::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use crate::sort::SortSpec;

/// Stored state of one collection: documents in insertion order plus the
/// index catalog. The `_id_` index is always present.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CollectionData {
    pub(crate) documents: Vec<Document>,
    pub(crate) indexes: Vec<IndexSpec>,
}

impl CollectionData {
    pub(crate) fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexSpec::id_index()],
        }
    }

    fn matching(&self, expr: &Expression) -> Vec<usize> {
        self.documents
            .iter()
            .enumerate()
            .filter(|(_, d)| expr.matches(d))
            .map(|(pos, _)| pos)
            .collect()
    }

    fn insert(&mut self, namespace: &str, doc: Document) -> Result<Bson, DbError> {
        let doc = with_id_first(doc)?;
        check_unique(namespace, &self.indexes, &self.documents, &doc, None)?;
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        self.documents.push(doc);
        Ok(id)
    }

    fn replace_at(&mut self, namespace: &str, pos: usize, doc: Document) -> Result<(), DbError> {
        check_unique(namespace, &self.indexes, &self.documents, &doc, Some(pos))?;
        self.documents[pos] = doc;
        Ok(())
    }
}

/// Ensure `_id` exists and is the first field. Missing ids get a fresh
/// `ObjectId`.
fn with_id_first(doc: Document) -> Result<Document, DbError> {
    match doc.get("_id") {
        Some(Bson::Array(_)) => {
            return Err(DbError::bad_value("can't use an array for _id"));
        }
        Some(Bson::RegularExpression(_)) => {
            return Err(DbError::bad_value("can't use a regex for _id"));
        }
        _ => {}
    }
    if doc.keys().next().map(String::as_str) == Some("_id") {
        return Ok(doc);
    }
    let mut doc = doc;
    let id = doc
        .remove("_id")
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    let mut out = Document::new();
    out.insert("_id", id);
    for (key, value) in doc {
        out.insert(key, value);
    }
    Ok(out)
}

fn sorted_positions(data: &CollectionData, positions: &mut [usize], sort: Option<&SortSpec>) {
    if let Some(sort) = sort {
        positions.sort_by(|a, b| sort.compare(&data.documents[*a], &data.documents[*b]));
    }
}

fn parse_sort(sort: Option<&Document>) -> Result<Option<SortSpec>, DbError> {
    match sort {
        Some(doc) if !doc.is_empty() => SortSpec::parse(doc).map(Some),
        _ => Ok(None),
    }
}

fn parse_projection(projection: Option<&Document>) -> Result<Option<Projection>, DbError> {
    match projection {
        Some(doc) if !doc.is_empty() => Projection::parse(doc).map(Some),
        _ => Ok(None),
    }
}

/// A handle to one named collection. The collection is created by the first
/// write that needs it, or by [`Collection::ensure`].
pub struct Collection<'db> {
    db: &'db Database,
    name: String,
}

impl<'db> Collection<'db> {
    pub(crate) fn new(db: &'db Database, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<db>.<collection>`, as it appears in error messages.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.db.name(), self.name)
    }

    fn read<R>(&self, f: impl FnOnce(Option<&CollectionData>) -> R) -> R {
        self.db.read(|cols| f(cols.get(&self.name)))
    }

    fn write<R>(&self, f: impl FnOnce(&mut CollectionData) -> R) -> R {
        self.db.write(|cols| f(cols.entry(self.name.clone()).or_insert_with(CollectionData::new)))
    }

    fn exists(&self) -> bool {
        self.db.read(|cols| cols.contains_key(&self.name))
    }

    /// Create the collection, with its `_id_` index, unless it already
    /// exists. Returns whether it was created.
    pub fn ensure(&self) -> bool {
        let created = self.db.write(|cols| {
            if cols.contains_key(&self.name) {
                return false;
            }
            cols.insert(self.name.clone(), CollectionData::new());
            true
        });
        if created {
            debug!(collection = %self.name, "collection created");
        }
        created
    }

    // ── Insert operations ───────────────────────────────────────

    /// Insert a single document. Assigns an `ObjectId` `_id` when absent.
    pub fn insert_one(&self, doc: Document) -> Result<InsertOneResult, DbError> {
        let namespace = self.namespace();
        let inserted_id = self.write(|data| data.insert(&namespace, doc))?;
        debug!(collection = %self.name, "inserted one document");
        Ok(InsertOneResult { inserted_id })
    }

    /// Insert documents in order, stopping at the first failure. Documents
    /// before the failing one stay inserted.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyResult, DbError> {
        let namespace = self.namespace();
        let inserted_ids = self.write(|data| {
            docs.into_iter()
                .map(|doc| data.insert(&namespace, doc))
                .collect::<Result<Vec<_>, _>>()
        })?;
        debug!(collection = %self.name, count = inserted_ids.len(), "inserted documents");
        Ok(InsertManyResult { inserted_ids })
    }

    // ── Query operations ────────────────────────────────────────

    pub fn find(&self, filter: &Document, options: &FindOptions) -> Result<Vec<Document>, DbError> {
        let expr = parse_filter(filter)?;
        let sort = parse_sort(options.sort.as_ref())?;
        let projection = parse_projection(options.projection.as_ref())?;

        let mut docs: Vec<Document> = self.read(|data| {
            data.map(|d| d.documents.iter().filter(|doc| expr.matches(doc)).cloned().collect())
                .unwrap_or_default()
        });
        if let Some(sort) = &sort {
            sort.sort(&mut docs);
        }
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options.effective_limit().unwrap_or(usize::MAX);
        Ok(docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &projection {
                Some(p) => p.apply(&doc),
                None => doc,
            })
            .collect())
    }

    pub fn find_one(&self, filter: &Document) -> Result<Option<Document>, DbError> {
        let options = FindOptions {
            limit: 1,
            ..Default::default()
        };
        Ok(self.find(filter, &options)?.into_iter().next())
    }

    pub fn count_documents(&self, filter: &Document) -> Result<u64, DbError> {
        let expr = parse_filter(filter)?;
        Ok(self.read(|data| data.map_or(0, |d| d.matching(&expr).len() as u64)))
    }

    /// Distinct values of `field` across matching documents, in first-seen
    /// order. Array values contribute their elements.
    pub fn distinct(&self, field_path: &str, filter: &Document) -> Result<Vec<Bson>, DbError> {
        let expr = parse_filter(filter)?;
        Ok(self.read(|data| {
            let mut values: Vec<Bson> = Vec::new();
            let Some(data) = data else {
                return values;
            };
            for doc in data.documents.iter().filter(|d| expr.matches(d)) {
                for value in field::lookup(doc, field_path) {
                    let items: Vec<&Bson> = match value {
                        Bson::Array(items) => items.iter().collect(),
                        other => vec![other],
                    };
                    for item in items {
                        if !values.iter().any(|v| values_equal(v, item)) {
                            values.push(item.clone());
                        }
                    }
                }
            }
            values
        }))
    }

    pub fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, DbError> {
        let docs = self.read(|data| data.map(|d| d.documents.clone()).unwrap_or_default());
        run_pipeline(docs, pipeline)
    }

    // ── Update operations ───────────────────────────────────────

    pub fn update_one(&self, filter: &Document, update: &Document, upsert: bool) -> Result<UpdateResult, DbError> {
        self.update(filter, &Update::parse(update)?, false, upsert)
    }

    pub fn update_many(&self, filter: &Document, update: &Document, upsert: bool) -> Result<UpdateResult, DbError> {
        self.update(filter, &Update::parse(update)?, true, upsert)
    }

    /// Replace the first matching document, keeping its `_id`.
    pub fn replace_one(&self, filter: &Document, replacement: &Document, upsert: bool) -> Result<UpdateResult, DbError> {
        self.update(filter, &Update::replacement(replacement)?, false, upsert)
    }

    pub(crate) fn update(
        &self,
        filter: &Document,
        update: &Update,
        multi: bool,
        upsert: bool,
    ) -> Result<UpdateResult, DbError> {
        let expr = parse_filter(filter)?;
        if !upsert && !self.exists() {
            return Ok(UpdateResult::default());
        }
        let namespace = self.namespace();
        let result = self.write(|data| {
            let mut positions = data.matching(&expr);
            if !multi {
                positions.truncate(1);
            }
            let mut result = UpdateResult::default();
            for pos in positions {
                result.matched += 1;
                let mut next = data.documents[pos].clone();
                if update.apply(&mut next, false)? {
                    data.replace_at(&namespace, pos, next)?;
                    result.modified += 1;
                }
            }
            if result.matched == 0 && upsert {
                let mut seed = upsert_seed(filter)?;
                update.apply(&mut seed, true)?;
                result.upserted_id = Some(data.insert(&namespace, seed)?);
            }
            Ok::<_, DbError>(result)
        })?;
        debug!(
            collection = %self.name,
            matched = result.matched,
            modified = result.modified,
            upserted = result.upserted_id.is_some(),
            "update applied"
        );
        Ok(result)
    }

    // ── Delete operations ───────────────────────────────────────

    pub fn delete_one(&self, filter: &Document) -> Result<DeleteResult, DbError> {
        self.delete(filter, false)
    }

    pub fn delete_many(&self, filter: &Document) -> Result<DeleteResult, DbError> {
        self.delete(filter, true)
    }

    pub(crate) fn delete(&self, filter: &Document, multi: bool) -> Result<DeleteResult, DbError> {
        let expr = parse_filter(filter)?;
        if !self.exists() {
            return Ok(DeleteResult::default());
        }
        let deleted = self.write(|data| {
            let mut positions = data.matching(&expr);
            if !multi {
                positions.truncate(1);
            }
            for pos in positions.iter().rev() {
                data.documents.remove(*pos);
            }
            positions.len() as u64
        });
        debug!(collection = %self.name, deleted, "delete applied");
        Ok(DeleteResult { deleted })
    }

    // ── Find and modify ─────────────────────────────────────────

    /// Atomically find one document (respecting `sort`) and update or remove
    /// it. Returns the pre-image, or the post-image when `new` is set.
    pub fn find_and_modify(
        &self,
        filter: &Document,
        options: &FindAndModifyOptions,
    ) -> Result<Option<Document>, DbError> {
        if options.remove && (options.update.is_some() || options.upsert) {
            return Err(DbError::bad_value("Cannot specify both an update and remove=true"));
        }
        let update = match (&options.update, options.remove) {
            (Some(doc), false) => Some(Update::parse(doc)?),
            (None, false) => {
                return Err(DbError::bad_value("Either an update or remove=true must be specified"));
            }
            (_, true) => None,
        };
        let expr = parse_filter(filter)?;
        let sort = parse_sort(options.sort.as_ref())?;
        let projection = parse_projection(options.projection.as_ref())?;
        if !options.upsert && !self.exists() {
            return Ok(None);
        }

        let namespace = self.namespace();
        let found = self.write(|data| {
            let mut positions = data.matching(&expr);
            sorted_positions(data, &mut positions, sort.as_ref());

            let Some(&pos) = positions.first() else {
                let Some(update) = &update else {
                    return Ok::<_, DbError>(None);
                };
                if !options.upsert {
                    return Ok(None);
                }
                let mut seed = upsert_seed(filter)?;
                update.apply(&mut seed, true)?;
                data.insert(&namespace, seed)?;
                return Ok(if options.new { data.documents.last().cloned() } else { None });
            };

            match &update {
                None => Ok(Some(data.documents.remove(pos))),
                Some(update) => {
                    let before = data.documents[pos].clone();
                    let mut after = before.clone();
                    if update.apply(&mut after, false)? {
                        data.replace_at(&namespace, pos, after.clone())?;
                    }
                    Ok(Some(if options.new { after } else { before }))
                }
            }
        })?;

        Ok(found.map(|doc| match &projection {
            Some(p) => p.apply(&doc),
            None => doc,
        }))
    }

    // ── Index operations ────────────────────────────────────────

    /// Create an index and return its name. Re-creating an identical index
    /// is a no-op.
    pub fn create_index(&self, model: IndexModel) -> Result<String, DbError> {
        let spec = IndexSpec::from_model(&model)?;
        let namespace = self.namespace();
        let name = self.write(|data| {
            if let Some(existing) = data.indexes.iter().find(|i| i.name == spec.name) {
                if existing.same_keys(&spec) && existing.unique == spec.unique {
                    return Ok(spec.name.clone());
                }
                return Err(DbError::IndexConflict(format!(
                    "Index with name: {} already exists with different options",
                    spec.name
                )));
            }
            if let Some(existing) = data.indexes.iter().find(|i| i.same_keys(&spec)) {
                return Err(DbError::IndexConflict(format!(
                    "Index already exists with a different name: {}",
                    existing.name
                )));
            }
            if spec.unique {
                let single = std::slice::from_ref(&spec);
                for (pos, doc) in data.documents.iter().enumerate() {
                    check_unique(&namespace, single, &data.documents[..pos], doc, None)?;
                }
            }
            data.indexes.push(spec.clone());
            Ok(spec.name.clone())
        })?;
        debug!(collection = %self.name, index = %name, "index created");
        Ok(name)
    }

    /// Index descriptions: `{v, key, name, unique?}`, `_id_` first.
    pub fn list_indexes(&self) -> Result<Vec<Document>, DbError> {
        self.read(|data| match data {
            Some(data) => Ok(data.indexes.iter().map(IndexSpec::to_document).collect()),
            None => Err(DbError::NamespaceNotFound(self.namespace())),
        })
    }

    /// Drop one index by name, or every index except `_id_` with `"*"`.
    pub fn drop_index(&self, name: &str) -> Result<(), DbError> {
        if !self.exists() {
            return Err(DbError::NamespaceNotFound(self.namespace()));
        }
        if name == ID_INDEX_NAME {
            return Err(DbError::InvalidOptions("cannot drop _id index".into()));
        }
        self.write(|data| {
            if name == "*" {
                data.indexes.retain(|i| i.name == ID_INDEX_NAME);
                return Ok(());
            }
            let before = data.indexes.len();
            data.indexes.retain(|i| i.name != name);
            if data.indexes.len() == before {
                return Err(DbError::IndexNotFound(name.to_string()));
            }
            Ok(())
        })?;
        debug!(collection = %self.name, index = %name, "index dropped");
        Ok(())
    }

    /// Drop the whole collection. Returns whether it existed.
    pub fn drop(&self) -> bool {
        self.db.write(|cols| cols.remove(&self.name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn id_is_moved_to_the_front() {
        let doc = with_id_first(doc! { "a": 1, "_id": 5 }).unwrap();
        assert_eq!(doc.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(doc, doc! { "_id": 5, "a": 1 });
    }

    #[test]
    fn missing_id_gets_object_id() {
        let doc = with_id_first(doc! { "a": 1 }).unwrap();
        assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn array_id_is_rejected() {
        assert!(with_id_first(doc! { "_id": [1, 2] }).is_err());
    }
}
