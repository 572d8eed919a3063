use bson::Document;

/// Options for `find`. Defaults are neutral: no sort, skip, limit or projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: u64,
    /// Zero means no limit. Negative limits use their absolute value.
    pub limit: i64,
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn effective_limit(&self) -> Option<usize> {
        match self.limit.unsigned_abs() {
            0 => None,
            n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

/// Options for `find_and_modify`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    pub sort: Option<Document>,
    /// Update document. Required unless `remove` is set.
    pub update: Option<Document>,
    pub remove: bool,
    /// Return the post-image instead of the pre-image.
    pub new: bool,
    pub upsert: bool,
    pub projection: Option<Document>,
}
