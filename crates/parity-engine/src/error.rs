#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("E11000 duplicate key error collection: {namespace} index: {index} dup key: {key}")]
    DuplicateKey {
        namespace: String,
        index: String,
        key: String,
    },

    #[error("ns does not exist: {0}")]
    NamespaceNotFound(String),

    #[error("index not found with name [{0}]")]
    IndexNotFound(String),

    #[error("{0}")]
    IndexConflict(String),

    #[error("{0}")]
    InvalidOptions(String),

    #[error("{0}")]
    ImmutableField(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("{0}")]
    BadValue(String),

    #[error("unrecognized pipeline stage name: '{0}'")]
    UnknownStage(String),

    #[error("no such command: '{0}'")]
    CommandNotFound(String),

    #[error("corrupt snapshot: {0}")]
    Snapshot(String),

    #[error("bson error: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub(crate) fn bad_value(msg: impl Into<String>) -> Self {
        DbError::BadValue(msg.into())
    }

    /// Numeric server error code reported in failed command replies.
    pub fn code(&self) -> i32 {
        match self {
            DbError::DuplicateKey { .. } => 11000,
            DbError::NamespaceNotFound(_) => 26,
            DbError::IndexNotFound(_) => 27,
            DbError::IndexConflict(_) => 85,
            DbError::InvalidOptions(_) => 72,
            DbError::ImmutableField(_) => 66,
            DbError::TypeMismatch(_) => 14,
            DbError::BadValue(_) => 2,
            DbError::UnknownStage(_) => 40324,
            DbError::CommandNotFound(_) => 59,
            DbError::Snapshot(_) | DbError::Bson(_) | DbError::Io(_) => 1,
        }
    }

    pub fn code_name(&self) -> &'static str {
        match self {
            DbError::DuplicateKey { .. } => "DuplicateKey",
            DbError::NamespaceNotFound(_) => "NamespaceNotFound",
            DbError::IndexNotFound(_) => "IndexNotFound",
            DbError::IndexConflict(_) => "IndexOptionsConflict",
            DbError::InvalidOptions(_) => "InvalidOptions",
            DbError::ImmutableField(_) => "ImmutableField",
            DbError::TypeMismatch(_) => "TypeMismatch",
            DbError::BadValue(_) => "BadValue",
            DbError::UnknownStage(_) => "Location40324",
            DbError::CommandNotFound(_) => "CommandNotFound",
            DbError::Snapshot(_) | DbError::Bson(_) | DbError::Io(_) => "InternalError",
        }
    }
}
