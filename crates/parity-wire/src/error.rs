#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bson error: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("message length {0} exceeds the maximum of 48 MiB")]
    MessageTooLarge(usize),

    #[error("invalid message length {0}")]
    InvalidLength(i64),

    #[error("unsupported opcode {0}")]
    UnsupportedOpCode(i32),

    #[error("malformed message: {0}")]
    Malformed(String),
}
