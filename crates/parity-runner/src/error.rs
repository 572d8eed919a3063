use parity_suite::SuiteError;

use crate::transport::TransportError;

/// Why a single case failed. The `Display` text becomes the outcome's error.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("setup failed: {0}")]
    Setup(Box<ExecError>),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fatal, run-level failures. These abort the process.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Suite(#[from] SuiteError),

    #[error("failed to open {mode} transport: {source}")]
    Open {
        mode: parity_suite::Mode,
        #[source]
        source: TransportError,
    },

    #[error("failed to remove fixture {}: {source}", path.display())]
    Fixture {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close transport: {0}")]
    Close(#[source] TransportError),
}
