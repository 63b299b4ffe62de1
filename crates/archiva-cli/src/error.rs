use std::io;

use archiva_core::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] archiva_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote is not configured. Run `archiva config init --api-base-url <URL>` or set ARCHIVA_API_BASE_URL."
    )]
    RemoteNotConfigured,
    #[error("Remote delete failed for record {0}; it was kept locally")]
    DeleteFailed(String),
}
