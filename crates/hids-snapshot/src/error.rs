use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write snapshot to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("primary and fallback snapshot paths both failed; last error: {0}")]
    AllPathsFailed(std::io::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
