use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model schema version mismatch: artifact has {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("unexpected feature vector shape: {0}")]
    ShapeMismatch(String),
}
