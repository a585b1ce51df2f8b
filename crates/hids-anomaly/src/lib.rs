//! Feature extraction and ensemble inference for the pre-trained anomaly
//! models (spec.md §4.5).

pub mod detector;
pub mod error;
pub mod features;
pub mod model;

pub use detector::{AnomalyDetector, AnomalyResult, DEFAULT_ANOMALY_THRESHOLD, MIN_WINDOW_SIZE};
pub use error::AnomalyError;
pub use features::FEATURE_DIM;
pub use model::{
    IsolationForestModel, IsolationNode, IsolationTree, ModelArtifact, OneClassSvmModel, Pca,
    StandardScaler, MODEL_SCHEMA_VERSION,
};
