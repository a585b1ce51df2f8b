//! State-snapshot schema and atomic writer (spec.md §4.8, §6).

pub mod error;
pub mod schema;
pub mod writer;

pub use error::{SnapshotError, SnapshotResult};
pub use schema::{ProcessSnapshot, Snapshot, StatsSnapshot};
pub use writer::{default_fallback_path, SnapshotWriter};
