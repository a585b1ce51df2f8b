//! Atomic state-snapshot writer (spec.md §4.8).
//!
//! Atomic-write idiom grounded in
//! `oisp-oximy/src/enrollment/credentials.rs::FileCredentialStore::save`
//! (temp-file-plus-rename), adapted to a world-readable snapshot rather
//! than an `0o600` secret.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{SnapshotError, SnapshotResult};
use crate::schema::Snapshot;

/// Snapshot file permissions: world-readable, owner-writable (spec.md §6 —
/// other tools on the host read this file for visibility).
#[cfg(unix)]
const SNAPSHOT_MODE: u32 = 0o644;

/// Writes [`Snapshot`] documents to disk atomically, falling back to a
/// secondary path if the primary write fails.
pub struct SnapshotWriter {
    primary_path: PathBuf,
    fallback_path: Option<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(primary_path: impl Into<PathBuf>, fallback_path: Option<PathBuf>) -> Self {
        Self {
            primary_path: primary_path.into(),
            fallback_path,
        }
    }

    /// Serializes and atomically writes `snapshot`, trying the fallback
    /// path if the primary path's write fails (spec.md §4.8, error
    /// taxonomy (e): "snapshot write failures are logged and retried on
    /// the fallback path, never fatal").
    pub fn write(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        let json = serde_json::to_string_pretty(snapshot)?;

        match write_atomic(&self.primary_path, &json) {
            Ok(()) => {
                debug!(path = %self.primary_path.display(), "wrote snapshot");
                Ok(())
            }
            Err(primary_err) => {
                warn!(
                    path = %self.primary_path.display(),
                    error = %primary_err,
                    "primary snapshot write failed"
                );
                let Some(fallback) = &self.fallback_path else {
                    return Err(SnapshotError::Write {
                        path: self.primary_path.clone(),
                        source: primary_err,
                    });
                };
                write_atomic(fallback, &json).map_err(SnapshotError::AllPathsFailed)?;
                debug!(path = %fallback.display(), "wrote snapshot to fallback path");
                Ok(())
            }
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(SNAPSHOT_MODE))?;
    }

    Ok(())
}

/// Default fallback path under the user's cache directory, used when the
/// primary `/tmp` path is unwritable (spec.md §6).
pub fn default_fallback_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("hids-agent").join("security_agent_state.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hids_core::stats::DerivedStats;
    use tempfile::TempDir;

    #[test]
    fn writes_and_reads_back_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let writer = SnapshotWriter::new(&path, None);

        let snapshot = Snapshot::build(&[], DerivedStats::default(), 42.0);
        writer.write(&snapshot).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["timestamp"], 42.0);
    }

    #[test]
    fn no_temp_file_left_behind_after_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let writer = SnapshotWriter::new(&path, None);
        writer.write(&Snapshot::build(&[], DerivedStats::default(), 0.0)).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn falls_back_when_primary_parent_is_unwritable() {
        let dir = TempDir::new().unwrap();
        let unwritable_primary = dir.path().join("no-such-parent-dir-marker-file");
        let fallback = dir.path().join("fallback.json");

        // Primary path's "parent" is actually a file, so create_dir_all fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let primary = blocker.join("state.json");
        let _ = unwritable_primary;

        let writer = SnapshotWriter::new(&primary, Some(fallback.clone()));
        writer.write(&Snapshot::build(&[], DerivedStats::default(), 0.0)).unwrap();
        assert!(fallback.exists());
    }
}
