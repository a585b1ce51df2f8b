//! Ensemble inference: standard scaling -> PCA projection -> two
//! independent one-class models, combined per spec.md §4.5.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use hids_core::events::ResourceSnapshot;

use crate::error::AnomalyError;
use crate::features::{self, FEATURE_DIM};
use crate::model::{ModelArtifact, MODEL_SCHEMA_VERSION};

/// Minimum window size before inference runs at all (spec.md §4.5).
pub const MIN_WINDOW_SIZE: usize = 15;
/// Default verdict threshold on the averaged [0, 100] score.
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 60.0;

/// Syscalls flagged in the explanation string when present in the window.
/// Mirrors the high-risk vocabulary `hids-risk` scores on; duplicated here
/// (rather than depending on `hids-risk`) since this crate's only use for
/// the list is cosmetic (the explanation string), not scoring.
const HIGH_RISK_SYSCALLS: &[&str] = &[
    "ptrace", "setuid", "setgid", "chmod", "chown", "mount", "umount", "execve", "clone",
    "chroot", "unlink", "rename",
];

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyResult {
    pub score: f64,
    pub verdict: bool,
    pub confidence: f64,
    pub explanation: String,
}

impl AnomalyResult {
    fn zero() -> Self {
        Self {
            score: 0.0,
            verdict: false,
            confidence: 0.0,
            explanation: String::new(),
        }
    }
}

/// Pre-trained ensemble anomaly detector. Read-only after load; requires no
/// lock during inference itself (spec.md §5), aside from the small sticky
/// last-known-score cache keyed by pid.
pub struct AnomalyDetector {
    artifact: Option<ModelArtifact>,
    sticky: Mutex<HashMap<u32, AnomalyResult>>,
    logged_failures: Mutex<HashSet<u32>>,
}

impl AnomalyDetector {
    /// A detector with no loaded model: every call returns zeros
    /// (spec.md §4.5 "on load failure ... the detector remains un-fitted").
    pub fn unfitted() -> Self {
        Self {
            artifact: None,
            sticky: Mutex::new(HashMap::new()),
            logged_failures: Mutex::new(HashSet::new()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AnomalyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| AnomalyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&contents).map_err(|source| AnomalyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if artifact.schema_version != MODEL_SCHEMA_VERSION {
            return Err(AnomalyError::VersionMismatch {
                found: artifact.schema_version,
                expected: MODEL_SCHEMA_VERSION,
            });
        }
        Ok(Self {
            artifact: Some(artifact),
            sticky: Mutex::new(HashMap::new()),
            logged_failures: Mutex::new(HashSet::new()),
        })
    }

    /// Loads from `path`, falling back to [`Self::unfitted`] and logging on
    /// any failure — the rest of the system must continue to function
    /// (spec.md §4.5, §7(c)).
    pub fn load_or_unfitted(path: &Path) -> Self {
        match Self::load(path) {
            Ok(detector) => detector,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "anomaly model failed to load, running un-fitted");
                Self::unfitted()
            }
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn infer(
        &self,
        pid: u32,
        recent_syscalls: &[String],
        resources: Option<ResourceSnapshot>,
    ) -> AnomalyResult {
        if recent_syscalls.len() < MIN_WINDOW_SIZE {
            return AnomalyResult::zero();
        }
        let Some(artifact) = &self.artifact else {
            return AnomalyResult::zero();
        };

        match self.infer_checked(artifact, recent_syscalls, resources) {
            Ok(result) => {
                self.sticky.lock().insert(pid, result.clone());
                result
            }
            Err(err) => {
                let mut logged = self.logged_failures.lock();
                if logged.insert(pid) {
                    warn!(pid, error = %err, "anomaly inference failed, returning sticky last score");
                }
                self.sticky
                    .lock()
                    .get(&pid)
                    .cloned()
                    .unwrap_or_else(AnomalyResult::zero)
            }
        }
    }

    fn infer_checked(
        &self,
        artifact: &ModelArtifact,
        recent_syscalls: &[String],
        resources: Option<ResourceSnapshot>,
    ) -> Result<AnomalyResult, AnomalyError> {
        if artifact.scaler.mean.len() != FEATURE_DIM || artifact.scaler.scale.len() != FEATURE_DIM
        {
            return Err(AnomalyError::ShapeMismatch(format!(
                "scaler expects {} dims",
                FEATURE_DIM
            )));
        }

        let raw_features = features::extract(recent_syscalls, resources);
        let scaled = artifact.scaler.transform(&raw_features);
        let projected = artifact.pca.project(&scaled);

        let iforest_raw = artifact.isolation_forest.raw_margin(&projected);
        let svm_raw = artifact.one_class_svm.raw_margin(&projected);

        let iforest_norm = normalize(
            iforest_raw,
            artifact.isolation_forest.score_min,
            artifact.isolation_forest.score_max,
        );
        let svm_norm = normalize(
            svm_raw,
            artifact.one_class_svm.score_min,
            artifact.one_class_svm.score_max,
        );

        let iforest_verdict = iforest_norm >= 50.0;
        let svm_verdict = svm_norm >= 50.0;

        let averaged = ((iforest_norm + svm_norm) / 2.0).clamp(0.0, 100.0);
        let threshold = if artifact.anomaly_threshold > 0.0 {
            artifact.anomaly_threshold
        } else {
            DEFAULT_ANOMALY_THRESHOLD
        };
        let verdict = (iforest_verdict && svm_verdict) || averaged >= threshold;

        let confidence =
            ((boundary_distance(iforest_norm) + boundary_distance(svm_norm)) / 2.0).clamp(0.0, 1.0);

        Ok(AnomalyResult {
            score: averaged,
            verdict,
            confidence,
            explanation: explain(recent_syscalls),
        })
    }
}

fn normalize(raw: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        return 50.0;
    }
    (((raw - min) / (max - min)) * 100.0).clamp(0.0, 100.0)
}

fn boundary_distance(normalized: f64) -> f64 {
    ((normalized - 50.0).abs() / 50.0).clamp(0.0, 1.0)
}

fn explain(recent_syscalls: &[String]) -> String {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for syscall in recent_syscalls {
        *counts.entry(syscall.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top: Vec<&str> = ranked.iter().take(3).map(|(name, _)| *name).collect();

    let high_risk: Vec<&str> = top
        .iter()
        .filter(|name| HIGH_RISK_SYSCALLS.contains(name))
        .copied()
        .collect();

    if high_risk.is_empty() {
        format!("top syscalls: {}", top.join(", "))
    } else {
        format!(
            "top syscalls: {} (high-risk: {})",
            top.join(", "),
            high_risk.join(", ")
        )
    }
}

pub fn default_model_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("hids-agent")
        .join("anomaly_model.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(n: usize, syscall: &str) -> Vec<String> {
        std::iter::repeat(syscall.to_string()).take(n).collect()
    }

    #[test]
    fn fewer_than_15_syscalls_never_triggers_anomaly() {
        let detector = AnomalyDetector::unfitted();
        let result = detector.infer(1, &window(14, "ptrace"), None);
        assert_eq!(result.score, 0.0);
        assert!(!result.verdict);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn unfitted_detector_always_returns_zero() {
        let detector = AnomalyDetector::unfitted();
        let result = detector.infer(1, &window(50, "ptrace"), None);
        assert_eq!(result.score, 0.0);
        assert!(!result.verdict);
    }

    #[test]
    fn boundary_at_15_may_run_inference() {
        let detector = AnomalyDetector::unfitted();
        // At 15 syscalls the gate opens (detector still unfitted -> zero,
        // but it must not take the short-window early return).
        let result = detector.infer(1, &window(15, "ptrace"), None);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn normalize_clamps_out_of_range_margins() {
        assert_eq!(normalize(1000.0, 0.0, 10.0), 100.0);
        assert_eq!(normalize(-1000.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn explain_lists_top_syscalls_and_flags_high_risk() {
        let calls = vec![
            "ptrace".to_string(),
            "ptrace".to_string(),
            "open".to_string(),
        ];
        let text = explain(&calls);
        assert!(text.contains("ptrace"));
        assert!(text.contains("high-risk"));
    }
}
