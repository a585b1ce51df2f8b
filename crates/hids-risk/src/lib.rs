//! Rule-based risk scoring over a process's recent syscall history
//! (spec.md §4.4). Pure and stateless: the scorer never mutates the record
//! it scores.

use std::collections::HashMap;

use hids_core::events::ResourceSnapshot;
use once_cell::sync::Lazy;

/// Per-syscall weight contributed once per occurrence in the window.
/// High-risk syscalls carry positive weight; everything else (common file
/// I/O, unknown names) contributes nothing, matching spec.md §4.4's "near
/// zero" and the idle scenario's expectation of risk 0 for a lone `open`.
static SYSCALL_WEIGHTS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("ptrace", 8.0),
        ("setuid", 6.0),
        ("setgid", 5.0),
        ("chmod", 4.0),
        ("chown", 4.0),
        ("mount", 7.0),
        ("umount", 5.0),
        ("execve", 3.0),
        ("clone", 2.0),
        ("chroot", 6.0),
        ("unlink", 3.0),
        ("rename", 2.0),
    ])
});

/// Scales the anomaly score's contribution to risk so that an anomaly
/// score of 100 contributes ~30 (within spec.md §4.4's 25-35 band).
const ANOMALY_RISK_FACTOR: f64 = 0.3;

/// Pure function of recent syscalls, resource snapshot, and anomaly score.
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    /// `resources` is accepted for API completeness (spec.md §4.4 lists it
    /// as a scorer input) but the rule table does not currently weight on
    /// it; resource pressure surfaces in alert payloads, not the score.
    pub fn score(
        &self,
        recent_syscalls: &[String],
        _resources: Option<ResourceSnapshot>,
        anomaly_score: f64,
    ) -> f64 {
        let syscall_component: f64 = recent_syscalls
            .iter()
            .map(|s| *SYSCALL_WEIGHTS.get(s.as_str()).unwrap_or(&0.0))
            .sum();

        let anomaly_component = anomaly_score.clamp(0.0, 100.0) * ANOMALY_RISK_FACTOR;

        (syscall_component + anomaly_component).clamp(0.0, 100.0)
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syscalls(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lone_open_scores_zero() {
        let scorer = RiskScorer::new();
        let score = scorer.score(&syscalls(&["open"]), None, 0.0);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn high_risk_burst_exceeds_threshold() {
        let scorer = RiskScorer::new();
        let mut calls = Vec::new();
        calls.extend(std::iter::repeat("ptrace".to_string()).take(10));
        calls.extend(std::iter::repeat("setuid".to_string()).take(5));
        calls.extend(std::iter::repeat("chmod".to_string()).take(5));

        let score = scorer.score(&calls, None, 0.0);
        assert!(score > 70.0, "expected score > 70, got {score}");
    }

    #[test]
    fn score_is_clipped_to_100() {
        let scorer = RiskScorer::new();
        let calls = syscalls(&["ptrace"; 50]);
        let score = scorer.score(&calls, None, 100.0);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn anomaly_contribution_is_within_spec_band() {
        let scorer = RiskScorer::new();
        let contribution = scorer.score(&[], None, 100.0);
        assert!(
            (25.0..=35.0).contains(&contribution),
            "expected 25-35, got {contribution}"
        );
    }

    #[test]
    fn scorer_is_deterministic() {
        let scorer = RiskScorer::new();
        let calls = syscalls(&["ptrace", "open", "execve"]);
        let a = scorer.score(&calls, None, 10.0);
        let b = scorer.score(&calls, None, 10.0);
        assert_eq!(a, b);
    }
}
