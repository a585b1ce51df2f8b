//! Derived-on-read agent statistics (spec.md §3, §9 "global mutable counters").
//!
//! `total_syscalls` is the one cumulative counter the core keeps (a single
//! atomic increment per event has no cross-thread race to speak of); every
//! other count is recomputed from the tracker's live state on each read, per
//! the design note replacing the original's live-mutated counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::process::{ProcessRecord, ProcessTracker, INACTIVITY_TIMEOUT_SECS};

const ANOMALY_VERDICT_THRESHOLD: f64 = 60.0;
const DETECTION_RECENCY_WINDOW_SECS: f64 = 300.0;

/// A point-in-time read of the agent's counters, ready for the snapshot writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedStats {
    pub total_processes: usize,
    pub active: usize,
    pub high_risk: usize,
    pub anomalies: usize,
    pub total_syscalls: u64,
    pub recent_c2: usize,
    pub recent_scans: usize,
}

/// Cumulative total-syscall counter plus the machinery to derive the rest
/// of [`DerivedStats`] from a [`ProcessTracker`] snapshot.
#[derive(Default)]
pub struct AgentStats {
    total_syscalls: AtomicU64,
}

impl AgentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_syscall(&self) {
        self.total_syscalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_syscalls(&self) -> u64 {
        self.total_syscalls.load(Ordering::Relaxed)
    }

    /// Computes the full set of derived counts as of `now`.
    ///
    /// `recent_c2`/`recent_scans` are passed in because the detection
    /// timestamps they're derived from live in `hids-netwatch`'s
    /// connection analyzer, not in the process tracker.
    pub fn derive(
        &self,
        tracker: &ProcessTracker,
        risk_threshold: f64,
        recent_c2: usize,
        recent_scans: usize,
        now: f64,
    ) -> DerivedStats {
        let records = tracker.snapshot();
        let total_processes = records.len();

        let active_records: Vec<&ProcessRecord> = records
            .iter()
            .filter(|r| now - r.last_update <= INACTIVITY_TIMEOUT_SECS)
            .collect();
        let active = active_records.len();
        let high_risk = active_records
            .iter()
            .filter(|r| r.risk_score >= risk_threshold)
            .count();
        let anomalies = active_records
            .iter()
            .filter(|r| r.anomaly_score >= ANOMALY_VERDICT_THRESHOLD)
            .count();

        DerivedStats {
            total_processes,
            active,
            high_risk,
            anomalies,
            total_syscalls: self.total_syscalls(),
            recent_c2,
            recent_scans,
        }
    }
}

/// Filters a ring of detection timestamps down to those within the
/// "recent" window (spec.md §4.8: 300 s), for `recent_c2`/`recent_scans`.
pub fn count_recent(timestamps: &std::collections::VecDeque<f64>, now: f64) -> usize {
    timestamps
        .iter()
        .filter(|&&t| now - t <= DETECTION_RECENCY_WINDOW_SECS)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SyscallEvent;
    use std::collections::VecDeque;

    #[test]
    fn derive_counts_active_and_high_risk() {
        let tracker = ProcessTracker::new(999, vec![]);
        tracker.record_event(&SyscallEvent::new(1000, "open", 0.0));
        tracker.update_scores(1000, 80.0, 0.0, false, String::new());

        let stats = AgentStats::new();
        stats.record_syscall();
        stats.record_syscall();

        let derived = stats.derive(&tracker, 70.0, 0, 0, 10.0);
        assert_eq!(derived.total_processes, 1);
        assert_eq!(derived.active, 1);
        assert_eq!(derived.high_risk, 1);
        assert_eq!(derived.total_syscalls, 2);
    }

    #[test]
    fn derive_excludes_inactive_processes_from_active_count() {
        let tracker = ProcessTracker::new(999, vec![]);
        tracker.record_event(&SyscallEvent::new(1000, "open", 0.0));

        let stats = AgentStats::new();
        let derived = stats.derive(&tracker, 70.0, 0, 0, 1000.0);
        assert_eq!(derived.total_processes, 1);
        assert_eq!(derived.active, 0);
    }

    #[test]
    fn count_recent_filters_by_window() {
        let mut timestamps = VecDeque::new();
        timestamps.push_back(0.0);
        timestamps.push_back(250.0);
        timestamps.push_back(290.0);
        assert_eq!(count_recent(&timestamps, 300.0), 2);
    }
}
