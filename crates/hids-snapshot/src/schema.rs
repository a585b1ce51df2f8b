//! The on-disk snapshot JSON schema (spec.md §6).

use serde::Serialize;

use hids_core::process::ProcessRecord;
use hids_core::stats::DerivedStats;

/// Per-process entry in the snapshot, sorted by `risk_score` descending and
/// capped at 50 entries (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub risk_score: f64,
    pub anomaly_score: f64,
    pub total_syscalls: u64,
    pub syscall_count: usize,
    pub recent_syscalls: Vec<String>,
    pub recent_syscalls_str: String,
    pub last_update: f64,
    pub time_since_update: f64,
}

impl ProcessSnapshot {
    fn from_record(record: &ProcessRecord, now: f64) -> Self {
        let recent: Vec<String> = record.last_n_syscalls(10);
        Self {
            pid: record.pid,
            name: record.name.clone(),
            risk_score: record.risk_score,
            anomaly_score: record.anomaly_score,
            total_syscalls: record.cumulative_count,
            syscall_count: record.recent_syscalls().len(),
            recent_syscalls_str: recent.join(", "),
            recent_syscalls: recent,
            last_update: record.last_update,
            time_since_update: now - record.last_update,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_processes: usize,
    pub high_risk: usize,
    pub anomalies: usize,
    pub total_syscalls: u64,
    pub c2_beacons: usize,
    pub port_scans: usize,
}

impl From<DerivedStats> for StatsSnapshot {
    fn from(d: DerivedStats) -> Self {
        Self {
            total_processes: d.total_processes,
            high_risk: d.high_risk,
            anomalies: d.anomalies,
            total_syscalls: d.total_syscalls,
            c2_beacons: d.recent_c2,
            port_scans: d.recent_scans,
        }
    }
}

/// Root snapshot document, matching spec.md §6's JSON schema exactly.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub timestamp: f64,
    pub stats: StatsSnapshot,
    pub processes: Vec<ProcessSnapshot>,
}

/// Maximum number of per-process entries carried in a snapshot (spec.md §6).
const MAX_PROCESSES: usize = 50;

impl Snapshot {
    /// Builds a snapshot from a point-in-time process list and derived
    /// stats, sorting by risk descending and capping at [`MAX_PROCESSES`].
    pub fn build(records: &[ProcessRecord], stats: DerivedStats, now: f64) -> Self {
        let mut entries: Vec<ProcessSnapshot> = records
            .iter()
            .map(|r| ProcessSnapshot::from_record(r, now))
            .collect();
        entries.sort_by(|a, b| b.risk_score.partial_cmp(&a.risk_score).unwrap());
        entries.truncate(MAX_PROCESSES);

        Self {
            timestamp: now,
            stats: stats.into(),
            processes: entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, risk: f64) -> ProcessRecord {
        let tracker = hids_core::process::ProcessTracker::new(999, vec![]);
        tracker.record_event(&hids_core::events::SyscallEvent::new(pid, "open", 0.0));
        tracker.update_scores(pid, risk, 0.0, false, String::new());
        tracker.get(pid).unwrap()
    }

    #[test]
    fn sorts_by_risk_descending() {
        let records = vec![record(1, 10.0), record(2, 90.0), record(3, 50.0)];
        let stats = DerivedStats::default();
        let snapshot = Snapshot::build(&records, stats, 0.0);
        let pids: Vec<u32> = snapshot.processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![2, 3, 1]);
    }

    #[test]
    fn caps_at_fifty_entries() {
        let records: Vec<ProcessRecord> = (0..80).map(|i| record(i, i as f64)).collect();
        let snapshot = Snapshot::build(&records, DerivedStats::default(), 0.0);
        assert_eq!(snapshot.processes.len(), MAX_PROCESSES);
        assert_eq!(snapshot.processes[0].pid, 79);
    }
}
