//! Name resolution and the per-process tracker (spec.md §3, §4.2, §4.3).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::events::{ResourceSnapshot, SyscallEvent};

/// Syscall ring capacity (spec.md §3: "N=100").
pub const RING_CAPACITY: usize = 100;
/// Inactivity timeout before a [`ProcessRecord`] is eligible for eviction.
pub const INACTIVITY_TIMEOUT_SECS: f64 = 60.0;

const DEFAULT_NAME_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_NAME_CACHE_PURGE_THRESHOLD: usize = 10_000;

fn is_fallback_name(name: &str) -> bool {
    name.starts_with("pid_") && name[4..].chars().all(|c| c.is_ascii_digit()) && name.len() > 4
}

struct CacheEntry {
    name: String,
    inserted_at: Instant,
}

/// Derives a stable human-readable process name from event hints and
/// `/proc` introspection, with a TTL cache that survives the process
/// (spec.md §4.2).
pub struct NameResolver {
    cache: Mutex<HashMap<u32, CacheEntry>>,
    ttl: Duration,
    purge_threshold: usize,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NameResolver {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_NAME_CACHE_TTL, DEFAULT_NAME_CACHE_PURGE_THRESHOLD)
    }

    pub fn with_ttl(ttl: Duration, purge_threshold: usize) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl,
            purge_threshold,
        }
    }

    /// Resolve a name for `pid`, given event hints, following spec.md §4.2's order.
    pub fn resolve(&self, pid: u32, comm_hint: Option<&str>, exe_hint: Option<&str>) -> String {
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.get(&pid) {
            if entry.inserted_at.elapsed() < self.ttl
                && !entry.name.is_empty()
                && !is_fallback_name(&entry.name)
            {
                return entry.name.clone();
            }
        }

        let resolved = self.resolve_uncached(pid, comm_hint, exe_hint);

        if cache.len() >= self.purge_threshold {
            let ttl = self.ttl;
            cache.retain(|_, e| e.inserted_at.elapsed() < ttl);
        }
        cache.insert(
            pid,
            CacheEntry {
                name: resolved.clone(),
                inserted_at: Instant::now(),
            },
        );
        resolved
    }

    fn resolve_uncached(&self, pid: u32, comm_hint: Option<&str>, exe_hint: Option<&str>) -> String {
        if let Some(exe) = exe_hint {
            if let Some(base) = exe.rsplit('/').next() {
                if !base.is_empty() {
                    return base.to_string();
                }
            }
        }

        if let Some(comm) = comm_hint {
            if !comm.is_empty() && !is_fallback_name(comm) {
                return comm.to_string();
            }
        }

        if let Some(name) = read_proc_comm(pid) {
            return name;
        }
        if let Some(name) = read_proc_cmdline_basename(pid) {
            return name;
        }

        format!("pid_{pid}")
    }
}

#[cfg(target_os = "linux")]
fn read_proc_comm(pid: u32) -> Option<String> {
    let raw = std::fs::read_to_string(format!("/proc/{pid}/comm")).ok()?;
    let name = raw.trim();
    (!name.is_empty() && !is_fallback_name(name)).then(|| name.to_string())
}

#[cfg(not(target_os = "linux"))]
fn read_proc_comm(_pid: u32) -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn read_proc_cmdline_basename(pid: u32) -> Option<String> {
    let raw = std::fs::read_to_string(format!("/proc/{pid}/cmdline")).ok()?;
    let first = raw.split('\0').next()?;
    let base = first.rsplit('/').next()?;
    (!base.is_empty()).then(|| base.to_string())
}

#[cfg(not(target_os = "linux"))]
fn read_proc_cmdline_basename(_pid: u32) -> Option<String> {
    None
}

/// Per-process behavioral state (spec.md §3).
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    recent_syscalls: VecDeque<String>,
    pub cumulative_count: u64,
    pub risk_score: f64,
    pub anomaly_score: f64,
    pub anomaly_verdict: bool,
    pub explanation: String,
    pub last_update: f64,
    pub excluded: bool,
    /// Resource usage as of the most recent event (spec.md §4.7: mandatory
    /// alert payload field).
    pub last_resources: Option<ResourceSnapshot>,
}

impl ProcessRecord {
    fn new(pid: u32, name: String, timestamp: f64) -> Self {
        Self {
            pid,
            name,
            recent_syscalls: VecDeque::with_capacity(RING_CAPACITY),
            cumulative_count: 0,
            risk_score: 0.0,
            anomaly_score: 0.0,
            anomaly_verdict: false,
            explanation: String::new(),
            last_update: timestamp,
            excluded: false,
            last_resources: None,
        }
    }

    fn push_syscall(&mut self, syscall: String) {
        if self.recent_syscalls.len() == RING_CAPACITY {
            self.recent_syscalls.pop_front();
        }
        self.recent_syscalls.push_back(syscall);
        self.cumulative_count += 1;
    }

    /// Most recent syscalls, oldest first, capped at the ring capacity.
    pub fn recent_syscalls(&self) -> &VecDeque<String> {
        &self.recent_syscalls
    }

    pub fn last_n_syscalls(&self, n: usize) -> Vec<String> {
        let len = self.recent_syscalls.len();
        let skip = len.saturating_sub(n);
        self.recent_syscalls.iter().skip(skip).cloned().collect()
    }
}

fn matches_exclusion(name: &str, exe: Option<&str>, excluded: &[String]) -> bool {
    let name_lower = name.to_lowercase();

    // sudo wrapping a python interpreter is never excluded: attack
    // simulations run this way must still be detected (spec.md §4.3).
    if name_lower == "sudo" {
        if let Some(exe) = exe {
            if exe.to_lowercase().contains("python") {
                return false;
            }
        }
    }

    excluded.iter().any(|candidate| {
        let candidate_lower = candidate.to_lowercase();
        name_lower == candidate_lower
            || name_lower.contains(&candidate_lower)
            || candidate_lower.contains(&name_lower)
    })
}

/// Owns the pid → [`ProcessRecord`] map (spec.md §3, §4.3).
pub struct ProcessTracker {
    records: Mutex<HashMap<u32, ProcessRecord>>,
    resolver: NameResolver,
    agent_pid: u32,
    excluded_names: Vec<String>,
}

impl ProcessTracker {
    pub fn new(agent_pid: u32, excluded_names: Vec<String>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            resolver: NameResolver::new(),
            agent_pid,
            excluded_names,
        }
    }

    /// Ingests one event, mutating (or creating) that pid's record.
    /// Returns `None` if the event was for the agent's own pid (silently
    /// dropped per spec.md §8 scenario 6).
    pub fn record_event(&self, event: &SyscallEvent) -> Option<ProcessRecord> {
        if event.pid == self.agent_pid {
            return None;
        }

        let name = self
            .resolver
            .resolve(event.pid, event.comm.as_deref(), event.exe.as_deref());

        let mut records = self.records.lock();
        let record = records
            .entry(event.pid)
            .or_insert_with(|| ProcessRecord::new(event.pid, name.clone(), event.timestamp));

        record.name = name;
        record.push_syscall(event.syscall.clone());
        record.last_update = event.timestamp;
        record.last_resources = event.resources;

        if matches_exclusion(&record.name, event.exe.as_deref(), &self.excluded_names) {
            record.excluded = true;
        }

        Some(record.clone())
    }

    pub fn get(&self, pid: u32) -> Option<ProcessRecord> {
        self.records.lock().get(&pid).cloned()
    }

    pub fn update_scores(
        &self,
        pid: u32,
        risk_score: f64,
        anomaly_score: f64,
        anomaly_verdict: bool,
        explanation: String,
    ) {
        if let Some(record) = self.records.lock().get_mut(&pid) {
            record.risk_score = risk_score;
            record.anomaly_score = anomaly_score;
            record.anomaly_verdict = anomaly_verdict;
            record.explanation = explanation;
        }
    }

    pub fn is_excluded(&self, pid: u32) -> bool {
        self.records
            .lock()
            .get(&pid)
            .map(|r| r.excluded)
            .unwrap_or(false)
    }

    /// Snapshot of all tracked records, for the risk/anomaly pipeline and
    /// the snapshot writer. O(n) — callers must not hold this under the
    /// tracker's internal lock.
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        self.records.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every record whose `last_update` is older than
    /// `now - INACTIVITY_TIMEOUT_SECS`. Run periodically by the reaper task.
    pub fn reap_inactive(&self, now: f64) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| now - r.last_update <= INACTIVITY_TIMEOUT_SECS);
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pid: u32, syscall: &str, ts: f64) -> SyscallEvent {
        SyscallEvent::new(pid, syscall, ts)
    }

    #[test]
    fn self_pid_is_silently_dropped() {
        let tracker = ProcessTracker::new(999, vec![]);
        assert!(tracker.record_event(&event(999, "open", 0.0)).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn ring_buffer_caps_at_100_and_cumulative_keeps_growing() {
        let tracker = ProcessTracker::new(999, vec![]);
        for i in 0..150 {
            tracker.record_event(&event(1000, "open", i as f64));
        }
        let record = tracker.get(1000).unwrap();
        assert_eq!(record.recent_syscalls().len(), RING_CAPACITY);
        assert_eq!(record.cumulative_count, 150);
        assert!(record.cumulative_count >= record.recent_syscalls().len() as u64);
    }

    #[test]
    fn exclusion_is_case_insensitive_and_bidirectional_substring() {
        let tracker = ProcessTracker::new(999, vec!["sshd".to_string()]);
        let mut ev = event(1000, "open", 0.0);
        ev.comm = Some("SSHD-session".to_string());
        tracker.record_event(&ev);
        assert!(tracker.is_excluded(1000));
    }

    #[test]
    fn sudo_wrapping_python_is_not_excluded() {
        let tracker = ProcessTracker::new(999, vec!["sudo".to_string()]);
        let mut ev = event(1000, "execve", 0.0);
        ev.comm = Some("sudo".to_string());
        ev.exe = Some("/usr/bin/python3".to_string());
        tracker.record_event(&ev);
        assert!(!tracker.is_excluded(1000));
    }

    #[test]
    fn reaper_evicts_inactive_processes() {
        let tracker = ProcessTracker::new(999, vec![]);
        tracker.record_event(&event(1000, "open", 0.0));
        assert_eq!(tracker.reap_inactive(61.0), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn reaper_keeps_active_processes() {
        let tracker = ProcessTracker::new(999, vec![]);
        tracker.record_event(&event(1000, "open", 0.0));
        assert_eq!(tracker.reap_inactive(30.0), 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn name_resolver_prefers_exe_basename_over_comm() {
        let resolver = NameResolver::new();
        let name = resolver.resolve(1, Some("bash"), Some("/usr/bin/evil"));
        assert_eq!(name, "evil");
    }

    #[test]
    fn name_resolver_falls_back_to_pid_format() {
        let resolver = NameResolver::new();
        let name = resolver.resolve(424242, None, None);
        assert_eq!(name, "pid_424242");
    }

    #[test]
    fn name_resolver_caches_result() {
        let resolver = NameResolver::new();
        let first = resolver.resolve(5, Some("bash"), None);
        let second = resolver.resolve(5, None, None);
        assert_eq!(first, second);
    }
}
