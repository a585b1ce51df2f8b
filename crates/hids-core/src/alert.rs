//! Alert types, the alert gate (warm-up/exclusion/cooldown), and the
//! response-handler contract (spec.md §4.7).

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::ResourceSnapshot;
use crate::process::ProcessRecord;

/// Alert classes (spec.md §4.7). Ordering matters only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertClass {
    HighRisk,
    MlAnomaly,
    C2Beaconing,
    PortScanning,
    DataExfiltration,
}

impl AlertClass {
    /// Per-class cooldown window (spec.md §4.7).
    pub fn cooldown_secs(self) -> f64 {
        match self {
            AlertClass::HighRisk => 120.0,
            AlertClass::MlAnomaly => 5.0,
            AlertClass::C2Beaconing | AlertClass::PortScanning | AlertClass::DataExfiltration => {
                0.0
            }
        }
    }
}

/// Destination/statistics payload attached to connection-pattern alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDetails {
    pub destination: String,
    pub mean_interval: Option<f64>,
    pub stdev: Option<f64>,
    pub unique_ports: Option<usize>,
    pub rate: Option<f64>,
    pub bytes_sent: Option<u64>,
}

/// An alert as it leaves the core (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: f64,
    pub pid: u32,
    pub name: String,
    pub class: AlertClass,
    pub risk: f64,
    pub anomaly: f64,
    pub explanation: String,
    pub recent_syscalls: Vec<String>,
    pub resources: Option<ResourceSnapshot>,
    pub pattern: Option<PatternDetails>,
}

/// Response-action tiers (spec.md §4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Warn,
    Freeze,
    Isolate,
    Kill,
    None,
}

/// Input to a [`ResponseHandler`] (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRequest {
    pub pid: u32,
    pub name: String,
    pub risk: f64,
    pub anomaly: f64,
    pub reason: String,
}

/// The automated-response contract. The core treats this as an opaque call
/// (spec.md §6): an in-process trait rather than a network transport, since
/// the actual kill/isolate/freeze executor is explicitly out of scope.
pub trait ResponseHandler: Send + Sync {
    fn handle(&self, request: &ResponseRequest) -> Action;
}

/// Applies warm-up suppression, exclusion, and per-pid-per-class cooldown
/// before any alert leaves the core (spec.md §4.7).
pub struct AlertGate {
    start: Instant,
    warmup_secs: f64,
    warmup_logged: Mutex<bool>,
    cooldowns: Mutex<HashMap<(u32, AlertClassKey), f64>>,
    response_handler: Option<Box<dyn ResponseHandler>>,
    response_enabled: bool,
    warn_threshold: f64,
    freeze_threshold: f64,
    isolate_threshold: f64,
    kill_threshold: f64,
}

type AlertClassKey = u8;

fn class_key(class: AlertClass) -> AlertClassKey {
    match class {
        AlertClass::HighRisk => 0,
        AlertClass::MlAnomaly => 1,
        AlertClass::C2Beaconing => 2,
        AlertClass::PortScanning => 3,
        AlertClass::DataExfiltration => 4,
    }
}

impl AlertGate {
    pub fn new(warmup_secs: f64) -> Self {
        Self {
            start: Instant::now(),
            warmup_secs,
            warmup_logged: Mutex::new(false),
            cooldowns: Mutex::new(HashMap::new()),
            response_handler: None,
            response_enabled: false,
            warn_threshold: 70.0,
            freeze_threshold: 85.0,
            isolate_threshold: 90.0,
            kill_threshold: 95.0,
        }
    }

    pub fn with_response_handler(
        mut self,
        handler: Box<dyn ResponseHandler>,
        enabled: bool,
        warn_threshold: f64,
        freeze_threshold: f64,
        isolate_threshold: f64,
        kill_threshold: f64,
    ) -> Self {
        self.response_handler = Some(handler);
        self.response_enabled = enabled;
        self.warn_threshold = warn_threshold;
        self.freeze_threshold = freeze_threshold;
        self.isolate_threshold = isolate_threshold;
        self.kill_threshold = kill_threshold;
        self
    }

    /// Whether the warm-up window has elapsed. Logs the transition exactly once.
    pub fn warmup_elapsed(&self) -> bool {
        let elapsed = self.start.elapsed().as_secs_f64() >= self.warmup_secs;
        if elapsed {
            let mut logged = self.warmup_logged.lock();
            if !*logged {
                info!(warmup_seconds = self.warmup_secs, "warm-up period ended");
                *logged = true;
            }
        }
        elapsed
    }

    /// Decide whether an alert for `(pid, class)` should fire right now,
    /// honoring exclusion, warm-up, and cooldown. Returns `true` if the
    /// gate allows emission (and records the cooldown timestamp).
    pub fn should_emit(&self, record: &ProcessRecord, class: AlertClass, now: f64) -> bool {
        if record.excluded {
            return false;
        }
        if !self.warmup_elapsed() {
            return false;
        }

        let mut cooldowns = self.cooldowns.lock();
        let key = (record.pid, class_key(class));
        let cooldown = class.cooldown_secs();
        match cooldowns.get(&key) {
            Some(&last) if now - last < cooldown => {
                debug!(pid = record.pid, ?class, "alert suppressed by cooldown");
                false
            }
            _ => {
                cooldowns.insert(key, now);
                true
            }
        }
    }

    /// Builds an [`Alert`] and, if a response handler is attached and
    /// enabled, invokes it and returns the resulting action.
    pub fn build_alert(
        &self,
        record: &ProcessRecord,
        class: AlertClass,
        timestamp: f64,
        pattern: Option<PatternDetails>,
    ) -> (Alert, Action) {
        let alert = Alert {
            timestamp,
            pid: record.pid,
            name: record.name.clone(),
            class,
            risk: record.risk_score,
            anomaly: record.anomaly_score,
            explanation: record.explanation.clone(),
            recent_syscalls: record.last_n_syscalls(10),
            resources: record.last_resources,
            pattern,
        };

        let action = self.invoke_response(&alert);
        (alert, action)
    }

    fn invoke_response(&self, alert: &Alert) -> Action {
        if !self.response_enabled {
            return Action::None;
        }
        let Some(handler) = &self.response_handler else {
            return Action::None;
        };

        let request = ResponseRequest {
            pid: alert.pid,
            name: alert.name.clone(),
            risk: alert.risk,
            anomaly: alert.anomaly,
            reason: alert.explanation.clone(),
        };

        let advisory = if alert.risk >= self.kill_threshold {
            Action::Kill
        } else if alert.risk >= self.isolate_threshold {
            Action::Isolate
        } else if alert.risk >= self.freeze_threshold {
            Action::Freeze
        } else if alert.risk >= self.warn_threshold {
            Action::Warn
        } else {
            Action::None
        };
        let _ = advisory;

        handler.handle(&request)
    }

    pub fn evict(&self, pid: u32) {
        self.cooldowns.lock().retain(|(p, _), _| *p != pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessTracker;

    fn make_record(tracker: &ProcessTracker, pid: u32) -> ProcessRecord {
        let ev = crate::events::SyscallEvent::new(pid, "open", 0.0);
        tracker.record_event(&ev).unwrap()
    }

    #[test]
    fn warmup_suppresses_until_elapsed() {
        let gate = AlertGate::new(10_000.0);
        let tracker = ProcessTracker::new(999, vec![]);
        let record = make_record(&tracker, 1000);
        assert!(!gate.should_emit(&record, AlertClass::HighRisk, 0.0));
    }

    #[test]
    fn excluded_process_never_alerts() {
        let gate = AlertGate::new(0.0);
        let tracker = ProcessTracker::new(999, vec!["sshd".to_string()]);
        let mut record = make_record(&tracker, 1000);
        record.excluded = true;
        assert!(!gate.should_emit(&record, AlertClass::HighRisk, 1.0));
    }

    #[test]
    fn cooldown_blocks_repeat_alerts_within_window() {
        let gate = AlertGate::new(0.0);
        let tracker = ProcessTracker::new(999, vec![]);
        let record = make_record(&tracker, 1000);

        assert!(gate.should_emit(&record, AlertClass::HighRisk, 1.0));
        assert!(!gate.should_emit(&record, AlertClass::HighRisk, 2.0));
        assert!(gate.should_emit(&record, AlertClass::HighRisk, 200.0));
    }

    #[test]
    fn distinct_classes_have_independent_cooldowns() {
        let gate = AlertGate::new(0.0);
        let tracker = ProcessTracker::new(999, vec![]);
        let record = make_record(&tracker, 1000);

        assert!(gate.should_emit(&record, AlertClass::HighRisk, 1.0));
        assert!(gate.should_emit(&record, AlertClass::MlAnomaly, 1.0));
    }

    #[test]
    fn build_alert_carries_the_record_resource_snapshot() {
        let gate = AlertGate::new(0.0);
        let tracker = ProcessTracker::new(999, vec![]);
        let mut ev = crate::events::SyscallEvent::new(1000, "open", 0.0);
        ev.resources = Some(ResourceSnapshot {
            cpu_percent: Some(12.5),
            memory_percent: Some(3.0),
            thread_count: Some(4),
        });
        let record = tracker.record_event(&ev).unwrap();

        let (alert, _) = gate.build_alert(&record, AlertClass::HighRisk, 1.0, None);
        assert_eq!(alert.resources, record.last_resources);
        assert!(alert.resources.is_some());
    }
}
