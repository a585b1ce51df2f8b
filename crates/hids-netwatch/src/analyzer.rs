//! Per-(pid) and per-(process-name, destination-ip) connection-pattern
//! analysis: beaconing (T1071), port scanning (T1046), and exfiltration
//! (T1041). Grounded in
//! `examples/original_source/core/connection_pattern_analyzer.py`.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use tracing::info;

const HISTORY_CAP: usize = 100;
/// Detection-timestamp ring capacity (spec.md §3: "ring length <= 1000").
const DETECTION_RING_CAP: usize = 1000;

/// Daemon/utility process names that never trigger pattern detection
/// (spec.md §4.6). Case-insensitive.
const WHITELIST: &[&str] = &[
    "systemd",
    "systemctl",
    "groupadd",
    "useradd",
    "usermod",
    "flb-out-stackdr",
    "fluent-bit",
    "fluentd",
    "sshd",
    "rsyslog",
    "syslog",
    "journald",
    "dnsmasq",
    "resolvconf",
    "networkd",
    "networkmanager",
    "apt",
    "apt-get",
    "yum",
    "dnf",
    "zypper",
    "pacman",
    "curl",
    "wget",
    "ping",
    "nslookup",
    "dig",
    "docker",
    "containerd",
    "kubelet",
    "kube-proxy",
];

fn is_whitelisted(process_name: &str) -> bool {
    WHITELIST.contains(&process_name.to_lowercase().as_str())
}

#[derive(Debug, Clone)]
struct ConnectionRecord {
    dest_ip: String,
    dest_port: u16,
    timestamp: f64,
    pid: u32,
}

impl ConnectionRecord {
    fn dest_key(&self) -> String {
        format!("{}:{}", self.dest_ip, self.dest_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    High,
    Critical,
}

/// A single verdict produced by [`ConnectionAnalyzer::analyze`] or
/// [`ConnectionAnalyzer::track_data_transfer`] (spec.md §4.6).
#[derive(Debug, Clone)]
pub enum PatternVerdict {
    Beaconing {
        pid: u32,
        destination: String,
        mean_interval: f64,
        stdev: f64,
        connections: usize,
    },
    PortScanning {
        pid: u32,
        unique_ports: usize,
        timeframe: f64,
        rate: f64,
    },
    DataExfiltration {
        pid: u32,
        bytes_sent: u64,
        bytes_received: u64,
    },
}

impl PatternVerdict {
    pub fn risk_score(&self) -> f64 {
        match self {
            PatternVerdict::Beaconing { .. } => 85.0,
            PatternVerdict::PortScanning { .. } => 75.0,
            PatternVerdict::DataExfiltration { .. } => 90.0,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            PatternVerdict::Beaconing { .. } => 0.9,
            PatternVerdict::PortScanning { .. } => 0.85,
            PatternVerdict::DataExfiltration { .. } => 0.8,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PatternVerdict::DataExfiltration { .. } => Severity::Critical,
            _ => Severity::High,
        }
    }

    pub fn technique(&self) -> &'static str {
        match self {
            PatternVerdict::Beaconing { .. } => "T1071",
            PatternVerdict::PortScanning { .. } => "T1046",
            PatternVerdict::DataExfiltration { .. } => "T1041",
        }
    }

    pub fn explanation(&self) -> String {
        match self {
            PatternVerdict::Beaconing {
                mean_interval,
                stdev,
                destination,
                ..
            } => format!(
                "Regular beaconing detected: {mean_interval:.1}s intervals (±{stdev:.1}s) to {destination}"
            ),
            PatternVerdict::PortScanning {
                unique_ports,
                timeframe,
                rate,
                ..
            } => format!(
                "Port scanning: {unique_ports} ports in {timeframe:.1}s ({rate:.2} ports/sec)"
            ),
            PatternVerdict::DataExfiltration { bytes_sent, .. } => format!(
                "Large data upload: {:.1} MB sent",
                *bytes_sent as f64 / (1024.0 * 1024.0)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionAnalyzerConfig {
    pub beacon_variance_threshold: f64,
    pub min_connections_for_beacon: usize,
    pub min_beacon_interval: f64,
    pub port_scan_threshold: usize,
    pub port_scan_timeframe: f64,
    pub exfiltration_threshold: u64,
}

impl Default for ConnectionAnalyzerConfig {
    fn default() -> Self {
        Self {
            beacon_variance_threshold: 10.0,
            min_connections_for_beacon: 3,
            min_beacon_interval: 1.0,
            port_scan_threshold: 5,
            port_scan_timeframe: 60.0,
            exfiltration_threshold: 100 * 1024 * 1024,
        }
    }
}

struct State {
    history_by_pid: HashMap<u32, VecDeque<ConnectionRecord>>,
    history_by_name: HashMap<String, HashMap<String, VecDeque<ConnectionRecord>>>,
    ports_by_pid: HashMap<u32, HashSet<u16>>,
    ports_by_name: HashMap<String, HashMap<String, HashSet<u16>>>,
    bytes_sent: HashMap<u32, u64>,
    bytes_received: HashMap<u32, u64>,
    c2_timestamps: VecDeque<f64>,
    scan_timestamps: VecDeque<f64>,
}

impl State {
    fn new() -> Self {
        Self {
            history_by_pid: HashMap::new(),
            history_by_name: HashMap::new(),
            ports_by_pid: HashMap::new(),
            ports_by_name: HashMap::new(),
            bytes_sent: HashMap::new(),
            bytes_received: HashMap::new(),
            c2_timestamps: VecDeque::new(),
            scan_timestamps: VecDeque::new(),
        }
    }
}

fn push_capped(deque: &mut VecDeque<ConnectionRecord>, record: ConnectionRecord) {
    if deque.len() == HISTORY_CAP {
        deque.pop_front();
    }
    deque.push_back(record);
}

fn push_timestamp(ring: &mut VecDeque<f64>, timestamp: f64) {
    if ring.len() == DETECTION_RING_CAP {
        ring.pop_front();
    }
    ring.push_back(timestamp);
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stdev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| (v - mean_value).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Stateful connection-pattern analyzer (spec.md §4.6). Internally guarded
/// by a single mutex, matching the original's single-threaded-per-analyzer
/// design and spec.md §5's "the connection analyzer uses its own mutex".
pub struct ConnectionAnalyzer {
    config: ConnectionAnalyzerConfig,
    state: Mutex<State>,
}

impl ConnectionAnalyzer {
    pub fn new(config: ConnectionAnalyzerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::new()),
        }
    }

    /// Analyzes one connection. Returns at most one verdict (spec.md §4.6:
    /// "each of which may fire at most one verdict per call").
    pub fn analyze(
        &self,
        pid: u32,
        dest_ip: &str,
        dest_port: u16,
        timestamp: f64,
        process_name: &str,
    ) -> Option<PatternVerdict> {
        if is_whitelisted(process_name) {
            return None;
        }

        let mut state = self.state.lock();

        let record = ConnectionRecord {
            dest_ip: dest_ip.to_string(),
            dest_port,
            timestamp,
            pid,
        };

        push_capped(
            state.history_by_pid.entry(pid).or_default(),
            record.clone(),
        );
        state.ports_by_pid.entry(pid).or_default().insert(dest_port);

        let clean_name = process_name.trim_start_matches('(').trim_end_matches(')');
        push_capped(
            state
                .history_by_name
                .entry(clean_name.to_string())
                .or_default()
                .entry(dest_ip.to_string())
                .or_default(),
            record,
        );
        state
            .ports_by_name
            .entry(clean_name.to_string())
            .or_default()
            .entry(dest_ip.to_string())
            .or_default()
            .insert(dest_port);

        if let Some(verdict) = self.detect_beaconing_by_pid(&state, pid) {
            push_timestamp(&mut state.c2_timestamps, timestamp);
            info!(pid, process = clean_name, "beaconing pattern detected");
            return Some(verdict);
        }
        if let Some(verdict) = self.detect_beaconing_by_name(&state, clean_name, dest_ip) {
            push_timestamp(&mut state.c2_timestamps, timestamp);
            info!(pid, process = clean_name, "beaconing pattern detected (by name)");
            return Some(verdict);
        }

        if let Some(verdict) = self.detect_port_scan_by_pid(&state, pid) {
            push_timestamp(&mut state.scan_timestamps, timestamp);
            info!(pid, process = clean_name, "port scanning pattern detected");
            return Some(verdict);
        }
        if let Some(verdict) = self.detect_port_scan_by_name(&state, clean_name, dest_ip) {
            push_timestamp(&mut state.scan_timestamps, timestamp);
            info!(pid, process = clean_name, "port scanning pattern detected (by name)");
            return Some(verdict);
        }

        None
    }

    fn beaconing_over(&self, connections: &[ConnectionRecord], pid: u32) -> Option<PatternVerdict> {
        let mut by_dest: HashMap<String, Vec<&ConnectionRecord>> = HashMap::new();
        for conn in connections {
            by_dest.entry(conn.dest_key()).or_default().push(conn);
        }

        for (dest_key, mut conns) in by_dest {
            if conns.len() < self.config.min_connections_for_beacon {
                continue;
            }
            conns.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap());

            let intervals: Vec<f64> = conns.windows(2).map(|w| w[1].timestamp - w[0].timestamp).collect();
            if intervals.len() < self.config.min_connections_for_beacon - 1 {
                continue;
            }

            let mean_interval = mean(&intervals);
            if mean_interval < self.config.min_beacon_interval {
                continue;
            }
            let sd = stdev(&intervals, mean_interval);
            if sd < self.config.beacon_variance_threshold {
                return Some(PatternVerdict::Beaconing {
                    pid,
                    destination: dest_key,
                    mean_interval,
                    stdev: sd,
                    connections: conns.len(),
                });
            }
        }
        None
    }

    fn detect_beaconing_by_pid(&self, state: &State, pid: u32) -> Option<PatternVerdict> {
        let connections: Vec<ConnectionRecord> = state
            .history_by_pid
            .get(&pid)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        if connections.len() < self.config.min_connections_for_beacon {
            return None;
        }
        self.beaconing_over(&connections, pid)
    }

    fn detect_beaconing_by_name(
        &self,
        state: &State,
        process_name: &str,
        dest_ip: &str,
    ) -> Option<PatternVerdict> {
        let connections: Vec<ConnectionRecord> = state
            .history_by_name
            .get(process_name)
            .and_then(|by_ip| by_ip.get(dest_ip))
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        if connections.len() < self.config.min_connections_for_beacon {
            return None;
        }
        let pid = connections.last().map(|c| c.pid).unwrap_or(0);
        self.beaconing_over(&connections, pid)
    }

    fn port_scan_over(
        &self,
        unique_ports: usize,
        connections: &[ConnectionRecord],
        pid: u32,
    ) -> Option<PatternVerdict> {
        if unique_ports < self.config.port_scan_threshold || connections.is_empty() {
            return None;
        }
        let oldest = connections.first()?.timestamp;
        let newest = connections.last()?.timestamp;
        let timeframe = newest - oldest;
        if timeframe >= self.config.port_scan_timeframe {
            return None;
        }
        let rate = unique_ports as f64 / timeframe.max(1.0);
        if rate < 0.1 {
            return None;
        }
        Some(PatternVerdict::PortScanning {
            pid,
            unique_ports,
            timeframe,
            rate,
        })
    }

    fn detect_port_scan_by_pid(&self, state: &State, pid: u32) -> Option<PatternVerdict> {
        let unique_ports = state.ports_by_pid.get(&pid).map(HashSet::len).unwrap_or(0);
        let connections: Vec<ConnectionRecord> = state
            .history_by_pid
            .get(&pid)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        self.port_scan_over(unique_ports, &connections, pid)
    }

    fn detect_port_scan_by_name(
        &self,
        state: &State,
        process_name: &str,
        dest_ip: &str,
    ) -> Option<PatternVerdict> {
        let unique_ports = state
            .ports_by_name
            .get(process_name)
            .and_then(|by_ip| by_ip.get(dest_ip))
            .map(HashSet::len)
            .unwrap_or(0);
        let connections: Vec<ConnectionRecord> = state
            .history_by_name
            .get(process_name)
            .and_then(|by_ip| by_ip.get(dest_ip))
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        let pid = connections.last().map(|c| c.pid).unwrap_or(0);
        self.port_scan_over(unique_ports, &connections, pid)
    }

    /// Tracks cumulative bytes sent/received and fires an exfiltration
    /// verdict once bytes-sent crosses the configured threshold.
    pub fn track_data_transfer(
        &self,
        pid: u32,
        bytes_sent: u64,
        bytes_received: u64,
    ) -> Option<PatternVerdict> {
        let mut state = self.state.lock();
        let sent = state.bytes_sent.entry(pid).or_insert(0);
        *sent += bytes_sent;
        let sent_total = *sent;
        let received_total = *state.bytes_received.entry(pid).or_insert(0) + bytes_received;
        state.bytes_received.insert(pid, received_total);

        if sent_total > self.config.exfiltration_threshold {
            info!(pid, bytes_sent = sent_total, "exfiltration threshold crossed");
            Some(PatternVerdict::DataExfiltration {
                pid,
                bytes_sent: sent_total,
                bytes_received: received_total,
            })
        } else {
            None
        }
    }

    /// Count of C2/port-scan detections within the last `window_secs`
    /// seconds, for the snapshot writer's `c2_beacons`/`port_scans` counts.
    pub fn recent_detections(&self, now: f64, window_secs: f64) -> (usize, usize) {
        let state = self.state.lock();
        let c2 = state
            .c2_timestamps
            .iter()
            .filter(|&&t| now - t <= window_secs)
            .count();
        let scans = state
            .scan_timestamps
            .iter()
            .filter(|&&t| now - t <= window_secs)
            .count();
        (c2, scans)
    }

    pub fn reset_process(&self, pid: u32) {
        let mut state = self.state.lock();
        state.history_by_pid.remove(&pid);
        state.ports_by_pid.remove(&pid);
        state.bytes_sent.remove(&pid);
        state.bytes_received.remove(&pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_process_never_records_state() {
        let analyzer = ConnectionAnalyzer::new(ConnectionAnalyzerConfig::default());
        for i in 0..5 {
            assert!(analyzer
                .analyze(1, "10.0.0.5", 443, i as f64, "sshd")
                .is_none());
        }
        assert_eq!(analyzer.recent_detections(100.0, 300.0), (0, 0));
    }

    #[test]
    fn two_connections_never_trigger_beaconing() {
        let analyzer = ConnectionAnalyzer::new(ConnectionAnalyzerConfig::default());
        assert!(analyzer.analyze(3000, "10.0.0.5", 443, 0.0, "beacon").is_none());
        assert!(analyzer.analyze(3000, "10.0.0.5", 443, 6.0, "beacon").is_none());
    }

    #[test]
    fn three_regular_connections_trigger_beaconing() {
        let analyzer = ConnectionAnalyzer::new(ConnectionAnalyzerConfig::default());
        assert!(analyzer.analyze(3000, "10.0.0.5", 443, 0.0, "beacon").is_none());
        assert!(analyzer.analyze(3000, "10.0.0.5", 443, 6.0, "beacon").is_none());
        let verdict = analyzer.analyze(3000, "10.0.0.5", 443, 12.0, "beacon");
        assert!(matches!(verdict, Some(PatternVerdict::Beaconing { .. })));
    }

    #[test]
    fn four_ports_never_trigger_scan() {
        let analyzer = ConnectionAnalyzer::new(ConnectionAnalyzerConfig::default());
        let ports = [22u16, 80, 443, 8080];
        for (i, port) in ports.iter().enumerate() {
            let verdict = analyzer.analyze(4000, "10.0.0.9", *port, i as f64, "nm");
            assert!(verdict.is_none());
        }
    }

    #[test]
    fn five_ports_within_window_trigger_scan() {
        let analyzer = ConnectionAnalyzer::new(ConnectionAnalyzerConfig::default());
        let ports = [22u16, 80, 443, 8080, 3306];
        let mut last = None;
        for (i, port) in ports.iter().enumerate() {
            last = analyzer.analyze(4000, "10.0.0.9", *port, (i as f64) * 2.0, "nm");
        }
        assert!(matches!(last, Some(PatternVerdict::PortScanning { .. })));
    }

    #[test]
    fn exfiltration_fires_once_threshold_crossed() {
        let analyzer = ConnectionAnalyzer::new(ConnectionAnalyzerConfig::default());
        assert!(analyzer.track_data_transfer(5000, 50 * 1024 * 1024, 0).is_none());
        let verdict = analyzer.track_data_transfer(5000, 60 * 1024 * 1024, 0);
        assert!(matches!(
            verdict,
            Some(PatternVerdict::DataExfiltration { .. })
        ));
    }
}
