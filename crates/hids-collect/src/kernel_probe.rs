//! Synthetic kernel-probe-flavored collector: stands in for an eBPF syscall
//! tracer (out of scope — see spec.md Non-goals) by generating a plausible
//! mixed syscall stream, in the spirit of
//! `oisp-capture/src/test_generator.rs`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::info;

use hids_core::collector::{Collector, CollectorError, CollectorResult, EventHandler};
use hids_core::events::SyscallEvent;
use hids_netwatch::SyntheticPortExtractor;

/// Syscall names cycled through to produce a mostly-benign stream with an
/// occasional network call, so downstream stages have something to chew on
/// without requiring a real kernel facility.
const SAMPLE_SYSCALLS: &[&str] = &[
    "read", "write", "open", "close", "stat", "open", "read", "connect",
];

/// One of the fake processes the generator rotates through. Never the
/// agent's own pid — the tracker silently drops self-pid events, so
/// emitting as `process::id()` would make the whole pipeline a no-op.
#[derive(Debug, Clone)]
pub struct SimulatedProcess {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct KernelProbeConfig {
    pub interval: Duration,
    pub processes: Vec<SimulatedProcess>,
}

impl Default for KernelProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            processes: vec![
                SimulatedProcess { pid: 10_001, name: "bash".to_string() },
                SimulatedProcess { pid: 10_002, name: "evil".to_string() },
                SimulatedProcess { pid: 10_003, name: "curl".to_string() },
            ],
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct KernelProbeCollector {
    config: KernelProbeConfig,
    running: Arc<AtomicBool>,
    events_emitted: Arc<AtomicU64>,
    port_extractor: Arc<SyntheticPortExtractor>,
}

impl KernelProbeCollector {
    pub fn new(config: KernelProbeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            events_emitted: Arc::new(AtomicU64::new(0)),
            port_extractor: Arc::new(SyntheticPortExtractor::new()),
        }
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Collector for KernelProbeCollector {
    fn name(&self) -> &str {
        "kernel-probe"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self, handler: EventHandler) -> CollectorResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        info!("starting synthetic kernel-probe collector");

        let running = self.running.clone();
        let events_emitted = self.events_emitted.clone();
        let interval = self.config.interval;
        let processes = self.config.processes.clone();
        let port_extractor = self.port_extractor.clone();

        tokio::spawn(async move {
            let mut cycle: usize = 0;
            while running.load(Ordering::SeqCst) {
                let syscall = SAMPLE_SYSCALLS[cycle % SAMPLE_SYSCALLS.len()];
                let process = &processes[cycle % processes.len()];
                let pid = process.pid;
                let process_name = process.name.clone();
                let timestamp = now_secs();
                let mut event = SyscallEvent::new(pid, syscall, timestamp);
                event.comm = Some(process_name.clone());
                event.exe = Some(format!("/usr/bin/{process_name}"));
                if syscall == "connect" {
                    let dest_ip = "127.0.0.1";
                    let dest_port = port_extractor.synthetic_port(pid, dest_ip, timestamp);
                    event.aux.insert("dest_ip".into(), dest_ip.into());
                    event.aux.insert("dest_port".into(), dest_port.to_string());
                    event.aux.insert("source_tag".into(), "ebpf".into());
                }
                handler(event);
                events_emitted.fetch_add(1, Ordering::Relaxed);
                cycle += 1;
                tokio::time::sleep(interval).await;
            }
        });

        Ok(())
    }

    async fn stop(&self) -> CollectorResult<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_always_available() {
        let collector = KernelProbeCollector::new(KernelProbeConfig::default());
        assert!(collector.is_available());
    }

    #[test]
    fn starts_not_running() {
        let collector = KernelProbeCollector::new(KernelProbeConfig::default());
        assert!(!collector.is_running());
    }

    #[tokio::test]
    async fn start_then_stop_emits_events_and_halts() {
        let config = KernelProbeConfig {
            interval: Duration::from_millis(5),
            ..KernelProbeConfig::default()
        };
        let collector = KernelProbeCollector::new(config);
        let handler: EventHandler = Arc::new(|_event| {});

        collector.start(handler).await.unwrap();
        assert!(collector.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        collector.stop().await.unwrap();
        assert!(!collector.is_running());
        assert!(collector.events_emitted() > 0);
    }

    #[tokio::test]
    async fn never_emits_as_the_calling_process() {
        let own_pid = std::process::id();
        let config = KernelProbeConfig {
            interval: Duration::from_millis(5),
            ..KernelProbeConfig::default()
        };
        let collector = KernelProbeCollector::new(config);
        let seen: Arc<std::sync::Mutex<Vec<u32>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_handle = seen.clone();
        let handler: EventHandler = Arc::new(move |event| seen_handle.lock().unwrap().push(event.pid));

        collector.start(handler).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        collector.stop().await.unwrap();

        let pids = seen.lock().unwrap();
        assert!(!pids.is_empty());
        assert!(pids.iter().all(|&pid| pid != own_pid));
    }

    #[tokio::test]
    async fn double_start_errors() {
        let collector = KernelProbeCollector::new(KernelProbeConfig::default());
        let handler: EventHandler = Arc::new(|_event| {});
        collector.start(handler.clone()).await.unwrap();
        let second = collector.start(handler).await;
        assert!(matches!(second, Err(CollectorError::AlreadyRunning)));
        collector.stop().await.unwrap();
    }
}
