//! The syscall-event record ingested by the core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Syscalls whose `aux` map is expected to carry network fields
/// (`dest_ip`, `dest_port`, `bytes_sent`, `bytes_received`).
pub const NETWORK_SYSCALLS: &[&str] = &[
    "socket",
    "connect",
    "sendto",
    "sendmsg",
    "recvfrom",
    "recvmsg",
];

/// A single observed syscall, as delivered by a [`crate::Collector`].
///
/// Every event has `pid` and `syscall`; everything else is optional at the
/// collector boundary and resolved downstream (name resolution, network
/// sub-record extraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyscallEvent {
    pub pid: u32,
    /// Canonical lowercase syscall name.
    pub syscall: String,
    pub uid: Option<u32>,
    /// Short process-name hint (`/proc/<pid>/comm`-equivalent), at most 16 bytes.
    pub comm: Option<String>,
    /// Executable path hint, may be empty.
    pub exe: Option<String>,
    /// Wall-clock seconds, monotonic-capable within a single pid's stream.
    pub timestamp: f64,
    /// Resource snapshot at event time, if the collector can supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSnapshot>,
    /// Everything else: destination ip/port, byte counts, source tag, etc.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub aux: HashMap<String, String>,
}

impl SyscallEvent {
    pub fn new(pid: u32, syscall: impl Into<String>, timestamp: f64) -> Self {
        Self {
            pid,
            syscall: syscall.into(),
            uid: None,
            comm: None,
            exe: None,
            timestamp,
            resources: None,
            aux: HashMap::new(),
        }
    }

    pub fn is_network_syscall(&self) -> bool {
        NETWORK_SYSCALLS.contains(&self.syscall.as_str())
    }

    /// Parses the typed network sub-record out of `aux`, if present.
    pub fn network_info(&self) -> Option<NetworkInfo> {
        if !self.is_network_syscall() {
            return None;
        }
        let dest_ip = self.aux.get("dest_ip")?.clone();
        let dest_port: u16 = self.aux.get("dest_port").and_then(|p| p.parse().ok())?;
        Some(NetworkInfo {
            dest_ip,
            dest_port,
            bytes_sent: self
                .aux
                .get("bytes_sent")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            bytes_received: self
                .aux
                .get("bytes_received")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            source_tag: self.aux.get("source_tag").cloned(),
        })
    }
}

/// The typed network sub-record split out of `SyscallEvent::aux` per spec.md
/// §9's "close the dynamically-typed event dict" design note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub dest_ip: String,
    pub dest_port: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// `"ebpf"` or `"audit"` — which collector supplied the real/synthetic port.
    pub source_tag: Option<String>,
}

/// CPU/memory/thread snapshot a collector may attach to an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: Option<f32>,
    pub memory_percent: Option<f32>,
    pub thread_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_info_requires_network_syscall() {
        let mut ev = SyscallEvent::new(1, "open", 0.0);
        ev.aux.insert("dest_ip".into(), "10.0.0.1".into());
        ev.aux.insert("dest_port".into(), "443".into());
        assert!(ev.network_info().is_none());
    }

    #[test]
    fn network_info_parses_aux_fields() {
        let mut ev = SyscallEvent::new(1, "connect", 0.0);
        ev.aux.insert("dest_ip".into(), "10.0.0.1".into());
        ev.aux.insert("dest_port".into(), "443".into());
        ev.aux.insert("bytes_sent".into(), "1024".into());
        let info = ev.network_info().unwrap();
        assert_eq!(info.dest_ip, "10.0.0.1");
        assert_eq!(info.dest_port, 443);
        assert_eq!(info.bytes_sent, 1024);
    }
}
