//! Audit-log-tailing collector: follows a `/var/log/audit/audit.log`-style
//! file and parses `type=SYSCALL` records.
//!
//! Grounded in
//! `examples/original_source/core/collectors/auditd_collector.py`.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info, warn};

use hids_core::collector::{Collector, CollectorError, CollectorResult, EventHandler};
use hids_core::events::SyscallEvent;

use crate::vocab::resolve_syscall_name;

static SYSCALL_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"type=SYSCALL .*?syscall=(\S+).*?pid=(\d+).*?uid=(\d+).*?comm="([^"]*)".*?exe="([^"]*)""#,
    )
    .expect("static regex is valid")
});

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Rewrites `sudo`-wrapped invocations to the name of the program actually
/// running, so `sudo python3 exploit.py` is tracked as `python3` rather
/// than `sudo` (spec.md §4.2).
fn resolve_sudo_wrapped_comm(comm: &str, exe: &str) -> String {
    if comm != "sudo" || exe.is_empty() {
        return comm.to_string();
    }
    if exe.to_lowercase().contains("python") {
        return "python3".to_string();
    }
    let basename = Path::new(exe)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if !basename.is_empty() && basename != "sudo" {
        basename.to_string()
    } else {
        comm.to_string()
    }
}

fn parse_line(line: &str) -> Option<SyscallEvent> {
    if !line.contains("type=SYSCALL") {
        return None;
    }
    let caps = SYSCALL_LINE_RE.captures(line)?;
    let syscall_token = &caps[1];
    let pid: u32 = caps[2].parse().ok()?;
    let uid: u32 = caps[3].parse().ok()?;
    let comm = &caps[4];
    let exe = &caps[5];

    let syscall_name = resolve_syscall_name(syscall_token);
    let resolved_comm = resolve_sudo_wrapped_comm(comm, exe);

    let mut event = SyscallEvent::new(pid, syscall_name, now_secs());
    event.uid = Some(uid);
    event.comm = Some(resolved_comm);
    event.exe = Some(exe.to_string());
    event.aux.insert("source_tag".into(), "audit".into());
    Some(event)
}

/// Tails an auditd-style log file for `SYSCALL` records.
pub struct AuditLogCollector {
    path: PathBuf,
    running: Arc<AtomicBool>,
}

impl AuditLogCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl Collector for AuditLogCollector {
    fn name(&self) -> &str {
        "audit-log"
    }

    fn is_available(&self) -> bool {
        self.path.exists()
    }

    async fn start(&self, handler: EventHandler) -> CollectorResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        if !self.is_available() {
            self.running.store(false, Ordering::SeqCst);
            return Err(CollectorError::Unavailable(format!(
                "audit log not found: {}",
                self.path.display()
            )));
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::End(0))?;

        let running = self.running.clone();
        let path = self.path.clone();
        info!(path = %path.display(), "starting audit log tail");

        tokio::task::spawn_blocking(move || {
            let mut reader = BufReader::new(file);
            let mut line = String::new();
            while running.load(Ordering::SeqCst) {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) => std::thread::sleep(POLL_INTERVAL),
                    Ok(_) => {
                        if let Some(event) = parse_line(&line) {
                            handler(event);
                        } else if line.contains("type=SYSCALL") {
                            debug!(line = %line.trim(), "failed to parse audit line");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "audit log read error");
                        std::thread::sleep(POLL_INTERVAL);
                    }
                }
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
    fn parses_named_syscall_line() {
        let line = r#"type=SYSCALL msg=audit(1700000000.123:456): arch=c000003e syscall=execve success=yes exit=0 pid=1234 uid=0 comm="bash" exe="/usr/bin/bash""#;
        let event = parse_line(line).unwrap();
        assert_eq!(event.pid, 1234);
        assert_eq!(event.syscall, "execve");
        assert_eq!(event.comm.as_deref(), Some("bash"));
    }

    #[test]
    fn parses_numeric_syscall_line() {
        let line = r#"type=SYSCALL msg=audit(1:1): syscall=101 pid=50 uid=0 comm="app" exe="/usr/bin/app""#;
        let event = parse_line(line).unwrap();
        assert_eq!(event.syscall, "ptrace");
    }

    #[test]
    fn unknown_numeric_syscall_falls_back() {
        let line = r#"type=SYSCALL msg=audit(1:1): syscall=99999 pid=50 uid=0 comm="app" exe="/usr/bin/app""#;
        let event = parse_line(line).unwrap();
        assert_eq!(event.syscall, "syscall_99999");
    }

    #[test]
    fn non_syscall_lines_are_ignored() {
        assert!(parse_line("type=CWD msg=audit(1:1): cwd=\"/root\"").is_none());
    }

    #[test]
    fn sudo_wrapping_python_resolves_to_python3() {
        assert_eq!(
            resolve_sudo_wrapped_comm("sudo", "/usr/bin/python3.10"),
            "python3"
        );
    }

    #[test]
    fn sudo_wrapping_other_binary_resolves_to_basename() {
        assert_eq!(resolve_sudo_wrapped_comm("sudo", "/usr/sbin/useradd"), "useradd");
    }

    #[test]
    fn non_sudo_comm_is_untouched() {
        assert_eq!(resolve_sudo_wrapped_comm("bash", "/usr/bin/bash"), "bash");
    }

    #[test]
    fn collector_is_unavailable_when_path_missing() {
        let collector = AuditLogCollector::new("/nonexistent/audit.log");
        assert!(!collector.is_available());
    }
}
