//! Numeric x86_64 syscall-number to name mapping used when an audit record
//! carries a bare number instead of a symbolic name.
//!
//! Grounded in `examples/original_source/core/collectors/auditd_collector.py`'s
//! `syscall_num_to_name` table (a deliberately partial subset; unknown
//! numbers fall back to `syscall_<n>`).

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub static SYSCALL_NUM_TO_NAME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("59", "execve");
    m.insert("322", "execveat");
    m.insert("57", "fork");
    m.insert("56", "clone");
    m.insert("58", "vfork");
    m.insert("257", "openat");
    m.insert("2", "open");
    m.insert("3", "close");
    m.insert("0", "read");
    m.insert("1", "write");
    m.insert("101", "ptrace");
    m.insert("160", "mount");
    m.insert("166", "umount2");
    m.insert("105", "setuid");
    m.insert("106", "setgid");
    m.insert("90", "chmod");
    m.insert("92", "chown");
    m.insert("41", "socket");
    m.insert("42", "connect");
    m.insert("43", "accept");
    m.insert("49", "bind");
    m.insert("50", "listen");
    m.insert("44", "sendto");
    m.insert("45", "recvfrom");
    m.insert("46", "sendmsg");
    m.insert("47", "recvmsg");
    m
});

/// Resolves a syscall token from an audit record: a bare number is looked
/// up in [`SYSCALL_NUM_TO_NAME`] (falling back to `syscall_<n>`), anything
/// else is assumed already symbolic.
pub fn resolve_syscall_name(token: &str) -> String {
    if token.chars().all(|c| c.is_ascii_digit()) {
        SYSCALL_NUM_TO_NAME
            .get(token)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("syscall_{token}"))
    } else {
        token.to_string()
    }
}
