//! HIDS Core - Event types, collector trait, process tracking, config, and alerting
//!
//! This crate provides the foundational types and abstractions for the host
//! intrusion detection agent:
//!
//! - **events**: the syscall-event record and its optional network sub-record
//! - **collector**: the pluggable event-source trait
//! - **process**: the per-process tracker and name resolver
//! - **config**: TOML-backed configuration with CLI/env/file precedence
//! - **alert**: alert types, the alert gate, and the response-handler contract
//! - **stats**: derived-on-read agent statistics

pub mod alert;
pub mod collector;
pub mod config;
pub mod events;
pub mod process;
pub mod stats;

pub use alert::{Alert, AlertClass, AlertGate, Action, ResponseHandler, ResponseRequest};
pub use collector::{Collector, CollectorError};
pub use config::{ConfigError, HidsConfig};
pub use events::{NetworkInfo, SyscallEvent};
pub use process::{NameResolver, ProcessRecord, ProcessTracker};
pub use stats::AgentStats;

/// Spec version this crate implements.
pub const HIDS_CORE_VERSION: &str = "0.1";
