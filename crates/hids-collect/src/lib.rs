//! Reference [`hids_core::collector::Collector`] implementations: a
//! synthetic kernel-probe-flavored generator and an audit-log tailer
//! (spec.md §4.1).

pub mod kernel_probe;
pub mod log_tail;
pub mod vocab;

pub use kernel_probe::{KernelProbeCollector, KernelProbeConfig};
pub use log_tail::AuditLogCollector;
