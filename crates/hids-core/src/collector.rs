//! The pluggable event-source abstraction (spec.md §4.1).

use crate::events::SyscallEvent;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector unavailable: {0}")]
    Unavailable(String),
    #[error("collector already running")]
    AlreadyRunning,
    #[error("collector not running")]
    NotRunning,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CollectorResult<T> = Result<T, CollectorError>;

/// Callback invoked once per observed event. Must not deliver the same
/// `(pid, timestamp)` twice; within a pid, calls must preserve observed order.
pub type EventHandler = Arc<dyn Fn(SyscallEvent) + Send + Sync>;

/// A source that, once started, invokes a caller-supplied handler once per
/// observed event and continues until stopped.
///
/// `start` must not deliver events before it returns; `stop` must cease
/// delivery promptly. Implementations may deliver events on any thread.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Human-readable collector name, for logging and the `collector` config option.
    fn name(&self) -> &str;

    /// Whether this collector can attach on the current host (e.g. the
    /// required kernel facility or log file is present).
    fn is_available(&self) -> bool;

    /// Begin delivering events to `handler`. Returns once the collector has
    /// reached a ready state; events delivered after that point only.
    async fn start(&self, handler: EventHandler) -> CollectorResult<()>;

    /// Stop delivering events. Idempotent.
    async fn stop(&self) -> CollectorResult<()>;

    /// Whether the collector is currently delivering events.
    fn is_running(&self) -> bool;
}
