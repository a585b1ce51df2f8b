//! Default response handler: logs the advisory action and takes no
//! executive action, since the actual kill/freeze/isolate executor is an
//! explicit Non-goal (spec.md §1, §6).

use tracing::warn;

use hids_core::alert::{Action, ResponseHandler, ResponseRequest};

/// Computes the advisory action tier from configured thresholds and logs
/// it; never actually terminates, freezes, or isolates anything.
pub struct LoggingResponseHandler {
    pub warn_threshold: f64,
    pub freeze_threshold: f64,
    pub isolate_threshold: f64,
    pub kill_threshold: f64,
}

impl ResponseHandler for LoggingResponseHandler {
    fn handle(&self, request: &ResponseRequest) -> Action {
        let action = if request.risk >= self.kill_threshold {
            Action::Kill
        } else if request.risk >= self.isolate_threshold {
            Action::Isolate
        } else if request.risk >= self.freeze_threshold {
            Action::Freeze
        } else if request.risk >= self.warn_threshold {
            Action::Warn
        } else {
            Action::None
        };

        if action != Action::None {
            warn!(
                pid = request.pid,
                name = %request.name,
                risk = request.risk,
                ?action,
                "response advisory (no executor attached)"
            );
        }
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> LoggingResponseHandler {
        LoggingResponseHandler {
            warn_threshold: 70.0,
            freeze_threshold: 85.0,
            isolate_threshold: 90.0,
            kill_threshold: 95.0,
        }
    }

    fn request(risk: f64) -> ResponseRequest {
        ResponseRequest {
            pid: 1,
            name: "x".to_string(),
            risk,
            anomaly: 0.0,
            reason: String::new(),
        }
    }

    #[test]
    fn below_warn_threshold_is_none() {
        assert_eq!(handler().handle(&request(10.0)), Action::None);
    }

    #[test]
    fn above_kill_threshold_is_kill() {
        assert_eq!(handler().handle(&request(99.0)), Action::Kill);
    }
}
