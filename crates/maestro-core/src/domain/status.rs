//! Task status as seen by callers polling the orchestrator.

use serde::{Deserialize, Serialize};

/// Current status of a submitted task.
///
/// State transitions:
/// - Pending -> Completed
/// - Pending -> Failed
///
/// Exactly one transition happens per task. Serialized with an internal
/// `status` tag so the transport layer can return it as-is:
/// `{"status":"failed","reason":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and waiting in the queue (or currently executing).
    Pending,

    /// The agent succeeded on one of its attempts.
    Completed,

    /// Every attempt failed, or the task could not be dispatched.
    Failed { reason: String },
}

impl TaskStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskStatus::Failed {
            reason: reason.into(),
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TaskStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_with_tag() {
        assert_eq!(
            serde_json::to_value(TaskStatus::Pending).unwrap(),
            json!({"status": "pending"})
        );
        assert_eq!(
            serde_json::to_value(TaskStatus::Completed).unwrap(),
            json!({"status": "completed"})
        );
        assert_eq!(
            serde_json::to_value(TaskStatus::failed("unknown agent type: bogus")).unwrap(),
            json!({"status": "failed", "reason": "unknown agent type: bogus"})
        );
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::failed("x").is_terminal());
        assert_eq!(TaskStatus::failed("x").reason(), Some("x"));
        assert_eq!(TaskStatus::Completed.reason(), None);
    }
}
