use thiserror::Error;

use crate::domain::{AgentType, TaskId};

/// Errors surfaced to callers of the orchestrator's public contract.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Bad submission shape. Never reaches the queue.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown agent type: {0}")]
    UnknownAgent(AgentType),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error("run loop already started")]
    AlreadyStarted,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Infrastructure failures of the task queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("task_done called more times than tasks were enqueued")]
    TaskDoneUnderflow,
}

/// How an agent failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth another attempt.
    Transient,
    /// Retrying with the same payload cannot help (bad payload, etc).
    Permanent,
}

/// Failure returned by `Agent::execute`.
///
/// Displays as the bare message; that text becomes the `reason` of a
/// failed task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AgentError {
    kind: ErrorKind,
    message: String,
}

impl AgentError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == ErrorKind::Permanent
    }
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
