//! Task identifiers.
//!
//! ids are plain counters handed out by the result table: the first task
//! submitted to an orchestrator is `1`, the next `2`, and so on. They are
//! never reused for the lifetime of the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a submitted task.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
