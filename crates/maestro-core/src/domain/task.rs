use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use super::TaskId;

/// Structured task input. Always a JSON object.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Name an agent is registered under (`"data"`, `"proposal"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentType(String);

impl AgentType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AgentType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A unit of work waiting in (or taken from) the queue.
///
/// Built by `Orchestrator::add_task` after validation and never mutated
/// afterwards; retries hand the same payload to the agent again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    agent_type: AgentType,
    payload: Payload,
}

impl Task {
    pub fn new(id: TaskId, agent_type: AgentType, payload: Payload) -> Self {
        Self {
            id,
            agent_type,
            payload,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn agent_type(&self) -> &AgentType {
        &self.agent_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}
