//! Agents and the registry that maps agent types to them.
//!
//! - **Agent**: object-safe capability (`execute(payload)`), stored as
//!   `Arc<dyn Agent>`.
//! - **TypedAgent**: typed surface; the `Typed` adapter decodes the JSON
//!   payload into `TypedAgent::Request` and erases the type.
//! - **AgentRegistry**: built once by `OrchestratorBuilder`, read-only after.

pub mod builtin;
pub mod typed;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AgentType, Payload};
use crate::error::AgentError;

pub use self::builtin::{DataAgent, DataRequest, ProposalAgent, builtin_agents};
pub use self::typed::{Typed, TypedAgent};

/// A named unit of work.
///
/// `execute` may be called several times with the same payload when the
/// retry policy kicks in, so implementations should tolerate resubmission.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Key this agent is registered under.
    fn agent_type(&self) -> &str;

    async fn execute(&self, payload: &Payload) -> Result<(), AgentError>;
}

/// RegistryError は AgentRegistry の登録エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("agent for type '{0}' is already registered")]
    AlreadyRegistered(AgentType),

    #[error("agent type must not be empty")]
    EmptyAgentType,
}

/// Registry of agents (agent_type -> agent).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, behind the orchestrator).
/// This avoids locks on the dispatch path.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register an agent under its own `agent_type()`.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<(), RegistryError> {
        let name = agent.agent_type();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyAgentType);
        }
        let agent_type = AgentType::new(name);
        if self.agents.contains_key(&agent_type) {
            return Err(RegistryError::AlreadyRegistered(agent_type));
        }
        self.agents.insert(agent_type, agent);
        Ok(())
    }

    /// Look up an agent. Absence is not an error here; the caller decides
    /// what an unknown type means.
    pub fn resolve(&self, agent_type: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_type).cloned()
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.agents.contains_key(agent_type)
    }

    /// Registered agent types, sorted.
    pub fn agent_types(&self) -> Vec<AgentType> {
        let mut types: Vec<AgentType> = self.agents.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
