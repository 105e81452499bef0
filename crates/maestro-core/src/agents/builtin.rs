//! Built-in agents: `data` and `proposal`.
//!
//! The real work behind them (market data fetch, proposal generation) lives
//! outside this crate; these accept and check the request shape so the
//! orchestrator can be run end to end.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{Agent, Typed, TypedAgent};
use crate::domain::Payload;
use crate::error::AgentError;

/// Request handled by `DataAgent`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataRequest {
    pub symbol: String,
}

/// `data`: market data request for one symbol (`{"symbol": "BTC"}`).
#[derive(Debug, Default)]
pub struct DataAgent;

#[async_trait]
impl TypedAgent for DataAgent {
    const TYPE: &'static str = "data";
    type Request = DataRequest;

    async fn handle(&self, request: DataRequest) -> Result<(), AgentError> {
        let symbol = request.symbol.trim();
        if symbol.is_empty() {
            return Err(AgentError::permanent("symbol must not be empty"));
        }
        info!(symbol, "data request accepted");
        Ok(())
    }
}

/// `proposal`: takes any object payload.
#[derive(Debug, Default)]
pub struct ProposalAgent;

#[async_trait]
impl Agent for ProposalAgent {
    fn agent_type(&self) -> &str {
        "proposal"
    }

    async fn execute(&self, payload: &Payload) -> Result<(), AgentError> {
        info!(fields = payload.len(), "proposal request accepted");
        Ok(())
    }
}

/// The fixed set of agents every default orchestrator starts with.
pub fn builtin_agents() -> Vec<Arc<dyn Agent>> {
    vec![Arc::new(Typed::new(DataAgent)), Arc::new(ProposalAgent)]
}
