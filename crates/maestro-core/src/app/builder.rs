//! OrchestratorBuilder - オーケストレーターの構築とワイヤリング
//!
//! # 方針
//! - Builder パターン
//! - 起動時検証（Fail-fast 設計）: 重複登録、期待 agent の不足、不正な設定は build() で弾く
//! - agent の集合は build() 以降変わらない

use std::sync::Arc;

use super::Orchestrator;
use crate::agents::{Agent, AgentRegistry, RegistryError, builtin_agents};
use crate::config::OrchestratorConfig;
use crate::ports::{Clock, SystemClock};

/// Builds an `Orchestrator`.
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(config)
///     .with_builtin_agents()?
///     .register(Arc::new(MyAgent))?
///     .expect_agents(&["data", "proposal", "my_agent"])
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    registry: AgentRegistry,
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    expected_agents: Option<Vec<String>>,
}

/// BuildError はオーケストレーター構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Missing agent types: {0:?}. These agents were expected but not registered.")]
    MissingAgentTypes(Vec<String>),

    #[error("invalid config: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            registry: AgentRegistry::new(),
            config: OrchestratorConfig::default(),
            clock: Arc::new(SystemClock),
            expected_agents: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Agent を登録
    pub fn register(mut self, agent: Arc<dyn Agent>) -> Result<Self, RegistryError> {
        self.registry.register(agent)?;
        Ok(self)
    }

    /// `data` と `proposal` を登録
    pub fn with_builtin_agents(mut self) -> Result<Self, RegistryError> {
        for agent in builtin_agents() {
            self.registry.register(agent)?;
        }
        Ok(self)
    }

    /// 期待される agent_type のリストを設定
    pub fn expect_agents(mut self, agent_types: &[&str]) -> Self {
        self.expected_agents = Some(agent_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// # 検証
    /// - 設定値が妥当か
    /// - expect_agents() で設定された agent_type が全て登録されているか
    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let problems = self.config.problems();
        if !problems.is_empty() {
            return Err(BuildError::InvalidConfig(problems));
        }

        if let Some(expected) = &self.expected_agents {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.registry.contains(t.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingAgentTypes(missing));
            }
        }

        Ok(Orchestrator::from_parts(
            self.config,
            self.registry,
            self.clock,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
