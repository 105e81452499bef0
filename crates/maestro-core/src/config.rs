//! Orchestrator configuration.
//!
//! Every field has a default, so an empty TOML table is a valid config:
//!
//! ```toml
//! queue_capacity = 128
//! poll_interval_ms = 250
//! agent_validation = "on_submit"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 100
//! multiplier = 2.0
//! max_delay_ms = 5000
//! jitter = 0.0
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// When `add_task` checks the agent type against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentValidation {
    /// Reject unknown agent types at submission. Nothing bad is ever queued.
    #[default]
    OnSubmit,
    /// Accept anything non-empty; unknown types fail when dequeued.
    OnDispatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,

    /// `None` = unbounded queue.
    pub queue_capacity: Option<usize>,

    /// How long the run loop waits on an empty queue before re-checking
    /// its lifecycle state.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    pub agent_validation: AgentValidation,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            queue_capacity: None,
            poll_interval: Duration::from_millis(250),
            agent_validation: AgentValidation::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Problems that would make the orchestrator misbehave, if any.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            problems.push("retry.multiplier must be a finite number >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            problems.push("retry.jitter must be within [0, 1]".to_string());
        }
        if self.queue_capacity == Some(0) {
            problems.push("queue_capacity must be at least 1 when set".to_string());
        }
        if self.poll_interval.is_zero() {
            problems.push("poll_interval_ms must be greater than 0".to_string());
        }
        problems
    }
}

/// serde helper: `Duration` <-> integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
