//! Scripted agents for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::Agent;
use crate::domain::Payload;
use crate::error::AgentError;

/// Fails a fixed number of times, then succeeds.
pub(crate) struct ScriptedAgent {
    agent_type: String,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
    permanent: bool,
}

impl ScriptedAgent {
    pub(crate) fn new(agent_type: &str, failures: u32) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            permanent: false,
        }
    }

    pub(crate) fn succeeding(agent_type: &str) -> Self {
        Self::new(agent_type, 0)
    }

    pub(crate) fn always_failing(agent_type: &str) -> Self {
        Self::new(agent_type, u32::MAX)
    }

    /// Fails with a permanent error instead of a transient one.
    pub(crate) fn permanently_failing(agent_type: &str) -> Self {
        Self {
            permanent: true,
            ..Self::always_failing(agent_type)
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn execute(&self, _payload: &Payload) -> Result<(), AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let left = self.remaining_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            let message = format!("intentional failure on call {call}");
            return Err(if self.permanent {
                AgentError::permanent(message)
            } else {
                AgentError::transient(message)
            });
        }
        Ok(())
    }
}

/// Succeeds and remembers every payload it saw, in call order.
pub(crate) struct RecordingAgent {
    agent_type: String,
    delay: Duration,
    seen: Mutex<Vec<Payload>>,
}

impl RecordingAgent {
    pub(crate) fn new(agent_type: &str) -> Self {
        Self::with_delay(agent_type, Duration::ZERO)
    }

    pub(crate) fn with_delay(agent_type: &str, delay: Duration) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            delay,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn seen(&self) -> Vec<Payload> {
        self.seen.lock().unwrap().clone()
    }

    /// The string field `key` of every payload seen.
    pub(crate) fn seen_field(&self, key: &str) -> Vec<String> {
        self.seen()
            .iter()
            .filter_map(|p| p.get(key).and_then(|v| v.as_str()).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn execute(&self, payload: &Payload) -> Result<(), AgentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Panics on every call.
pub(crate) struct PanickingAgent {
    agent_type: String,
}

impl PanickingAgent {
    pub(crate) fn new(agent_type: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
        }
    }
}

#[async_trait]
impl Agent for PanickingAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn execute(&self, _payload: &Payload) -> Result<(), AgentError> {
        panic!("agent blew up");
    }
}

/// Signals `started` and then never finishes.
pub(crate) struct StuckAgent {
    agent_type: String,
    pub(crate) started: Arc<Notify>,
}

impl StuckAgent {
    pub(crate) fn new(agent_type: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Agent for StuckAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn execute(&self, _payload: &Payload) -> Result<(), AgentError> {
        self.started.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }
}
