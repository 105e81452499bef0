//! Typed agent API.
//!
//! # 二層構造
//! - **表層（Typed）**: `TypedAgent` - request 型を静的に持つ
//! - **内部（Dyn）**: `Agent` - object-safe, registry に格納される
//!
//! `Typed<A>` が JSON payload を `A::Request` にデコードしてから委譲する。

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::Agent;
use crate::domain::Payload;
use crate::error::AgentError;

/// An agent with a typed request.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Ping { host: String }
///
/// struct PingAgent;
///
/// #[async_trait]
/// impl TypedAgent for PingAgent {
///     const TYPE: &'static str = "ping";
///     type Request = Ping;
///
///     async fn handle(&self, request: Ping) -> Result<(), AgentError> {
///         ...
///     }
/// }
///
/// builder.register(Arc::new(Typed::new(PingAgent)))?;
/// ```
#[async_trait]
pub trait TypedAgent: Send + Sync + 'static {
    const TYPE: &'static str;

    type Request: DeserializeOwned + Send + 'static;

    async fn handle(&self, request: Self::Request) -> Result<(), AgentError>;
}

/// Type-erasing adapter from `TypedAgent` to `Agent`.
pub struct Typed<A> {
    agent: A,
}

impl<A: TypedAgent> Typed<A> {
    pub fn new(agent: A) -> Self {
        Self { agent }
    }

    pub fn inner(&self) -> &A {
        &self.agent
    }
}

#[async_trait]
impl<A: TypedAgent> Agent for Typed<A> {
    fn agent_type(&self) -> &str {
        A::TYPE
    }

    async fn execute(&self, payload: &Payload) -> Result<(), AgentError> {
        let request: A::Request = decode(payload)?;
        self.agent.handle(request).await
    }
}

/// Decode a payload into a request type.
///
/// A payload that does not fit will not fit on the next attempt either,
/// so the error is permanent.
pub fn decode<T: DeserializeOwned>(payload: &Payload) -> Result<T, AgentError> {
    serde_json::from_value(serde_json::Value::Object(payload.clone()))
        .map_err(|e| AgentError::permanent(format!("payload decode: {e}")))
}
