//! maestro-core
//!
//! Core building blocks for the Maestro task orchestrator.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, AgentType, Task, TaskStatus）
//! - **agents**: Agent trait, AgentRegistry, 型付き adapter, 組み込み agent
//! - **queue**: FIFO TaskQueue, ResultTable, RetryPolicy
//! - **app**: OrchestratorBuilder, Orchestrator, run loop, lifecycle
//! - **ports**: 抽象化レイヤー（Clock）
//! - **config**: OrchestratorConfig
//! - **error**: エラー型
//! - **observability**: status views

pub mod agents;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod ports;
pub mod queue;

pub use agents::{Agent, AgentRegistry, RegistryError, Typed, TypedAgent};
pub use app::{BuildError, LifecycleState, Orchestrator, OrchestratorBuilder};
pub use config::{AgentValidation, OrchestratorConfig};
pub use domain::{AgentType, Payload, Task, TaskId, TaskStatus};
pub use error::{AgentError, ErrorKind, OrchestratorError, QueueError};
pub use observability::StatusCounts;
pub use queue::{ResultEntry, RetryPolicy};
