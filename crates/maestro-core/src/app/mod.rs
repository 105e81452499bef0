//! App - アプリケーション層
//!
//! registry / queue / result table を組み合わせてオーケストレーターを実装します。
//!
//! # 主要コンポーネント
//! - **OrchestratorBuilder**: 構築とワイヤリング、起動時検証
//! - **Orchestrator**: add_task / get_status / shutdown の表面
//! - **run_loop**: タスク実行ループ（dequeue→resolve→execute→retry→record）
//! - **LifecycleState**: Idle → Running → Draining → Stopped

pub mod builder;
pub mod lifecycle;
pub mod orchestrator;
pub mod run_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::lifecycle::LifecycleState;
pub use self::orchestrator::Orchestrator;
pub use self::run_loop::CANCELLED_REASON;
