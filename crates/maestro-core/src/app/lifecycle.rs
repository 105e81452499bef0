use serde::{Deserialize, Serialize};

/// Lifecycle of an orchestrator.
///
/// State transitions:
/// - Idle -> Running (run)
/// - Running -> Draining (shutdown; queued tasks still get processed)
/// - Draining -> Stopped (queue empty, loop exits)
/// - Idle -> Stopped (shutdown before run)
/// - Running -> Stopped (run future dropped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl LifecycleState {
    /// Can `add_task` still enqueue?
    pub fn accepts_tasks(self) -> bool {
        matches!(self, LifecycleState::Idle | LifecycleState::Running)
    }

    /// State after a shutdown request.
    pub(crate) fn on_shutdown(self) -> Self {
        match self {
            LifecycleState::Idle => LifecycleState::Stopped,
            LifecycleState::Running => LifecycleState::Draining,
            other => other,
        }
    }
}
