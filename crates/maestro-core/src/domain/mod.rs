//! Domain model (ids, tasks, statuses).

pub mod ids;
pub mod status;
pub mod task;

pub use ids::TaskId;
pub use status::TaskStatus;
pub use task::{AgentType, Payload, Task};
