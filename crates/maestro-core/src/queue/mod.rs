//! Queue module: FIFO hand-off, result tracking, and retry policy.

mod memory;
mod record;
mod retry;

pub use memory::{Reservation, TaskQueue};
pub use record::{ResultEntry, ResultTable};
pub use retry::RetryPolicy;
