//! Coordination primitives for threads that share state over time, as
//! opposed to handing over a single result through a promise.

pub mod bounded_queue;
pub mod monitor;
pub mod retry_cell;

pub use bounded_queue::{BoundedQueue, Feed};
pub use monitor::{Condition, Monitor, MonitorGuard};
pub use retry_cell::RetryCell;
