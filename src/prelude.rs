pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{
    Executor, ExecutorExt, InlineExecutor, SpawnExecutor, ThreadPool,
};
pub use crate::promise::{
    all_of, any_of, collect_all, run_async, run_async_on, submit, submit_on, Promise, State,
};
pub use crate::sync::{BoundedQueue, Condition, Feed, Monitor, RetryCell};
