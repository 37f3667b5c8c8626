//! Pledge - promises, executors and coordination primitives
//!
//! A small toolkit for running independent units of work on background
//! threads and combining their results, plus the lower-level primitives
//! needed when threads must coordinate over time instead of handing over a
//! single value.
//!
//! # Quick Start
//!
//! ```no_run
//! use pledge::prelude::*;
//!
//! let price = submit(|| Ok(100.0_f64));
//! let rate = submit(|| Ok(13.0_f64));
//!
//! let total = price
//!     .combine(&rate, |price, rate| price * rate)
//!     .map(|total| total / 100.0);
//!
//! println!("Total: {}", total.wait().unwrap());
//! ```
//!
//! # Features
//!
//! - **Promises**: single-assignment result cells with non-blocking
//!   combinators (`map`, `flat_map`, `combine`, `all_of`, `any_of`, ...)
//! - **Executors**: a work-stealing thread pool, a thread-per-task executor
//!   and an inline executor behind one `Executor` trait
//! - **Monitor**: re-entrant lock with condition queues
//! - **Bounded queue**: blocking FIFO with a sentinel shutdown protocol
//! - **Retry cell**: optimistic compare-and-replace updates over a sharded concurrent map

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod promise;
pub mod sync;
pub mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{global, init_global, shutdown_global, Executor, ExecutorExt};
pub use promise::{all_of, any_of, collect_all, run_async, run_async_on, submit, submit_on, Promise};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_start_pipeline() {
        let price = submit(|| Ok(100.0_f64));
        let rate = submit(|| Ok(13.0_f64));

        let total = price
            .combine(&rate, |price: f64, rate: f64| price * rate)
            .map(|total| total / 100.0);

        assert_eq!(total.wait().unwrap(), 13.0);
    }

    #[test]
    fn test_await_from_async_code() {
        let promise = submit(|| Ok(21)).map(|v| v * 2);
        let value = futures::executor::block_on(promise).unwrap();
        assert_eq!(value, 42);
    }
}
