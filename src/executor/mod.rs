//! Task execution infrastructure.
//!
//! An [`Executor`] accepts zero-argument units of work and guarantees each
//! one eventually runs exactly once. Three implementations are provided:
//!
//! - [`ThreadPool`]: a fixed number of work-stealing worker threads
//! - [`SpawnExecutor`]: unbounded, one fresh thread per task
//! - [`InlineExecutor`]: runs the task on the submitting thread
//!
//! plus a lazily created, process-wide shared pool reachable via [`global`].
//! No ordering is guaranteed between independently submitted tasks.

pub mod panic_handler;
pub mod task;
pub mod thread_pool;
pub mod worker;

pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use task::{Task, TaskId};
pub use thread_pool::ThreadPool;

use crate::config::Config;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Something that runs tasks, possibly concurrently.
pub trait Executor: Send + Sync {
    /// Schedule `task`. An `Err` means the task was not accepted and will
    /// never run.
    fn execute(&self, task: Task) -> Result<()>;
}

/// Closure-friendly entry point for every executor, including trait objects.
pub trait ExecutorExt {
    fn run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static;
}

impl<E: Executor + ?Sized> ExecutorExt for E {
    fn run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Task::new(f))
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    panic_handler: PanicHandler,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let _ = self.panic_handler.execute(|| task.execute());
        Ok(())
    }
}

/// Unbounded executor: every task gets its own OS thread.
#[derive(Debug)]
pub struct SpawnExecutor {
    thread_name_prefix: String,
    stack_size: Option<usize>,
    spawned: AtomicU64,
}

impl SpawnExecutor {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        Self {
            thread_name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.stack_size,
            spawned: AtomicU64::new(0),
        }
    }

    /// Number of threads started so far.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for SpawnExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for SpawnExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            thread::Builder::new().name(format!("{}-spawn-{}", self.thread_name_prefix, n));
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        builder
            .spawn(move || {
                let _ = PanicHandler::default().execute(|| task.execute());
            })
            .map(|_| ())
            .map_err(|e| Error::executor(format!("spawn failed: {}", e)))
    }
}

// Shared default pool, created on first use
static GLOBAL_POOL: RwLock<Option<Arc<ThreadPool>>> = RwLock::new(None);

/// The process-wide shared pool, created with [`Config::default`] on first use.
pub fn global() -> Result<Arc<ThreadPool>> {
    if let Some(pool) = GLOBAL_POOL.read().as_ref() {
        return Ok(pool.clone());
    }

    let mut slot = GLOBAL_POOL.write();
    if let Some(pool) = slot.as_ref() {
        return Ok(pool.clone());
    }

    let config = Config::builder()
        .thread_name_prefix("pledge-global")
        .build()?;
    let pool = Arc::new(ThreadPool::new(&config)?);
    *slot = Some(pool.clone());
    Ok(pool)
}

/// Configure the shared pool explicitly. Fails if it already exists.
pub fn init_global(config: Config) -> Result<()> {
    let mut slot = GLOBAL_POOL.write();
    if slot.is_some() {
        return Err(Error::illegal_state("global pool already initialized"));
    }

    *slot = Some(Arc::new(ThreadPool::new(&config)?));
    Ok(())
}

/// Detach the shared pool and drain it. The next [`global`] call builds a new one.
pub fn shutdown_global() {
    let pool = GLOBAL_POOL.write().take();
    if let Some(pool) = pool {
        pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_inline_runs_on_caller() {
        let executor = InlineExecutor::new();
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();

        executor
            .run(move || tx.send(thread::current().id()).unwrap())
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), caller);
    }

    #[test]
    fn test_inline_survives_panic() {
        let executor = InlineExecutor::new();
        assert!(executor.run(|| panic!("inline")).is_ok());
    }

    #[test]
    fn test_spawn_executor_uses_fresh_threads() {
        let executor = SpawnExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        for _ in 0..16 {
            let counter = counter.clone();
            let tx = tx.clone();
            executor
                .run(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tx.send(()).unwrap();
                })
                .unwrap();
        }

        for _ in 0..16 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert_eq!(executor.spawned(), 16);
    }

    #[test]
    fn test_dyn_executor() {
        let executor: Arc<dyn Executor> = Arc::new(InlineExecutor::new());
        let (tx, rx) = mpsc::channel();
        executor.run(move || tx.send(1).unwrap()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        let a = global().unwrap();
        let b = global().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(init_global(Config::default()).is_err());
    }
}
