use crate::error::Error;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// What an executor does when a task unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicStrategy {
    /// Kill the process.
    Abort,
    /// Swallow the panic silently; only the counter moves.
    Isolate,
    /// Log at warn level and keep the worker running.
    #[default]
    LogAndContinue,
}

/// Catches unwinding tasks so a worker thread outlives the jobs it runs.
///
/// Suppliers submitted through promises already turn their own panics into
/// rejections; this handler is the last line for raw executor tasks.
#[derive(Debug)]
pub struct PanicHandler {
    strategy: PanicStrategy,
    caught: AtomicUsize,
}

impl PanicHandler {
    pub fn new(strategy: PanicStrategy) -> Self {
        Self {
            strategy,
            caught: AtomicUsize::new(0),
        }
    }

    /// Run `job`, returning its value or a description of the panic.
    pub fn execute<F, R>(&self, job: F) -> Result<R, PanicInfo>
    where
        F: FnOnce() -> R,
    {
        catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
            let info = PanicInfo::from_payload(payload);
            self.caught.fetch_add(1, Ordering::Relaxed);
            self.report(&info);
            info
        })
    }

    fn report(&self, info: &PanicInfo) {
        match self.strategy {
            PanicStrategy::Abort => {
                tracing::error!(thread = ?info.thread, message = %info.message, "task panicked, aborting");
                std::process::abort();
            }
            PanicStrategy::Isolate => {}
            PanicStrategy::LogAndContinue => {
                tracing::warn!(thread = ?info.thread, message = %info.message, "task panicked");
            }
        }
    }

    /// Panics caught since creation or the last reset.
    pub fn panic_count(&self) -> usize {
        self.caught.load(Ordering::Relaxed)
    }

    pub fn reset_count(&self) {
        self.caught.store(0, Ordering::Relaxed);
    }

    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

impl Default for PanicHandler {
    fn default() -> Self {
        Self::new(PanicStrategy::default())
    }
}

/// A caught panic, reduced to something printable.
#[derive(Debug, Clone)]
pub struct PanicInfo {
    pub message: String,
    /// Name of the thread that unwound, if it had one.
    pub thread: Option<String>,
}

impl PanicInfo {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(owned) => *owned,
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "Unknown panic".to_string()),
        };

        Self {
            message,
            thread: thread::current().name().map(str::to_owned),
        }
    }
}

impl From<PanicInfo> for Error {
    fn from(info: PanicInfo) -> Self {
        Error::Panicked(info.message)
    }
}
