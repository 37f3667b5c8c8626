//! Single-assignment result cells.
//!
//! A [`Promise`] starts out pending and is settled exactly once, either by
//! the supplier it wraps (see [`submit`]) or by an explicit
//! [`Promise::complete`] / [`Promise::complete_exceptionally`] call. The first
//! writer wins; later attempts are silently ignored.
//!
//! Continuations registered before settlement fire exactly once, in
//! registration order, on the thread that settles the promise (or on an
//! executor of the continuation's choosing). Continuations registered after
//! settlement run immediately on the registering thread.
//!
//! Only [`Promise::wait`] and [`Promise::wait_timeout`] block. Everything in
//! [`combinators`] registers continuations and returns straight away.

pub mod combinators;
mod state;
mod submit;

pub use combinators::{all_of, any_of, collect_all};
pub use state::State;
pub use submit::{run_async, run_async_on, submit, submit_on};

use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorExt, PanicInfo};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

struct Slot<T> {
    state: State<T>,
    callbacks: Vec<Callback<T>>,
    // tasks awaiting the promise, one entry per distinct waker
    wakers: Vec<Waker>,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

/// A value that will exist later.
///
/// Cloning a promise yields another handle to the same cell.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// A pending promise, to be settled manually.
    pub fn new() -> Self {
        Self::with_state(State::Pending)
    }

    pub fn fulfilled(value: T) -> Self {
        Self::with_state(State::Fulfilled(value))
    }

    pub fn rejected(err: Error) -> Self {
        Self::with_state(State::Rejected(err))
    }

    fn with_state(state: State<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    state,
                    callbacks: Vec::new(),
                    wakers: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Fulfill the promise. Returns `false` if it was already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject the promise. Returns `false` if it was already settled.
    pub fn complete_exceptionally(&self, err: Error) -> bool {
        self.settle(Err(err))
    }

    /// Settle with either outcome; only the first call has any effect.
    pub fn settle(&self, outcome: Result<T>) -> bool {
        let (callbacks, wakers) = {
            let mut slot = self.inner.slot.lock();
            if slot.state.is_final() {
                return false;
            }
            slot.state = State::from(outcome.clone());
            (
                std::mem::take(&mut slot.callbacks),
                std::mem::take(&mut slot.wakers),
            )
        };

        self.inner.settled.notify_all();
        tracing::trace!(
            ok = outcome.is_ok(),
            callbacks = callbacks.len(),
            "promise settled"
        );

        // each continuation runs even if an earlier one panics
        for callback in callbacks {
            run_continuation(callback, outcome.clone());
        }
        for waker in wakers {
            waker.wake();
        }

        true
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State<T> {
        self.inner.slot.lock().state.clone()
    }

    /// The outcome if already settled, without blocking.
    pub fn peek(&self) -> Option<Result<T>> {
        self.inner.slot.lock().state.outcome()
    }

    pub fn is_done(&self) -> bool {
        self.inner.slot.lock().state.is_final()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.inner.slot.lock().state.is_fulfilled()
    }

    pub fn is_rejected(&self) -> bool {
        self.inner.slot.lock().state.is_rejected()
    }

    /// Block until settled, then return a copy of the outcome.
    ///
    /// A promise that is never settled blocks forever. Repeated calls return
    /// the same outcome.
    pub fn wait(&self) -> Result<T> {
        let mut slot = self.inner.slot.lock();
        loop {
            if let Some(outcome) = slot.state.outcome() {
                return outcome;
            }
            self.inner.settled.wait(&mut slot);
        }
    }

    /// Like [`wait`](Self::wait) but gives up with [`Error::Timeout`] once
    /// `timeout` has elapsed. Giving up leaves the promise untouched.
    ///
    /// A timeout too large to express as a deadline waits without bound.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let mut slot = self.inner.slot.lock();
        if let Some(outcome) = slot.state.outcome() {
            return outcome;
        }
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => {
                drop(slot);
                return self.wait();
            }
        };

        loop {
            if let Some(outcome) = slot.state.outcome() {
                return outcome;
            }
            if self
                .inner
                .settled
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return slot
                    .state
                    .outcome()
                    .unwrap_or(Err(Error::Timeout(timeout)));
            }
        }
    }

    /// Register a continuation that receives the outcome exactly once.
    ///
    /// A panic inside `callback` is caught and logged; it neither reaches
    /// the settling thread nor keeps later continuations from running.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let outcome = {
            let mut slot = self.inner.slot.lock();
            match slot.state.outcome() {
                Some(outcome) => outcome,
                None => {
                    slot.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };

        run_continuation(callback, outcome);
    }

    /// Register a continuation that is dispatched to `executor` once the
    /// promise settles.
    ///
    /// If the executor refuses the job the continuation is dropped without
    /// running; the refusal is logged.
    pub fn on_complete_on<E, F>(&self, executor: &Arc<E>, callback: F)
    where
        E: Executor + ?Sized + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let executor = executor.clone();
        self.on_complete(move |outcome| {
            if let Err(err) = executor.run(move || callback(outcome)) {
                tracing::warn!(error = %err, "continuation rejected by executor");
            }
        });
    }
}

impl<T: Clone + Send + 'static> std::future::Future for Promise<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.inner.slot.lock();
        if let Some(outcome) = slot.state.outcome() {
            return Poll::Ready(outcome);
        }

        // re-polling with the same waker must not grow the list
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.slot.lock().state {
            State::Pending => "Pending",
            State::Fulfilled(_) => "Fulfilled",
            State::Rejected(_) => "Rejected",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

fn run_continuation<T, F>(callback: F, outcome: Result<T>)
where
    F: FnOnce(Result<T>),
{
    if let Err(payload) = catch_unwind(AssertUnwindSafe(move || callback(outcome))) {
        let info = PanicInfo::from_payload(payload);
        tracing::warn!(message = %info.message, thread = ?info.thread, "continuation panicked");
    }
}

/// Run user code, turning a panic into [`Error::Panicked`].
pub(crate) fn call_guarded<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let info = PanicInfo::from_payload(payload);
            tracing::warn!(message = %info.message, thread = ?info.thread, "callback panicked");
            Err(info.into())
        }
    }
}
