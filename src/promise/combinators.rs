//! Operators deriving new promises from existing ones.
//!
//! None of these block. Each registers a continuation on its source
//! promise(s) and returns the derived promise immediately. Rejections flow
//! unchanged into every derived promise, except through [`Promise::recover`]
//! and [`Promise::handle`], whose job is to turn a failure into a value.
//! User callbacks that panic reject the derived promise with
//! [`Error::Panicked`].

use super::{call_guarded, Promise};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

impl<T: Clone + Send + 'static> Promise<T> {
    /// Transform the value once it arrives, inline on whichever thread
    /// observes the settlement.
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like [`map`](Self::map), for transformations that can fail.
    pub fn try_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let derived = Promise::new();
        let writer = derived.clone();

        self.on_complete(move |outcome| {
            writer.settle(outcome.and_then(|value| call_guarded(move || f(value))));
        });

        derived
    }

    /// Transform the value on `executor` instead of the settling thread.
    pub fn map_on<E, U, F>(&self, executor: &Arc<E>, f: F) -> Promise<U>
    where
        E: Executor + ?Sized + 'static,
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_map_on(executor, move |value| Ok(f(value)))
    }

    pub fn try_map_on<E, U, F>(&self, executor: &Arc<E>, f: F) -> Promise<U>
    where
        E: Executor + ?Sized + 'static,
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let derived = Promise::new();
        let writer = derived.clone();
        let executor = executor.clone();

        self.on_complete(move |outcome| match outcome {
            Ok(value) => {
                let fallback = writer.clone();
                let scheduled = executor.run(move || {
                    writer.settle(call_guarded(move || f(value)));
                });
                if let Err(err) = scheduled {
                    fallback.complete_exceptionally(err);
                }
            }
            // no point hopping threads just to forward an error
            Err(err) => {
                writer.complete_exceptionally(err);
            }
        });

        derived
    }

    /// Consume the value, yielding a promise that only signals completion.
    pub fn then_accept<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.map(f)
    }

    /// Run `f` after a successful settlement, ignoring the value.
    pub fn then_run<F>(&self, f: F) -> Promise<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.map(move |_| f())
    }

    /// Sequential composition: `f` starts a new asynchronous stage from the
    /// value, and the derived promise settles with that stage's outcome.
    pub fn flat_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let derived = Promise::new();
        let writer = derived.clone();

        self.on_complete(move |outcome| {
            let next = outcome.and_then(|value| call_guarded(move || Ok(f(value))));
            match next {
                Ok(stage) => stage.on_complete(move |inner| {
                    writer.settle(inner);
                }),
                Err(err) => {
                    writer.complete_exceptionally(err);
                }
            }
        });

        derived
    }

    /// Once both `self` and `other` are fulfilled, merge their values.
    ///
    /// The two sources run independently; the first rejection from either
    /// side rejects the result.
    pub fn combine<U, V, F>(&self, other: &Promise<U>, f: F) -> Promise<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let derived = Promise::new();
        let join = Arc::new(Mutex::new(Pair {
            left: None,
            right: None,
            merge: Some(f),
        }));

        {
            let writer = derived.clone();
            let join = join.clone();
            self.on_complete(move |outcome| match outcome {
                Ok(value) => {
                    let ready = {
                        let mut pair = join.lock();
                        pair.left = Some(value);
                        pair.take_ready()
                    };
                    if let Some((a, b, merge)) = ready {
                        writer.settle(call_guarded(move || Ok(merge(a, b))));
                    }
                }
                Err(err) => {
                    writer.complete_exceptionally(err);
                }
            });
        }

        {
            let writer = derived.clone();
            other.on_complete(move |outcome| match outcome {
                Ok(value) => {
                    let ready = {
                        let mut pair = join.lock();
                        pair.right = Some(value);
                        pair.take_ready()
                    };
                    if let Some((a, b, merge)) = ready {
                        writer.settle(call_guarded(move || Ok(merge(a, b))));
                    }
                }
                Err(err) => {
                    writer.complete_exceptionally(err);
                }
            });
        }

        derived
    }

    /// Turn a rejection into a value. Successful values pass through; an
    /// `Err` returned by `handler` becomes the new rejection.
    pub fn recover<F>(&self, handler: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        let derived = Promise::new();
        let writer = derived.clone();

        self.on_complete(move |outcome| {
            let outcome = match outcome {
                Ok(value) => Ok(value),
                Err(err) => call_guarded(move || handler(err)),
            };
            writer.settle(outcome);
        });

        derived
    }

    /// Observe the outcome whatever it is. `handler` runs exactly once and
    /// sees either the value or the error, never both.
    pub fn handle<U, F>(&self, handler: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let derived = Promise::new();
        let writer = derived.clone();

        self.on_complete(move |outcome| {
            writer.settle(call_guarded(move || handler(outcome)));
        });

        derived
    }
}

struct Pair<T, U, F> {
    left: Option<T>,
    right: Option<U>,
    merge: Option<F>,
}

impl<T, U, F> Pair<T, U, F> {
    fn take_ready(&mut self) -> Option<(T, U, F)> {
        if self.left.is_some() && self.right.is_some() {
            match (self.left.take(), self.right.take(), self.merge.take()) {
                (Some(a), Some(b), Some(merge)) => Some((a, b, merge)),
                _ => None,
            }
        } else {
            None
        }
    }
}

/// Settles once every input has settled.
///
/// This waits for all inputs rather than failing fast. If any input was
/// rejected, the result is rejected with the first rejection observed;
/// callers read individual values back from the inputs themselves.
/// An empty input is fulfilled immediately.
pub fn all_of<T>(promises: &[Promise<T>]) -> Promise<()>
where
    T: Clone + Send + 'static,
{
    if promises.is_empty() {
        return Promise::fulfilled(());
    }

    let derived = Promise::new();
    let remaining = Arc::new(AtomicUsize::new(promises.len()));
    let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

    for promise in promises {
        let writer = derived.clone();
        let remaining = remaining.clone();
        let first_error = first_error.clone();

        promise.on_complete(move |outcome| {
            if let Err(err) = outcome {
                first_error.lock().get_or_insert(err);
            }

            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                match first_error.lock().take() {
                    Some(err) => writer.complete_exceptionally(err),
                    None => writer.complete(()),
                };
            }
        });
    }

    derived
}

/// Settles with the outcome of whichever input settles first.
///
/// The losers keep running; their outcomes are discarded. An empty input is
/// rejected with [`Error::IllegalState`] since it could never settle.
pub fn any_of<T>(promises: &[Promise<T>]) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    if promises.is_empty() {
        return Promise::rejected(Error::illegal_state("any_of called with no promises"));
    }

    let derived = Promise::new();
    for promise in promises {
        let writer = derived.clone();
        promise.on_complete(move |outcome| {
            writer.settle(outcome);
        });
    }

    derived
}

/// Gather every value in input order once all inputs are fulfilled.
///
/// Unlike [`all_of`] this fails fast: the first rejection rejects the
/// result without waiting for the remaining inputs.
pub fn collect_all<T>(promises: &[Promise<T>]) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if promises.is_empty() {
        return Promise::fulfilled(Vec::new());
    }

    let derived = Promise::new();
    let remaining = Arc::new(AtomicUsize::new(promises.len()));
    let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; promises.len()]));

    for (index, promise) in promises.iter().enumerate() {
        let writer = derived.clone();
        let remaining = remaining.clone();
        let slots = slots.clone();

        promise.on_complete(move |outcome| match outcome {
            Ok(value) => {
                slots.lock()[index] = Some(value);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values: Vec<T> = slots.lock().iter_mut().filter_map(Option::take).collect();
                    writer.complete(values);
                }
            }
            Err(err) => {
                writer.complete_exceptionally(err);
            }
        });
    }

    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InlineExecutor, ThreadPool};
    use crate::promise::submit_on;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_map_skips_function_on_rejection() {
        let source: Promise<i32> = Promise::new();
        let called = Arc::new(AtomicUsize::new(0));

        let counter = called.clone();
        let mapped = source.map(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v * 2
        });

        source.complete_exceptionally(Error::msg("upstream"));

        assert_eq!(mapped.wait().unwrap_err().message(), "upstream");
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_try_map_error_rejects() {
        let mapped = Promise::fulfilled(-1).try_map(|num: i32| {
            if num < 0 {
                Err(Error::msg("negative"))
            } else {
                Ok(num)
            }
        });

        assert_eq!(mapped.wait().unwrap_err().message(), "negative");
    }

    #[test]
    fn test_map_on_runs_on_pool_thread() {
        let pool = Arc::new(
            ThreadPool::new(
                &crate::Config::builder()
                    .num_threads(1)
                    .thread_name_prefix("mapper")
                    .build()
                    .unwrap(),
            )
            .unwrap(),
        );

        let name = Promise::fulfilled(1)
            .map_on(&pool, |_| thread::current().name().map(str::to_owned))
            .wait()
            .unwrap()
            .unwrap();

        assert!(name.starts_with("mapper-"));
    }

    #[test]
    fn test_map_on_rejected_executor() {
        let pool = Arc::new(ThreadPool::with_threads(1).unwrap());
        pool.shutdown();

        let mapped = Promise::fulfilled(1).map_on(&pool, |v| v + 1);
        assert!(matches!(mapped.wait(), Err(Error::Executor(_))));
    }

    #[test]
    fn test_flat_map_flattens_inner_outcome() {
        let inline = InlineExecutor::new();
        let result = Promise::fulfilled(20)
            .flat_map(move |v| submit_on(&inline, move || Ok(v + 1)))
            .wait()
            .unwrap();
        assert_eq!(result, 21);

        let failed: Promise<i32> =
            Promise::fulfilled(1).flat_map(|_| Promise::rejected(Error::msg("inner")));
        assert_eq!(failed.wait().unwrap_err().message(), "inner");
    }

    #[test]
    fn test_combine_waits_for_both() {
        let a = Promise::new();
        let b = Promise::new();
        let sum = a.combine(&b, |x: f64, y: f64| x * y);

        a.complete(100.0);
        assert!(!sum.is_done());

        b.complete(13.0);
        assert_eq!(sum.wait().unwrap(), 1300.0);
    }

    #[test]
    fn test_combine_first_rejection_wins() {
        let a: Promise<i32> = Promise::new();
        let b: Promise<i32> = Promise::new();
        let merged = a.combine(&b, |x, y| x + y);

        b.complete_exceptionally(Error::msg("right failed"));
        a.complete_exceptionally(Error::msg("left failed"));

        assert_eq!(merged.wait().unwrap_err().message(), "right failed");
    }

    #[test]
    fn test_recover_passes_values_through() {
        let ok = Promise::fulfilled(4).recover(|_| Ok(0));
        assert_eq!(ok.wait().unwrap(), 4);

        let fixed: Promise<i32> =
            Promise::rejected(Error::msg("broken")).recover(|err| Ok(err.message().len() as i32));
        assert_eq!(fixed.wait().unwrap(), 6);

        let still_broken: Promise<i32> =
            Promise::rejected(Error::msg("a")).recover(|_| Err(Error::msg("b")));
        assert_eq!(still_broken.wait().unwrap_err().message(), "b");
    }

    #[test]
    fn test_handle_sees_exactly_one_side() {
        let seen = Promise::fulfilled(3).handle(|outcome| Ok(outcome.is_ok()));
        assert!(seen.wait().unwrap());

        let seen: Promise<String> =
            Promise::<i32>::rejected(Error::msg("oops")).handle(|outcome| match outcome {
                Ok(v) => Ok(v.to_string()),
                Err(err) => Ok(err.message()),
            });
        assert_eq!(seen.wait().unwrap(), "oops");
    }

    #[test]
    fn test_handle_panic_rejects() {
        let derived: Promise<i32> = Promise::fulfilled(1).handle(|_| panic!("handler"));
        assert!(matches!(derived.wait(), Err(Error::Panicked(_))));
    }

    #[test]
    fn test_all_of_waits_for_stragglers_after_failure() {
        let fast: Promise<i32> = Promise::new();
        let slow: Promise<i32> = Promise::new();
        let all = all_of(&[fast.clone(), slow.clone()]);

        fast.complete_exceptionally(Error::msg("fast failed"));
        assert!(!all.is_done());

        slow.complete(1);
        assert_eq!(all.wait().unwrap_err().message(), "fast failed");
    }

    #[test]
    fn test_all_of_empty_is_done() {
        let none: [Promise<u8>; 0] = [];
        assert!(all_of(&none).wait().is_ok());
    }

    #[test]
    fn test_any_of_takes_first() {
        let a: Promise<&str> = Promise::new();
        let b: Promise<&str> = Promise::new();
        let first = any_of(&[a.clone(), b.clone()]);

        b.complete("b");
        a.complete("a");

        assert_eq!(first.wait().unwrap(), "b");
    }

    #[test]
    fn test_any_of_empty_is_rejected() {
        let none: [Promise<u8>; 0] = [];
        assert!(matches!(any_of(&none).wait(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_collect_all_keeps_input_order() {
        let pool = ThreadPool::with_threads(4).unwrap();
        let promises: Vec<Promise<u64>> = (0..8u64)
            .map(|i| {
                submit_on(&pool, move || {
                    thread::sleep(Duration::from_millis(8 - i));
                    Ok(i)
                })
            })
            .collect();

        assert_eq!(collect_all(&promises).wait().unwrap(), (0..8).collect::<Vec<_>>());
    }
}
