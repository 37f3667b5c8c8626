use super::{call_guarded, Promise};
use crate::error::Result;
use crate::executor::{self, Executor, ExecutorExt};

/// Run `supplier` on the shared pool and return a promise for its outcome.
///
/// An `Err` from the supplier, or a panic inside it, rejects the promise.
pub fn submit<T, F>(supplier: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match executor::global() {
        Ok(pool) => submit_on(&*pool, supplier),
        Err(err) => Promise::rejected(err),
    }
}

/// Run `supplier` on `executor` and return a promise for its outcome.
///
/// If the executor refuses the job the promise is rejected with the
/// executor's error.
pub fn submit_on<E, T, F>(executor: &E, supplier: F) -> Promise<T>
where
    E: Executor + ?Sized,
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let promise = Promise::new();
    let writer = promise.clone();

    let scheduled = executor.run(move || {
        writer.settle(call_guarded(supplier));
    });

    if let Err(err) = scheduled {
        promise.complete_exceptionally(err);
    }

    promise
}

/// Run a side-effecting action on the shared pool.
pub fn run_async<F>(action: F) -> Promise<()>
where
    F: FnOnce() + Send + 'static,
{
    submit(move || {
        action();
        Ok(())
    })
}

pub fn run_async_on<E, F>(executor: &E, action: F) -> Promise<()>
where
    E: Executor + ?Sized,
    F: FnOnce() + Send + 'static,
{
    submit_on(executor, move || {
        action();
        Ok(())
    })
}
