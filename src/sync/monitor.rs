use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    holds: usize,
}

#[derive(Debug, Default)]
struct Inner {
    ownership: Mutex<Ownership>,
    available: Condvar,
}

impl Inner {
    fn acquire(&self, me: ThreadId) {
        let mut ownership = self.ownership.lock();
        loop {
            match ownership.owner {
                None => {
                    ownership.owner = Some(me);
                    ownership.holds = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    ownership.holds += 1;
                    return;
                }
                Some(_) => self.available.wait(&mut ownership),
            }
        }
    }

    fn release(&self) {
        let mut ownership = self.ownership.lock();
        debug_assert_eq!(ownership.owner, Some(thread::current().id()));
        ownership.holds -= 1;
        if ownership.holds == 0 {
            ownership.owner = None;
            drop(ownership);
            self.available.notify_one();
        }
    }

    fn is_held_by(&self, me: ThreadId) -> bool {
        self.ownership.lock().owner == Some(me)
    }
}

/// Re-entrant mutual exclusion paired with condition queues.
///
/// The monitor guards no data of its own; it serializes whatever shared
/// state its callers agree to touch only while holding it. The thread that
/// holds the lock may lock it again, and must release it once per
/// acquisition (dropping each [`MonitorGuard`]).
///
/// Waiting always happens in a loop that re-checks the guarded predicate.
/// A woken thread holds the lock again but has no guarantee its predicate
/// became true: [`Condition::signal_all`] wakes everyone and only some may
/// be able to proceed. A thread that sees its predicate still false must
/// wait again, or it proceeds on a false premise.
///
/// ```
/// use pledge::sync::Monitor;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let monitor = Monitor::new();
/// let stock = AtomicUsize::new(1);
///
/// let _guard = monitor.lock();
/// monitor.wait_until(|| stock.load(Ordering::SeqCst) > 0).unwrap();
/// ```
#[derive(Debug)]
pub struct Monitor {
    inner: Arc<Inner>,
    condition: Condition,
}

impl Monitor {
    pub fn new() -> Self {
        let inner = Arc::new(Inner::default());
        let condition = Condition::bound_to(inner.clone());
        Self { inner, condition }
    }

    /// Block until the calling thread holds the monitor.
    pub fn lock(&self) -> MonitorGuard<'_> {
        self.inner.acquire(thread::current().id());
        MonitorGuard {
            inner: &self.inner,
            _not_send: PhantomData,
        }
    }

    /// Acquire the monitor only if no other thread holds it.
    pub fn try_lock(&self) -> Option<MonitorGuard<'_>> {
        let me = thread::current().id();
        let mut ownership = self.inner.ownership.lock();
        match ownership.owner {
            Some(owner) if owner != me => None,
            _ => {
                ownership.owner = Some(me);
                ownership.holds += 1;
                Some(MonitorGuard {
                    inner: &self.inner,
                    _not_send: PhantomData,
                })
            }
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.is_held_by(thread::current().id())
    }

    /// How many times the calling thread currently holds the monitor.
    pub fn hold_count(&self) -> usize {
        let ownership = self.inner.ownership.lock();
        if ownership.owner == Some(thread::current().id()) {
            ownership.holds
        } else {
            0
        }
    }

    /// A fresh wait queue tied to this monitor's lock.
    pub fn new_condition(&self) -> Condition {
        Condition::bound_to(self.inner.clone())
    }

    /// Wait on the monitor's built-in condition.
    pub fn wait(&self) -> Result<()> {
        self.condition.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.condition.wait_timeout(timeout)
    }

    /// Wait on the built-in condition until `ready` returns true.
    pub fn wait_until<F>(&self, ready: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        self.condition.wait_until(ready)
    }

    pub fn notify(&self) -> Result<()> {
        self.condition.signal()
    }

    pub fn notify_all(&self) -> Result<()> {
        self.condition.signal_all()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the current thread holds a [`Monitor`]. Dropping it releases
/// one level of the hold.
#[derive(Debug)]
#[must_use = "the monitor is released as soon as the guard is dropped"]
pub struct MonitorGuard<'a> {
    inner: &'a Inner,
    // unlocking from another thread would corrupt the ownership record
    _not_send: PhantomData<*const ()>,
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// A wait queue associated with one [`Monitor`].
///
/// Every operation requires the calling thread to hold that monitor and
/// fails with [`Error::IllegalState`] otherwise.
#[derive(Debug)]
pub struct Condition {
    inner: Arc<Inner>,
    waiters: Condvar,
}

impl Condition {
    fn bound_to(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            waiters: Condvar::new(),
        }
    }

    /// Release the monitor, block until signaled, then take the monitor back
    /// with the same hold count as before.
    ///
    /// Wakeups can be spurious; see [`wait_until`](Self::wait_until).
    pub fn wait(&self) -> Result<()> {
        self.park(None).map(|_| ())
    }

    /// Like [`wait`](Self::wait) with a bound. Returns `false` if the
    /// timeout elapsed without a signal. The monitor is re-acquired either way.
    /// A timeout too large to express as a deadline waits without bound.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.park(Instant::now().checked_add(timeout))
    }

    /// Wait until `ready` returns true, re-checking after every wakeup.
    ///
    /// `ready` runs while the monitor is held.
    pub fn wait_until<F>(&self, mut ready: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        while !ready() {
            self.wait()?;
        }
        Ok(())
    }

    /// Wake one waiting thread, if any.
    pub fn signal(&self) -> Result<()> {
        let _ownership = self.owned_ownership("signal")?;
        self.waiters.notify_one();
        Ok(())
    }

    /// Wake every waiting thread. Each one re-acquires the monitor in turn.
    pub fn signal_all(&self) -> Result<()> {
        let _ownership = self.owned_ownership("signal_all")?;
        let woken = self.waiters.notify_all();
        tracing::trace!(woken, "condition broadcast");
        Ok(())
    }

    fn owned_ownership(&self, op: &str) -> Result<parking_lot::MutexGuard<'_, Ownership>> {
        let ownership = self.inner.ownership.lock();
        if ownership.owner != Some(thread::current().id()) {
            tracing::warn!(op, "condition used without holding the monitor");
            return Err(Error::illegal_state(format!(
                "{} called without holding the monitor",
                op
            )));
        }
        Ok(ownership)
    }

    fn park(&self, deadline: Option<Instant>) -> Result<bool> {
        let me = thread::current().id();
        let mut ownership = self.owned_ownership("wait")?;

        // fully release, however deep the re-entrant hold
        let holds = ownership.holds;
        ownership.owner = None;
        ownership.holds = 0;
        self.inner.available.notify_one();

        let signaled = match deadline {
            Some(deadline) => !self.waiters.wait_until(&mut ownership, deadline).timed_out(),
            None => {
                self.waiters.wait(&mut ownership);
                true
            }
        };

        while ownership.owner.is_some() {
            self.inner.available.wait(&mut ownership);
        }
        ownership.owner = Some(me);
        ownership.holds = holds;

        Ok(signaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_reentrant_lock() {
        let monitor = Monitor::new();
        let outer = monitor.lock();
        {
            let _inner = monitor.lock();
            assert_eq!(monitor.hold_count(), 2);
        }
        assert_eq!(monitor.hold_count(), 1);
        drop(outer);
        assert!(!monitor.is_held_by_current_thread());
    }

    #[test]
    fn test_try_lock_fails_while_held_elsewhere() {
        let monitor = Arc::new(Monitor::new());
        let guard = monitor.lock();

        let other = monitor.clone();
        let acquired = thread::spawn(move || other.try_lock().is_some())
            .join()
            .unwrap();
        assert!(!acquired);

        drop(guard);
        let other = monitor.clone();
        let acquired = thread::spawn(move || other.try_lock().is_some())
            .join()
            .unwrap();
        assert!(acquired);
    }

    #[test]
    fn test_wait_without_lock_is_illegal() {
        let monitor = Monitor::new();
        assert!(matches!(monitor.wait(), Err(Error::IllegalState(_))));
        assert!(matches!(monitor.notify_all(), Err(Error::IllegalState(_))));

        let condition = monitor.new_condition();
        assert!(matches!(condition.signal(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_mutual_exclusion() {
        let monitor = Arc::new(Monitor::new());
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let monitor = monitor.clone();
                let inside = inside.clone();
                let overlaps = overlaps.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let _guard = monitor.lock();
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_releases_reentrant_hold() {
        let monitor = Arc::new(Monitor::new());
        let ready = Arc::new(AtomicBool::new(false));

        let waiter = {
            let monitor = monitor.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                let _a = monitor.lock();
                let _b = monitor.lock();
                monitor
                    .wait_until(|| ready.load(Ordering::SeqCst))
                    .unwrap();
                monitor.hold_count()
            })
        };

        thread::sleep(Duration::from_millis(20));
        {
            let _guard = monitor.lock();
            ready.store(true, Ordering::SeqCst);
            monitor.notify_all().unwrap();
        }

        assert_eq!(waiter.join().unwrap(), 2);
    }

    #[test]
    fn test_wait_timeout_with_huge_timeout() {
        let monitor = Arc::new(Monitor::new());
        let ready = Arc::new(AtomicBool::new(false));

        let waiter = {
            let monitor = monitor.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                let _guard = monitor.lock();
                while !ready.load(Ordering::SeqCst) {
                    assert!(monitor.wait_timeout(Duration::MAX).unwrap());
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        {
            let _guard = monitor.lock();
            ready.store(true, Ordering::SeqCst);
            monitor.notify_all().unwrap();
        }

        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_reacquires() {
        let monitor = Monitor::new();
        let _guard = monitor.lock();

        let signaled = monitor.wait_timeout(Duration::from_millis(10)).unwrap();

        assert!(!signaled);
        assert!(monitor.is_held_by_current_thread());
    }
}
