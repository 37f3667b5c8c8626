use crate::util::Backoff;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent map updated by optimistic read-compute-swap loops.
///
/// Readers never block writers for longer than a single shard access, and
/// no lock is held while the update function runs. A conflicting write
/// between the read and the swap makes the swap fail, and the loop retries
/// from a fresh read, so no update is lost.
///
/// Under pathological contention a writer can keep losing the race
/// indefinitely. Such livelock is accepted; the loop never gives up and
/// never reports failure.
#[derive(Debug)]
pub struct RetryCell<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
    conflicts: AtomicU64,
}

impl<K, V> RetryCell<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            conflicts: AtomicU64::new(0),
        }
    }

    /// A copy of the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Unconditionally store `value`, returning the previous one.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    /// Install `new` only if the current value equals `expected`.
    ///
    /// `expected = None` means the key must be absent. The comparison and the
    /// write happen under the key's shard lock, so they are atomic with
    /// respect to every other operation on the same key.
    pub fn compare_and_replace(&self, key: K, expected: Option<&V>, new: V) -> bool {
        match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                if expected == Some(occupied.get()) {
                    occupied.insert(new);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(new);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Apply `f` to the current value (or `default` if the key is absent)
    /// and install the result, retrying until no other writer interferes.
    ///
    /// `f` may run several times and must not have side effects. Returns
    /// the value that was installed.
    pub fn update_atomically<F>(&self, key: K, default: V, f: F) -> V
    where
        F: Fn(&V) -> V,
    {
        let mut backoff = Backoff::new();
        loop {
            let current = self.get(&key);
            let next = f(current.as_ref().unwrap_or(&default));

            if self.compare_and_replace(key.clone(), current.as_ref(), next.clone()) {
                return next;
            }

            self.conflicts.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("retry cell swap lost a race, retrying");
            backoff.spin();
        }
    }

    /// Number of swaps that failed and had to be retried so far.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> Default for RetryCell<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}
