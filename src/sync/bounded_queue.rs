use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO shared between producer and consumer threads.
///
/// [`put`](Self::put) blocks while the queue is full and
/// [`take`](Self::take) blocks while it is empty; nothing is ever dropped.
/// The non-blocking [`offer`](Self::offer) / [`poll`](Self::poll) pair hands
/// control back immediately instead.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("queue capacity must be greater than 0"));
        }

        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    /// Append `item`, blocking while the queue is at capacity.
    pub fn put(&self, item: T) {
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            self.not_full.wait(&mut items);
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
    }

    /// Remove the head, blocking while the queue is empty.
    pub fn take(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Append `item` if there is room, handing it back otherwise.
    pub fn offer(&self, item: T) -> std::result::Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head if there is one.
    pub fn poll(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Like [`take`](Self::take), but gives up after `timeout`.
    ///
    /// A timeout too large to express as a deadline blocks like `take`.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        if let Some(item) = items.pop_front() {
            drop(items);
            self.not_full.notify_one();
            return Some(item);
        }
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => {
                drop(items);
                return Some(self.take());
            }
        };

        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return Some(item);
            }
            if self.not_empty.wait_until(&mut items, deadline).timed_out() {
                let item = items.pop_front();
                if item.is_some() {
                    drop(items);
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many more items fit before `put` would block.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.items.lock().len()
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Message carried by a queue that has a defined end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed<T> {
    Item(T),
    /// No more items will follow.
    End,
}

/// End-of-stream protocol for one producer and any number of consumers.
///
/// The producer enqueues exactly one [`Feed::End`] after its last item.
/// Every consumer that takes the sentinel puts it back before returning, so
/// the single sentinel reaches all consumers in turn and each of them
/// terminates. It is left in the queue once the last consumer is done.
impl<T> BoundedQueue<Feed<T>> {
    /// Enqueue one item, blocking while full.
    pub fn send(&self, item: T) {
        self.put(Feed::Item(item));
    }

    /// Producer side: signal that no more items will be sent.
    pub fn finish(&self) {
        tracing::debug!("feed finished");
        self.put(Feed::End);
    }

    /// Consumer side: feed every item to `f` until the sentinel arrives.
    ///
    /// Returns the number of items this consumer processed.
    pub fn consume<F>(&self, mut f: F) -> usize
    where
        F: FnMut(T),
    {
        let mut processed = 0;
        loop {
            match self.take() {
                Feed::Item(item) => {
                    f(item);
                    processed += 1;
                }
                Feed::End => {
                    self.put(Feed::End);
                    tracing::debug!(processed, "consumer reached end of feed");
                    return processed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedQueue::<u8>::new(0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4).unwrap();
        for i in 0..4 {
            queue.put(i);
        }
        let drained: Vec<_> = (0..4).map(|_| queue.take()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_offer_and_poll_do_not_block() {
        let queue = BoundedQueue::new(1).unwrap();
        assert_eq!(queue.poll(), None);
        assert_eq!(queue.offer('a'), Ok(()));
        assert_eq!(queue.offer('b'), Err('b'));
        assert_eq!(queue.remaining_capacity(), 0);
        assert_eq!(queue.poll(), Some('a'));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_poll_timeout_gives_up() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(2).unwrap();
        let start = Instant::now();
        assert_eq!(queue.poll_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_poll_timeout_with_huge_timeout() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        queue.put(1u8);
        assert_eq!(queue.poll_timeout(Duration::MAX), Some(1));

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.put(2);
            })
        };

        assert_eq!(queue.poll_timeout(Duration::MAX), Some(2));
        producer.join().unwrap();
    }

    #[test]
    fn test_put_blocks_until_space_frees() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        let finished = Arc::new(AtomicBool::new(false));

        let producer = {
            let queue = queue.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                for i in 0..3 {
                    queue.put(i);
                }
                finished.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.take(), 0);
        producer.join().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(queue.take(), 1);
        assert_eq!(queue.take(), 2);
    }

    #[test]
    fn test_single_sentinel_stops_every_consumer() {
        let queue: Arc<BoundedQueue<Feed<u32>>> = Arc::new(BoundedQueue::new(3).unwrap());

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.consume(|_: u32| ()))
            })
            .collect();

        for i in 0..100 {
            queue.send(i);
        }
        queue.finish();

        let processed: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(processed, 100);
        assert_eq!(queue.poll(), Some(Feed::End));
    }
}
