// worker thread loop for ThreadPool
use super::panic_handler::PanicHandler;
use super::task::Task;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub tasks_stolen: AtomicU64,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            tasks_executed: AtomicU64::new(0),
            tasks_stolen: AtomicU64::new(0),
        }
    }
}

/// Queues and flags shared by every worker of one pool.
pub(crate) struct Shared {
    pub injector: Injector<Task>,
    pub stealers: Vec<Stealer<Task>>,
    pub shutdown: AtomicBool,
    /// Submitted but not yet picked up by a worker
    pub queued: AtomicUsize,
    /// Submitted and not yet finished
    pub pending_tasks: AtomicUsize,
    pub panic_handler: PanicHandler,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
    pub state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::new()),
        }
    }

    // main loop; drains remaining work before honouring shutdown
    pub fn run(&self, shared: Arc<Shared>) {
        let mut backoff_cnt = 0;

        loop {
            // Priority: local -> global -> steal
            if let Some(task) = self.find_task(&shared) {
                backoff_cnt = 0;
                shared.queued.fetch_sub(1, Ordering::SeqCst);
                self.execute_task(task, &shared.panic_handler);
                shared.pending_tasks.fetch_sub(1, Ordering::AcqRel);
            } else if shared.shutdown.load(Ordering::SeqCst)
                && shared.queued.load(Ordering::SeqCst) == 0
            {
                break;
            } else {
                self.backoff(&mut backoff_cnt);
            }
        }

        tracing::debug!(
            worker = self.id,
            executed = self.state.tasks_executed.load(Ordering::Relaxed),
            stolen = self.state.tasks_stolen.load(Ordering::Relaxed),
            "worker exiting"
        );
    }

    fn find_task(&self, shared: &Shared) -> Option<Task> {
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        loop {
            match shared.injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(&shared.stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>]) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() <= 1 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        self.state.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_task(&self, task: Task, handler: &PanicHandler) {
        let tid = task.id();

        if handler.execute(|| task.execute()).is_err() {
            tracing::warn!(worker = self.id, task = ?tid, "task panicked");
        }

        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    fn backoff(&self, count: &mut u32) {
        const MAX_SPINS: u32 = 10;
        const MAX_YIELDS: u32 = 20;

        *count += 1;

        if *count <= MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(Duration::from_micros(100));
        }
    }
}
