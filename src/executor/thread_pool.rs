use super::panic_handler::PanicHandler;
use super::task::Task;
use super::worker::{Shared, Worker, WorkerId, WorkerState};
use super::Executor;
use crate::config::Config;
use crate::error::{Error, Result};
use crossbeam_deque::Injector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Fixed-size pool of worker threads with work stealing.
///
/// The pool must be closed by its creator, either explicitly through
/// [`ThreadPool::shutdown`] or by dropping it. Shutdown stops accepting new
/// tasks, lets the workers drain everything already queued, then joins them.
pub struct ThreadPool {
    workers: Mutex<Vec<WorkerHandle>>,
    unparkers: Vec<thread::Thread>,
    states: Vec<Arc<WorkerState>>,
    shared: Arc<Shared>,
    num_threads: usize,
    name: String,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let mut workers = Vec::with_capacity(num_threads);
        let mut stealers = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let worker = Worker::new(id);
            stealers.push(worker.local_queue.stealer());
            workers.push(worker);
        }

        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            shutdown: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            pending_tasks: AtomicUsize::new(0),
            panic_handler: PanicHandler::new(config.panic_strategy),
        });

        let mut handles: Vec<WorkerHandle> = Vec::with_capacity(num_threads);
        let mut unparkers: Vec<thread::Thread> = Vec::with_capacity(num_threads);
        let mut states = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let state = worker.state.clone();
            let shared_clone = shared.clone();
            let name = format!("{}-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let spawned = builder.spawn(move || worker.run(shared_clone));

            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    // release the workers that did start before reporting
                    shared.shutdown.store(true, Ordering::Release);
                    for unparker in &unparkers {
                        unparker.unpark();
                    }
                    for handle in handles.drain(..) {
                        if let Some(thread) = handle.thread {
                            let _ = thread.join();
                        }
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            };

            unparkers.push(thread.thread().clone());
            states.push(state);
            handles.push(WorkerHandle {
                id,
                thread: Some(thread),
            });
        }

        tracing::debug!(
            threads = num_threads,
            prefix = %config.thread_name_prefix,
            "thread pool started"
        );

        Ok(Self {
            workers: Mutex::new(handles),
            unparkers,
            states,
            shared,
            num_threads,
            name: config.thread_name_prefix.clone(),
        })
    }

    /// Pool with `n` workers and otherwise default settings.
    pub fn with_threads(n: usize) -> Result<Self> {
        let config = Config::builder().num_threads(n).build()?;
        Self::new(&config)
    }

    pub fn submit(&self, task: Task) -> Result<()> {
        // Count the task before checking the flag: workers only exit once
        // they see the flag set and nothing queued.
        let queued = self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if self.shared.shutdown.load(Ordering::SeqCst) {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::executor(format!(
                "pool '{}' is shut down",
                self.name
            )));
        }

        self.shared.pending_tasks.fetch_add(1, Ordering::AcqRel);
        self.shared.injector.push(task);

        // Wake up a worker
        self.unparkers[queued % self.unparkers.len()].unpark();

        Ok(())
    }

    /// Tasks queued or running.
    pub fn pending_tasks(&self) -> usize {
        self.shared.pending_tasks.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Total tasks run to completion (or panic) across all workers.
    pub fn completed_tasks(&self) -> u64 {
        self.states
            .iter()
            .map(|s| s.tasks_executed.load(Ordering::Relaxed))
            .sum()
    }

    pub fn panicked_tasks(&self) -> usize {
        self.shared.panic_handler.panic_count()
    }

    /// Stop accepting tasks, drain the queues and join every worker.
    ///
    /// Safe to call more than once, and from one of the pool's own workers:
    /// the calling worker is not joined.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);

        // wake everyone up to check shutdown flag
        for unparker in &self.unparkers {
            unparker.unpark();
        }

        let current = thread::current().id();
        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            if worker.thread.as_ref().map(|t| t.thread().id()) == Some(current) {
                continue;
            }
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::warn!(worker = worker.id, "worker thread panicked");
                }
            }
        }

        tracing::debug!(pool = %self.name, "thread pool stopped");
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) -> Result<()> {
        self.submit(task)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.name)
            .field("num_threads", &self.num_threads)
            .field("pending_tasks", &self.pending_tasks())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
