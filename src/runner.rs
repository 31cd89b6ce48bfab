use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::delayed::DelayedTaskStore;
use crate::fifo::NearlyLocklessFifo;
use crate::thread_id::ThreadId;

/// A unit of work accepted by a task runner. Owned by the queue while
/// enqueued and by the executing worker while running.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A thread-safe API surface that allows for posting tasks.
///
/// Posted tasks are dispatched to executing threads in the order in which
/// they were posted: if A is posted before B by the same thread, A is handed
/// to a worker before B. This does NOT guarantee that A finishes (or even
/// starts) before B when the two are dispatched to different workers.
pub trait TaskRunner: Send + Sync {
    /// Accepts a boxed task to be run at the first convenient time.
    fn post_packaged_task(&self, task: Task);

    /// Accepts a boxed task to be run no sooner than `delay` from now. The
    /// task might run after an additional delay, especially under heavier
    /// load; there is no deadline concept.
    fn post_packaged_task_with_delay(&self, task: Task, delay: Duration);

    /// Returns true if the calling thread is currently executing this
    /// runner's dispatch loop.
    fn is_running_on_task_runner(&self) -> bool;
}

/// Convenience sugar over [`TaskRunner`] accepting any callable.
pub trait TaskRunnerExt: TaskRunner {
    /// Posts any callable to be run at the first convenient time.
    fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_packaged_task(Box::new(f));
    }

    /// Posts any callable to be run no sooner than `delay` from now.
    fn post_with_delay<F>(&self, f: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_packaged_task_with_delay(Box::new(f), delay);
    }
}

impl<R: TaskRunner + ?Sized> TaskRunnerExt for R {}

/// Error returned by the runner factories.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The requested worker count was zero.
    #[error("worker thread count must be greater than zero")]
    NoWorkerThreads,
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[from] io::Error),
}

/// High-performance task runner for multiple producer threads and multiple
/// consumer threads.
///
/// Ready tasks live in a [`NearlyLocklessFifo`] of capacity `N`, which is
/// expected to never contend on a mutex; delayed tasks are mutex-guarded and
/// promoted onto the ready queue by a self-posted drain task.
pub struct MultithreadedTaskRunner<const N: usize = 1024> {
    task_queue: NearlyLocklessFifo<Task, N>,
    delayed_tasks: DelayedTaskStore,

    /// Threads currently executing this runner's dispatch loop.
    executing_threads: Mutex<Vec<ThreadId>>,
    is_running: AtomicBool,
}

impl<const N: usize> MultithreadedTaskRunner<N> {
    /// Explicitly maintain the ready queue every this many dispatch
    /// attempts, so overflow cannot starve while the ring stays near-empty.
    const MAINTENANCE_INTERVAL: usize = if N / 8 == 0 { 1 } else { N / 8 };

    /// Idle strategy: spin briefly, then sleep in short slices. Never a
    /// condition variable, which would put a mutex on the consumer fast
    /// path.
    const IDLE_SPIN_LIMIT: u32 = 64;
    const IDLE_SLEEP: Duration = Duration::from_micros(10);

    /// Create a runner with no workers attached; drive it with
    /// [`run`](Self::run) or [`spawn_worker`](Self::spawn_worker).
    pub fn new() -> Arc<Self> {
        let runner = Arc::new(MultithreadedTaskRunner {
            task_queue: NearlyLocklessFifo::new(),
            delayed_tasks: DelayedTaskStore::new(),
            executing_threads: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        });
        runner.post_delayed_task_pump();
        runner
    }

    /// Worker entry point: registers the calling thread and dispatches tasks
    /// until [`stop`](Self::stop) is called.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread is already executing this runner's loop.
    pub fn run(&self) {
        let thread_id = ThreadId::current();
        {
            let mut threads = self.executing_threads.lock();
            assert!(
                !threads.contains(&thread_id),
                "thread is already executing on this task runner"
            );
            threads.push(thread_id);
        }
        self.is_running.store(true, Ordering::Release);
        tracing::trace!(thread = thread_id.as_u64(), "worker entering dispatch loop");

        let mut dispatch_attempts: usize = 0;
        let mut idle_spins: u32 = 0;
        while self.is_running.load(Ordering::Acquire) {
            dispatch_attempts = dispatch_attempts.wrapping_add(1);
            if dispatch_attempts % Self::MAINTENANCE_INTERVAL == 0 {
                self.task_queue.maintain();
            }

            if self.try_execute_task() {
                idle_spins = 0;
            } else if idle_spins < Self::IDLE_SPIN_LIMIT {
                idle_spins += 1;
                std::hint::spin_loop();
            } else {
                thread::sleep(Self::IDLE_SLEEP);
            }
        }

        tracing::trace!(thread = thread_id.as_u64(), "worker leaving dispatch loop");
        let mut threads = self.executing_threads.lock();
        let position = threads
            .iter()
            .position(|id| *id == thread_id)
            .expect("worker thread missing from the registry");
        threads.remove(position);
        if threads.is_empty() {
            self.is_running.store(false, Ordering::Release);
        }
    }

    /// Ask every worker to exit after its current dispatch attempt.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    /// Spawn a named worker thread running [`run`](Self::run).
    pub fn spawn_worker(self: &Arc<Self>) -> io::Result<thread::JoinHandle<()>> {
        let worker = Arc::clone(self);
        thread::Builder::new()
            .name("turbo-exec-worker".into())
            .spawn(move || worker.run())
    }

    fn try_execute_task(&self) -> bool {
        let Some(task) = self.task_queue.dequeue() else {
            return false;
        };

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!("task panicked; worker continues");
        }
        true
    }

    /// Post the self-reposting task that promotes due delayed tasks onto the
    /// ready queue. Holds only a weak reference, so it dies silently with the
    /// runner.
    fn post_delayed_task_pump(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.post_packaged_task(Box::new(move || {
            if let Some(runner) = weak.upgrade() {
                runner.pump_delayed_tasks();
            }
        }));
    }

    fn pump_delayed_tasks(self: &Arc<Self>) {
        self.delayed_tasks
            .drain_due(|task| self.post_packaged_task(task));

        // Re-posted without a delay: a delayed re-post would never fire on a
        // runner whose only pending work is this pump.
        self.post_delayed_task_pump();
    }
}

impl<const N: usize> TaskRunner for MultithreadedTaskRunner<N> {
    fn post_packaged_task(&self, task: Task) {
        self.task_queue.enqueue(task);
    }

    fn post_packaged_task_with_delay(&self, task: Task, delay: Duration) {
        self.delayed_tasks.add(task, delay);
    }

    fn is_running_on_task_runner(&self) -> bool {
        self.executing_threads.lock().contains(&ThreadId::current())
    }
}

/// Create a runner backed by `worker_threads` detached worker threads.
///
/// The workers keep running until [`MultithreadedTaskRunner::stop`] is
/// called.
pub fn create_multithreaded_task_runner<const N: usize>(
    worker_threads: usize,
) -> Result<Arc<MultithreadedTaskRunner<N>>, SpawnError> {
    if worker_threads == 0 {
        return Err(SpawnError::NoWorkerThreads);
    }

    let runner = MultithreadedTaskRunner::<N>::new();
    for n in 0..worker_threads {
        let worker = Arc::clone(&runner);
        thread::Builder::new()
            .name(format!("turbo-exec-worker-{n}"))
            .spawn(move || worker.run())?;
    }
    Ok(runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn posted_task_executes() {
        let runner = MultithreadedTaskRunner::<64>::new();
        let handle = runner.spawn_worker().unwrap();

        let (tx, rx) = mpsc::channel();
        runner.post(move || {
            tx.send(123).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 123);

        runner.stop();
        handle.join().unwrap();
    }

    #[test]
    fn tasks_dispatch_in_posting_order() {
        let runner = MultithreadedTaskRunner::<64>::new();
        let handle = runner.spawn_worker().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        for i in 0..100 {
            let log = Arc::clone(&log);
            let tx = tx.clone();
            runner.post(move || {
                log.lock().push(i);
                if i == 99 {
                    tx.send(()).unwrap();
                }
            });
        }
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        runner.stop();
        handle.join().unwrap();
        assert_eq!(*log.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = create_multithreaded_task_runner::<64>(0);
        assert!(matches!(result, Err(SpawnError::NoWorkerThreads)));
    }

    #[test]
    fn runner_drops_after_stop() {
        let runner = MultithreadedTaskRunner::<64>::new();
        let handle = runner.spawn_worker().unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = Arc::clone(&counter);
        runner.post(move || {
            task_counter.fetch_add(1, Ordering::Relaxed);
        });

        while counter.load(Ordering::Relaxed) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        runner.stop();
        handle.join().unwrap();

        // The pump holds only a weak reference, so this is the last one.
        assert_eq!(Arc::strong_count(&runner), 1);
    }
}
