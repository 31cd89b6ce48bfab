use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::runner::{MultithreadedTaskRunner, Task, TaskRunner};
use crate::thread_id::ThreadId;

/// A task runner for a single consumer thread and multiple producer threads.
///
/// Same dispatch machinery as [`MultithreadedTaskRunner`], narrowed to one
/// worker: the owning thread is recorded in a single atomic slot, so
/// [`is_running_on_task_runner`](TaskRunner::is_running_on_task_runner) is a
/// plain load instead of a mutex-guarded set lookup.
pub struct SingleThreadedTaskRunner<const N: usize = 1024> {
    inner: Arc<MultithreadedTaskRunner<N>>,

    /// Identity of the thread driving [`run`](Self::run); `ThreadId::NONE`
    /// until the first worker arrives. Never cleared: a stopped runner stays
    /// bound to its thread.
    running_thread: AtomicU64,
}

impl<const N: usize> SingleThreadedTaskRunner<N> {
    /// Create a runner with no worker attached; drive it with
    /// [`run`](Self::run) or [`spawn_worker`](Self::spawn_worker).
    pub fn new() -> Arc<Self> {
        Arc::new(SingleThreadedTaskRunner {
            inner: MultithreadedTaskRunner::new(),
            running_thread: AtomicU64::new(ThreadId::NONE),
        })
    }

    /// Worker entry point; dispatches tasks until [`stop`](Self::stop).
    ///
    /// # Panics
    ///
    /// Panics if any thread (including the calling one) has already driven
    /// this runner.
    pub fn run(&self) {
        let thread_id = ThreadId::current();
        let claimed = self.running_thread.compare_exchange(
            ThreadId::NONE,
            thread_id.as_u64(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert!(
            claimed.is_ok(),
            "single-threaded task runner is already bound to a thread"
        );

        self.inner.run();
    }

    /// Ask the worker to exit after its current dispatch attempt.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Spawn the worker thread running [`run`](Self::run).
    pub fn spawn_worker(self: &Arc<Self>) -> io::Result<thread::JoinHandle<()>> {
        let worker = Arc::clone(self);
        thread::Builder::new()
            .name("turbo-exec-worker".into())
            .spawn(move || worker.run())
    }
}

impl<const N: usize> TaskRunner for SingleThreadedTaskRunner<N> {
    fn post_packaged_task(&self, task: Task) {
        self.inner.post_packaged_task(task);
    }

    fn post_packaged_task_with_delay(&self, task: Task, delay: Duration) {
        self.inner.post_packaged_task_with_delay(task, delay);
    }

    fn is_running_on_task_runner(&self) -> bool {
        ThreadId::current().as_u64() == self.running_thread.load(Ordering::Relaxed)
    }
}

/// Create a single-consumer runner. No worker thread is spawned; the caller
/// drives the loop, typically via
/// [`spawn_worker`](SingleThreadedTaskRunner::spawn_worker).
pub fn create_single_threaded_task_runner<const N: usize>() -> Arc<SingleThreadedTaskRunner<N>> {
    SingleThreadedTaskRunner::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TaskRunnerExt;
    use std::sync::mpsc;

    #[test]
    fn affinity_tracks_the_single_worker() {
        let runner = create_single_threaded_task_runner::<64>();
        assert!(!runner.is_running_on_task_runner());

        let handle = runner.spawn_worker().unwrap();
        let (tx, rx) = mpsc::channel();
        let probe = Arc::clone(&runner);
        runner.post(move || {
            tx.send(probe.is_running_on_task_runner()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!runner.is_running_on_task_runner());

        runner.stop();
        handle.join().unwrap();
    }

    #[test]
    fn second_worker_thread_panics() {
        let runner = create_single_threaded_task_runner::<64>();
        let handle = runner.spawn_worker().unwrap();

        // Wait for the first worker to claim the runner.
        while runner.running_thread.load(Ordering::Relaxed) == ThreadId::NONE {
            thread::sleep(Duration::from_millis(1));
        }

        let second = runner.spawn_worker().unwrap();
        assert!(second.join().is_err());

        runner.stop();
        handle.join().unwrap();
    }
}
