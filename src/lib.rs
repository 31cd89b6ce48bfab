//! turbo_exec - nearly-lockless MPMC task queue and thread-pool task runner
//!
//! - [`CircularBuffer`] : fixed-capacity fully lockless MPMC ring
//! - [`NearlyLocklessFifo`] : ring + mutex-guarded overflow; `enqueue` always
//!   succeeds and FIFO order per producer survives spill/drain cycles
//! - [`MultithreadedTaskRunner`] / [`SingleThreadedTaskRunner`] : thread-pool
//!   executors over the FIFO, with delayed task support and panic isolation
//! - [`WeakPtrFactory`] / [`bind_weak`] : runner-affine non-owning pointers
//!   and the matching drop-if-gone task binder
//!
//! Tasks posted from one thread are dispatched in posting order; there is no
//! ordering guarantee across producers, and tasks handed to different workers
//! may execute in any order relative to each other. Workers never block on a
//! mutex in steady state; they sleep in short slices when idle.
//!
//! ```
//! use turbo_exec::{create_multithreaded_task_runner, TaskRunnerExt};
//!
//! let runner = create_multithreaded_task_runner::<1024>(2).unwrap();
//! runner.post(|| println!("on a worker"));
//! runner.post_with_delay(|| println!("a little later"), std::time::Duration::from_millis(10));
//! # std::thread::sleep(std::time::Duration::from_millis(100));
//! # runner.stop();
//! ```

#![warn(missing_docs)]

mod delayed;
mod fifo;
mod ring;
mod runner;
mod single;
mod slot;
mod thread_id;
mod timer;
mod weak;

pub use fifo::NearlyLocklessFifo;
pub use ring::{CircularBuffer, SendError};
pub use runner::{
    create_multithreaded_task_runner, MultithreadedTaskRunner, SpawnError, Task, TaskRunner,
    TaskRunnerExt,
};
pub use single::{create_single_threaded_task_runner, SingleThreadedTaskRunner};
pub use timer::ScopedTimer;
pub use weak::{bind_weak, WeakPtr, WeakPtrFactory};
