//! Task pool example: a multithreaded runner chewing through a batch of jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use turbo_exec::{create_multithreaded_task_runner, TaskRunnerExt};

const NUM_WORKERS: usize = 4;
const NUM_JOBS: usize = 20;

fn main() {
    tracing_subscriber::fmt().init();

    let runner = create_multithreaded_task_runner::<128>(NUM_WORKERS).expect("failed to start pool");
    let completed = Arc::new(AtomicUsize::new(0));

    for job in 0..NUM_JOBS {
        let completed = Arc::clone(&completed);
        runner.post(move || {
            // Pretend to do something expensive.
            thread::sleep(Duration::from_millis(20));
            println!("job {:02} done", job);
            completed.fetch_add(1, Ordering::Relaxed);
        });
    }

    // A delayed progress report lands while the pool is still busy.
    let progress = Arc::clone(&completed);
    runner.post_with_delay(
        move || {
            println!(
                "progress check: {}/{} jobs finished",
                progress.load(Ordering::Relaxed),
                NUM_JOBS
            );
        },
        Duration::from_millis(60),
    );

    while completed.load(Ordering::Relaxed) < NUM_JOBS {
        thread::sleep(Duration::from_millis(5));
    }
    runner.stop();

    println!("all {} jobs completed on {} workers", NUM_JOBS, NUM_WORKERS);
}
