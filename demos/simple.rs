//! Simple usage example: one worker, immediate and delayed tasks.

use std::time::Duration;

use turbo_exec::{create_single_threaded_task_runner, ScopedTimer, TaskRunnerExt};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let runner = create_single_threaded_task_runner::<1024>();
    let worker = runner.spawn_worker().expect("failed to spawn worker");

    let _timer = ScopedTimer::new("simple demo");

    for i in 0..5 {
        runner.post(move || {
            println!("task {} running on the worker", i);
        });
    }

    runner.post_with_delay(
        || println!("this one was held back 50 ms"),
        Duration::from_millis(50),
    );

    // Give the delayed task time to fire, then wind the worker down.
    std::thread::sleep(Duration::from_millis(200));
    runner.stop();
    worker.join().unwrap();

    println!("done!");
}
