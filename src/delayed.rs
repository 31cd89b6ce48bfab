use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::runner::Task;

/// Set of tasks posted with a delay, promoted onto the ready queue by the
/// runner's self-posted drain task.
///
/// No condition variable and no timer thread: the store is polled, so it can
/// never deadlock a single-consumer runtime.
pub(crate) struct DelayedTaskStore {
    entries: Mutex<Vec<(Task, Instant)>>,
}

impl DelayedTaskStore {
    pub(crate) fn new() -> Self {
        DelayedTaskStore {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, task: Task, delay: Duration) {
        let due = Instant::now() + delay;
        self.entries.lock().push((task, due));
    }

    /// Feed every task whose due time has passed to `sink`, nearest-due
    /// first.
    ///
    /// Entries are sorted in decreasing due-time order so the nearest-due sit
    /// at the tail and promotion is a cheap pop.
    pub(crate) fn drain_due(&self, mut sink: impl FnMut(Task)) {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            return;
        }

        let now = Instant::now();
        entries.sort_by(|first, second| second.1.cmp(&first.1));

        loop {
            match entries.last() {
                Some((_, due)) if *due <= now => {
                    if let Some((task, _)) = entries.pop() {
                        sink(task);
                    }
                }
                _ => break,
            }
        }
    }
}
