use std::time::{Duration, Instant};

/// Logs the wall time spent in a scope when dropped.
///
/// ```
/// # use turbo_exec::ScopedTimer;
/// let _timer = ScopedTimer::new("drain backlog");
/// // ... scope body ...
/// ```
pub struct ScopedTimer {
    label: &'static str,
    started_at: Instant,
}

impl ScopedTimer {
    /// Start timing the enclosing scope.
    pub fn new(label: &'static str) -> Self {
        ScopedTimer {
            label,
            started_at: Instant::now(),
        }
    }

    /// Time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        tracing::debug!(
            label = self.label,
            elapsed_us = self.elapsed().as_micros() as u64,
            "scope finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn elapsed_moves_forward() {
        let timer = ScopedTimer::new("test scope");
        thread::sleep(Duration::from_millis(2));
        assert!(timer.elapsed() >= Duration::from_millis(2));
    }
}
