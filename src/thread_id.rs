use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of the current thread.
///
/// Not `std::thread::ThreadId`: the single-consumer runner stores the owning
/// thread in a bare atomic, and std's id cannot live in one. Id 0 is reserved
/// to mean "no thread".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ThreadId(u64);

impl ThreadId {
    pub(crate) const NONE: u64 = 0;

    pub(crate) fn current() -> Self {
        CURRENT_THREAD_ID.with(|id| *id)
    }

    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ThreadId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn as_u64(self) -> u64 {
        self.0
    }
}

thread_local! {
    static CURRENT_THREAD_ID: ThreadId = ThreadId::next();
}
