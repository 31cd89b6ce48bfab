use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::ring::{CircularBuffer, SendError};

/// Fully parallelized multi-producer multi-consumer "nearly-lockless" FIFO
/// queue.
///
/// The fast path is the embedded lock-free [`CircularBuffer`]; a mutex-guarded
/// overflow list absorbs enqueues when the ring is full. For the expected use
/// case, where nowhere near `N` elements are ever queued up at the same time,
/// no mutex is ever contended. Unlike the bare ring, [`enqueue`] always
/// succeeds.
///
/// FIFO order per producer is preserved across spill and drain cycles: while
/// the overflow list is non-empty, new elements join it behind the spilled
/// ones instead of overtaking them through the ring.
///
/// [`enqueue`]: NearlyLocklessFifo::enqueue
pub struct NearlyLocklessFifo<T, const N: usize = 1024> {
    data: CircularBuffer<T, N>,

    /// Elements that did not fit in `data`, drained back into it by
    /// [`maintain`](Self::maintain).
    overflow: Mutex<VecDeque<T>>,
    /// Set while the overflow list is non-empty; cleared only by maintenance
    /// once the list has been fully drained.
    overflow_in_use: AtomicBool,
    /// Single-holder latch guarding the maintenance protocol.
    overflow_flushing: AtomicBool,

    /// Monotonic producer counter, used to schedule opportunistic
    /// maintenance from the enqueue path.
    enqueue_counter: AtomicUsize,
}

impl<T, const N: usize> NearlyLocklessFifo<T, N> {
    /// Trigger maintenance from a producer every this many enqueue attempts.
    const CHECK_INTERVAL: usize = if N / 16 == 0 { 1 } else { N / 16 };

    /// Create an empty queue. Panics if `N < 2`.
    pub fn new() -> Self {
        NearlyLocklessFifo {
            data: CircularBuffer::new(),
            overflow: Mutex::new(VecDeque::new()),
            overflow_in_use: AtomicBool::new(false),
            overflow_flushing: AtomicBool::new(false),
            enqueue_counter: AtomicUsize::new(0),
        }
    }

    /// Enqueue `value`. Never fails; when the ring is full the value spills
    /// to the overflow list.
    ///
    /// The ring is only used while the overflow list is empty; otherwise a
    /// new element could overtake an older one from the same producer that is
    /// still waiting in overflow.
    pub fn enqueue(&self, value: T) {
        let mut value = value;

        if !self.overflow_in_use.load(Ordering::Acquire) {
            match self.data.try_enqueue(value) {
                Ok(()) => return,
                Err(SendError(rejected)) => value = rejected,
            }
        }

        let attempts = self.enqueue_counter.fetch_add(1, Ordering::Relaxed);
        if attempts % Self::CHECK_INTERVAL == 0 {
            self.maintain();
            // Only worth retrying the ring if maintenance fully drained the
            // overflow; a partial drain means older elements are still queued
            // behind the ring.
            if !self.overflow_in_use.load(Ordering::Acquire) {
                match self.data.try_enqueue(value) {
                    Ok(()) => return,
                    Err(SendError(rejected)) => value = rejected,
                }
            }
        }

        let mut overflow = self.overflow.lock();
        overflow.push_back(value);
        self.overflow_in_use.store(true, Ordering::Release);
        let queued = overflow.len();
        drop(overflow);
        tracing::trace!(queued, "ring full, element spilled to overflow");
    }

    /// Retrieves the next available element, if one exists.
    ///
    /// Non-blocking; opportunistically drains the overflow list into the ring
    /// when the ring comes up empty.
    pub fn dequeue(&self) -> Option<T> {
        let result = self.data.dequeue();
        if result.is_some() {
            return result;
        }

        if self.needs_maintenance() {
            self.maintain();
            return self.data.dequeue();
        }

        None
    }

    /// Returns true iff both the ring and the overflow list are empty.
    pub fn is_empty(&self) -> bool {
        if !self.data.is_empty() {
            return false;
        }
        self.overflow.lock().is_empty()
    }

    fn needs_maintenance(&self) -> bool {
        self.overflow_in_use.load(Ordering::Relaxed)
            && !self.overflow_flushing.load(Ordering::Relaxed)
    }

    /// Drains the overflow list into the ring, preserving order. At most one
    /// maintainer runs at a time; everyone else returns immediately.
    ///
    /// All ring pushes happen outside the mutex: the overflow list is swapped
    /// into a local queue, drained as far as the ring allows, and whatever
    /// remains is swapped back in front of any elements that arrived in the
    /// meantime.
    pub(crate) fn maintain(&self) -> bool {
        if !self.needs_maintenance() {
            return false;
        }

        if self.overflow_flushing.swap(true, Ordering::Acquire) {
            return false;
        }

        if !self.overflow_in_use.load(Ordering::Relaxed) {
            // Someone drained it between the check and the latch.
            self.overflow_flushing.store(false, Ordering::Release);
            return false;
        }

        let mut local = {
            let mut overflow = self.overflow.lock();
            mem::take(&mut *overflow)
        };

        let mut drained = 0usize;
        while let Some(value) = local.pop_front() {
            if let Err(SendError(rejected)) = self.data.try_enqueue(value) {
                local.push_front(rejected);
                break;
            }
            drained += 1;
        }

        // Handle elements that arrived in overflow since the swap: keep
        // draining only if the local queue went fully into the ring, then
        // park the rest behind whatever could not be drained.
        let mut overflow = self.overflow.lock();
        if local.is_empty() {
            while let Some(value) = overflow.pop_front() {
                if let Err(SendError(rejected)) = self.data.try_enqueue(value) {
                    overflow.push_front(rejected);
                    break;
                }
                drained += 1;
            }
        }

        local.append(&mut overflow);
        mem::swap(&mut *overflow, &mut local);

        if overflow.is_empty() {
            self.overflow_in_use.store(false, Ordering::Release);
        }
        let left_over = overflow.len();
        drop(overflow);

        self.overflow_flushing.store(false, Ordering::Release);
        tracing::trace!(drained, left_over, "overflow maintenance pass");
        true
    }
}

impl<T, const N: usize> Default for NearlyLocklessFifo<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
