use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::slot::Slot;

/// Cache-line padded wrapper
#[repr(align(64))]
struct CachePadded<T> {
    value: T,
}
impl<T> CachePadded<T> {
    const fn new(value: T) -> Self {
        CachePadded { value }
    }
}

/// Error returned by [`CircularBuffer::try_enqueue`] on a full ring, handing
/// the value back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError<T>(pub T);
impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring is full")
    }
}
impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// How long to spin before yielding while a reserved slot finishes its
/// in-flight hand-off
const SPIN_LIMIT: usize = 64;
/// How long to sleep at deep contention
const YIELD_SLEEP_NS: u64 = 50;

/// Fully lockless multi-producer, multi-consumer circular buffer.
///
/// After construction, `try_enqueue` and `dequeue` may be called from any
/// thread; neither ever touches a mutex. A producer reserves a ticket on the
/// write cursor with a CAS and then commits into the slot the ticket maps to;
/// consumers do the same on the read cursor. The only wait is the brief
/// hand-off window while a slot reserved one lap ago finishes its in-flight
/// publish or take.
///
/// If elements A and B are enqueued by one thread and dequeued by one thread,
/// A comes out before B; with a single producer and single consumer the
/// buffer behaves exactly as a plain FIFO queue. With multiple producers or
/// consumers, only per-producer order is preserved, and elements dispatched
/// to different consumers may be observed in any relative order.
pub struct CircularBuffer<T, const N: usize = 1024> {
    slots: Box<[Slot<T>; N]>,
    /// Consumer cursor: monotonic ticket counter.
    read: CachePadded<AtomicUsize>,
    /// Producer cursor: monotonic ticket counter.
    write: CachePadded<AtomicUsize>,
}

// Safety: the buffer can be shared across threads if T is Send; all slot
// hand-off is gated by the slot sequence numbers.
unsafe impl<T: Send, const N: usize> Send for CircularBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for CircularBuffer<T, N> {}

impl<T, const N: usize> CircularBuffer<T, N> {
    /// Create a new buffer. Panics if `N < 2`.
    pub fn new() -> Self {
        assert!(N >= 2, "capacity must be at least 2");

        let mut v = Vec::with_capacity(N);
        for i in 0..N {
            v.push(Slot::new(i));
        }
        let slots: Box<[Slot<T>; N]> = v
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| panic!("capacity mismatch"));

        CircularBuffer {
            slots,
            read: CachePadded::new(AtomicUsize::new(0)),
            write: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Tries to enqueue `value`, returning it inside the error when the ring
    /// is full.
    pub fn try_enqueue(&self, value: T) -> Result<(), SendError<T>> {
        loop {
            let read = self.read.value.load(Ordering::Acquire);
            let write = self.write.value.load(Ordering::Relaxed);
            if write.wrapping_sub(read) >= N {
                return Err(SendError(value));
            }

            // Reserve the ticket by swinging the write cursor forward.
            if self
                .write
                .value
                .compare_exchange_weak(
                    write,
                    write.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let ticket = write;
                let slot = &self.slots[ticket % N];

                // Wait out the hand-off window: the consumer that owned this
                // slot one lap ago may still be mid-take.
                let mut spin = 0usize;
                while !slot.is_writable(ticket) {
                    spin = backoff(spin);
                }

                // Safety: the cursor CAS reserved `ticket` exclusively.
                unsafe { slot.publish(ticket, value) };
                return Ok(());
            }
            core::hint::spin_loop();
        }
    }

    /// Retrieves the next available element, if one exists.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            let write = self.write.value.load(Ordering::Acquire);
            let read = self.read.value.load(Ordering::Relaxed);
            if write == read {
                return None;
            }

            if self
                .read
                .value
                .compare_exchange_weak(
                    read,
                    read.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let ticket = read;
                let slot = &self.slots[ticket % N];

                // The producer that reserved this ticket's slot may still be
                // mid-publish.
                let mut spin = 0usize;
                while !slot.is_readable(ticket) {
                    spin = backoff(spin);
                }

                // Safety: the cursor CAS reserved `ticket` exclusively.
                return Some(unsafe { slot.take(ticket, N) });
            }
            core::hint::spin_loop();
        }
    }

    /// Capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Approximate element count (racy)
    pub fn len(&self) -> usize {
        let read = self.read.value.load(Ordering::Relaxed);
        let write = self.write.value.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    /// is_empty (racy)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const N: usize> Default for CircularBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for CircularBuffer<T, N> {
    fn drop(&mut self) {
        // Exclusive access: drop any committed values between the cursors.
        let read = self.read.value.load(Ordering::Relaxed);
        let write = self.write.value.load(Ordering::Relaxed);

        let mut ticket = read;
        while ticket != write {
            unsafe { self.slots[ticket % N].drop_payload() };
            ticket = ticket.wrapping_add(1);
        }
    }
}

/// Simple adaptive backoff: spin-loop a bit, then yield, then nanosleep.
#[inline(always)]
fn backoff(mut spin: usize) -> usize {
    if spin < SPIN_LIMIT {
        spin += 1;
        core::hint::spin_loop();
    } else if spin < SPIN_LIMIT * 8 {
        spin += 1;
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_nanos(YIELD_SLEEP_NS));
    }
    spin
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn smoke() {
        let buffer = CircularBuffer::<i32, 8>::new();
        buffer.try_enqueue(42).unwrap();
        assert_eq!(buffer.dequeue(), Some(42));
    }

    #[test]
    fn fifo_order() {
        let buffer = CircularBuffer::<i32, 16>::new();
        for i in 0..10 {
            buffer.try_enqueue(i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(buffer.dequeue(), Some(i));
        }
    }

    #[test]
    fn full_buffer_returns_value() {
        let buffer = CircularBuffer::<i32, 4>::new();
        for i in 0..4 {
            assert!(buffer.try_enqueue(i).is_ok());
        }
        assert_eq!(buffer.try_enqueue(99), Err(SendError(99)));
    }

    #[test]
    fn empty_buffer() {
        let buffer = CircularBuffer::<i32, 4>::new();
        assert_eq!(buffer.dequeue(), None);
    }

    #[test]
    fn non_power_of_two_capacity() {
        let buffer = CircularBuffer::<usize, 6>::new();
        for round in 0..5 {
            for i in 0..6 {
                buffer.try_enqueue(round * 10 + i).unwrap();
            }
            assert!(buffer.try_enqueue(999).is_err());
            for i in 0..6 {
                assert_eq!(buffer.dequeue(), Some(round * 10 + i));
            }
        }
    }

    #[test]
    fn len_and_empty() {
        let buffer = CircularBuffer::<i32, 8>::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);

        buffer.try_enqueue(1).unwrap();
        buffer.try_enqueue(2).unwrap();
        assert!(!buffer.is_empty());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn spsc_threaded() {
        let buffer = Arc::new(CircularBuffer::<usize, 128>::new());
        let producer_buffer = buffer.clone();
        let consumer_buffer = buffer.clone();

        let producer = thread::spawn(move || {
            for i in 0..1000 {
                let mut value = i;
                loop {
                    match producer_buffer.try_enqueue(value) {
                        Ok(()) => break,
                        Err(SendError(rejected)) => {
                            value = rejected;
                            std::hint::spin_loop();
                        }
                    }
                }
            }
        });

        let consumer = thread::spawn(move || {
            for i in 0..1000 {
                loop {
                    if let Some(value) = consumer_buffer.dequeue() {
                        assert_eq!(value, i);
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 2")]
    fn capacity_below_minimum_panics() {
        let _buffer = CircularBuffer::<i32, 1>::new();
    }
}
