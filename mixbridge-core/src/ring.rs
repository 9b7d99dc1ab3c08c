//! Lock-free single-producer single-consumer byte ring buffer.
//!
//! Provides the realtime-safe channel between the USB completion
//! callbacks and the host audio thread (spec §3/§4.A/§5): one producer
//! thread, one consumer thread, no blocking, no allocation after
//! construction. Unlike an item-typed SPSC channel, callers move whole
//! frames' worth of bytes per call, so the ring is addressed in bytes
//! and reports "bytes available to read" / "bytes free to write"
//! rather than element counts.

use std::cell::UnsafeCell;

#[cfg(not(loom))]
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

#[cfg(loom)]
use loom::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Cache-line padded wrapper to prevent false sharing between the
/// producer's head index and the consumer's tail index.
#[repr(align(64))]
struct CachePadded<T>(T);

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

struct RingInner {
    buffer: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    mask: usize,
    head: CachePadded<AtomicUsize>, // write position (producer)
    tail: CachePadded<AtomicUsize>, // read position (consumer)
}

// SAFETY: access to `buffer` is partitioned by the head/tail atomics —
// the producer only ever writes `[tail, tail+free)` and the consumer
// only ever reads `[tail, head)`, so concurrent access never aliases.
unsafe impl Send for RingInner {}
unsafe impl Sync for RingInner {}

impl RingInner {
    fn new(capacity_bytes: usize) -> Self {
        let capacity = capacity_bytes.next_power_of_two().max(1);
        let mask = capacity - 1;
        let buffer: Vec<UnsafeCell<u8>> = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
        Self {
            buffer: buffer.into_boxed_slice(),
            capacity,
            mask,
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
        }
    }
}

/// Factory for creating producer/consumer pairs over a shared byte ring.
pub struct ByteRing;

impl ByteRing {
    /// Creates a new byte ring able to hold at least `capacity_bytes`
    /// bytes. The actual capacity is rounded up to the next power of
    /// two (per spec §4.A: "Rings may allocate capacity rounded up to
    /// the next power of two").
    pub fn new(capacity_bytes: usize) -> (RingProducer, RingConsumer) {
        let inner = Arc::new(RingInner::new(capacity_bytes));
        (
            RingProducer {
                inner: Arc::clone(&inner),
            },
            RingConsumer { inner },
        )
    }
}

/// Producer handle. Only the designated producer thread may use this.
pub struct RingProducer {
    inner: Arc<RingInner>,
}

// SAFETY: the producer's operations only touch the head index (Release)
// and read the tail index (Acquire); it never touches consumer-owned state.
unsafe impl Send for RingProducer {}

impl RingProducer {
    /// Bytes currently free to write without overwriting unread data.
    #[inline]
    pub fn write_space(&self) -> usize {
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Acquire);
        self.inner.capacity - head.wrapping_sub(tail)
    }

    /// Writes as many bytes from `data` as fit and returns the count
    /// actually written. Never blocks; never writes a partial byte.
    #[inline]
    pub fn write(&mut self, data: &[u8]) -> usize {
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Acquire);
        let free = self.inner.capacity - head.wrapping_sub(tail);
        let n = data.len().min(free);

        for (i, &byte) in data.iter().take(n).enumerate() {
            let index = (head.wrapping_add(i)) & self.inner.mask;
            // SAFETY: index lies within [head, head+free) which the
            // consumer never touches until head is published below.
            unsafe {
                *self.inner.buffer[index].get() = byte;
            }
        }

        self.inner.head.store(head.wrapping_add(n), Ordering::Release);
        n
    }

    /// Capacity of the underlying storage in bytes (rounded up to a
    /// power of two; may exceed the requested capacity).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Bytes currently occupied (unread), as seen from the producer
    /// side. Equivalent to the consumer's `read_space()`, exposed here
    /// so a producer-only owner can track occupancy without holding a
    /// consumer handle.
    #[inline]
    pub fn occupied(&self) -> usize {
        self.inner.capacity - self.write_space()
    }
}

/// Consumer handle. Only the designated consumer thread may use this.
pub struct RingConsumer {
    inner: Arc<RingInner>,
}

// SAFETY: the consumer's operations only touch the tail index (Release)
// and read the head index (Acquire); it never touches producer-owned state.
unsafe impl Send for RingConsumer {}

impl RingConsumer {
    /// Bytes currently available to read.
    #[inline]
    pub fn read_space(&self) -> usize {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let head = self.inner.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Reads up to `out.len()` bytes into `out` and returns the count
    /// actually read. Never blocks.
    #[inline]
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let head = self.inner.head.load(Ordering::Acquire);
        let available = head.wrapping_sub(tail);
        let n = out.len().min(available);

        for (i, slot) in out.iter_mut().take(n).enumerate() {
            let index = (tail.wrapping_add(i)) & self.inner.mask;
            // SAFETY: index lies within [tail, tail+available) which
            // the producer never overwrites until tail is published.
            unsafe {
                *slot = *self.inner.buffer[index].get();
            }
        }

        self.inner.tail.store(tail.wrapping_add(n), Ordering::Release);
        n
    }

    /// Capacity of the underlying storage in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_basic_write_read() {
        let (mut p, mut c) = ByteRing::new(16);
        assert_eq!(p.write(&[1, 2, 3, 4]), 4);
        let mut out = [0u8; 4];
        assert_eq!(c.read(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_read() {
        let (_p, mut c) = ByteRing::new(16);
        let mut out = [0u8; 4];
        assert_eq!(c.read(&mut out), 0);
    }

    #[test]
    fn test_short_write_when_full() {
        let (mut p, _c) = ByteRing::new(4);
        assert_eq!(p.write(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(p.write_space(), 0);
    }

    #[test]
    fn test_capacity_rounding() {
        let (p, _c) = ByteRing::new(3);
        assert_eq!(p.capacity(), 4);
        let (p, _c) = ByteRing::new(5);
        assert_eq!(p.capacity(), 8);
        let (p, _c) = ByteRing::new(0);
        assert_eq!(p.capacity(), 1);
    }

    #[test]
    fn test_wraparound() {
        let (mut p, mut c) = ByteRing::new(4);
        for round in 0..10u8 {
            let data = [round, round.wrapping_add(1), round.wrapping_add(2), round.wrapping_add(3)];
            assert_eq!(p.write(&data), 4);
            let mut out = [0u8; 4];
            assert_eq!(c.read(&mut out), 4);
            assert_eq!(out, data);
        }
    }

    #[test]
    fn test_partial_drain_then_fill() {
        let (mut p, mut c) = ByteRing::new(8);
        assert_eq!(p.write(&[1, 2, 3, 4, 5]), 5);
        let mut out = [0u8; 3];
        assert_eq!(c.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(c.read_space(), 2);
        assert_eq!(p.write_space(), 6);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let (mut p, mut c) = ByteRing::new(1024);
        let total_bytes = 100_000usize;

        let producer = thread::spawn(move || {
            let mut written = 0usize;
            let mut next = 0u8;
            while written < total_bytes {
                let chunk = [next; 7];
                let n = p.write(&chunk);
                written += n;
                next = next.wrapping_add(1);
                if n == 0 {
                    thread::yield_now();
                }
            }
        });

        let consumer = thread::spawn(move || {
            let mut received = 0usize;
            let mut buf = [0u8; 11];
            while received < total_bytes {
                let n = c.read(&mut buf);
                received += n;
                if n == 0 {
                    thread::yield_now();
                }
            }
            received
        });

        producer.join().unwrap();
        assert_eq!(consumer.join().unwrap(), total_bytes);
    }
}

#[cfg(loom)]
mod loom_tests {
    use loom::thread;

    use super::*;

    #[test]
    fn loom_concurrent_write_read() {
        loom::model(|| {
            let (mut p, mut c) = ByteRing::new(4);

            let producer = thread::spawn(move || {
                let _ = p.write(&[1, 2]);
            });

            let consumer = thread::spawn(move || {
                let mut out = [0u8; 2];
                c.read(&mut out)
            });

            producer.join().unwrap();
            let _ = consumer.join().unwrap();
        });
    }
}
