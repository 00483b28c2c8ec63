//! Lock-free bounded MPMC ring buffer.
//!
//! Backs the per-priority lanes of [`WorkPool`](crate::WorkPool).
//!
//! ## Design
//!
//! - Circular buffer with power-of-2 capacity
//! - Every slot carries a sequence stamp; a producer may write a slot only
//!   when `seq == tail`, a consumer may read it only when `seq == head + 1`
//! - Head and tail are claimed with CAS, then the slot stamp publishes the
//!   value (Release on write, Acquire on read)
//! - Cache-line padding on head/tail to prevent false sharing
//!
//! The stamp is what keeps a consumer from reading a slot whose producer has
//! claimed it but not finished writing.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pad to cache line to prevent false sharing
#[repr(align(64))]
struct CachePadded<T>(T);

struct Slot<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct MpmcRing<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    /// Consumer position
    head: CachePadded<AtomicUsize>,
    /// Producer position
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: values move between threads only through slots whose ownership is
// handed off by the sequence stamp protocol.
unsafe impl<T: Send> Send for MpmcRing<T> {}
unsafe impl<T: Send> Sync for MpmcRing<T> {}

impl<T> MpmcRing<T> {
    /// Create a new ring buffer. Capacity is rounded up to the next power of 2
    /// (minimum 2).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let buffer = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer,
            mask: capacity - 1,
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Push without blocking. Hands the value back if the ring is full.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut tail = self.tail.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[tail & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - tail as isize;

            if diff == 0 {
                match self.tail.0.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave us exclusive write access to this slot
                        // until we bump its stamp.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.seq.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(observed) => tail = observed,
                }
            } else if diff < 0 {
                return Err(value); // Full
            } else {
                tail = self.tail.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Pop without blocking. `None` if the ring is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.head.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[head & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - head.wrapping_add(1) as isize;

            if diff == 0 {
                match self.head.0.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the stamp says a producer finished writing this
                        // slot and the CAS made us its only reader.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq
                            .store(head.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(value);
                    }
                    Err(observed) => head = observed,
                }
            } else if diff < 0 {
                return None; // Empty
            } else {
                head = self.head.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Blocking push (spins until space available)
    pub fn push(&self, mut value: T) {
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(v) => {
                    value = v;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Approximate number of items in queue (may be stale)
    pub fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Relaxed);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for MpmcRing<T> {
    fn drop(&mut self) {
        // Drain remaining items to call their destructors
        while self.try_pop().is_some() {}
    }
}
