//! The shared keep-alive counter.
//!
//! One control block is allocated per executor (and per weak reference). It
//! answers a single question from any thread without locking: "is the owner
//! still guaranteed to exist?"
//!
//! ```text
//!   new() ──► count = 1 (self-reference)
//!
//!   try_acquire:  n > 0 ? n + 1 : refuse     (hot path, lock-free)
//!   acquire:      n + 1, n must already be > 0
//!   release:      n - 1, on 1 → 0 post the baton
//!
//!   count == 0 is terminal: nothing can ever acquire again.
//! ```

use std::sync::atomic::{AtomicIsize, Ordering};

use crate::baton::Baton;

/// Atomic reference count plus the one-shot quiescence signal.
#[derive(Debug)]
pub struct KeepAliveControlBlock {
    count: AtomicIsize,
    quiesced: Baton,
}

impl KeepAliveControlBlock {
    /// A fresh block holding the owner's self-reference (count = 1).
    pub fn new() -> Self {
        Self {
            count: AtomicIsize::new(1),
            quiesced: Baton::new(),
        }
    }

    /// Increment the count unless it has already reached zero.
    ///
    /// Returning `false` is the normal "too late" outcome, not an error.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            debug_assert!(current > 0, "keep-alive count is negative ({current})");
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Increment the count on behalf of a caller that already holds a reference.
    ///
    /// Incrementing from zero means someone used a released handle.
    pub fn acquire(&self) {
        let prev = self.count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "keep-alive acquired from a count of {prev}");
    }

    /// Drop one reference. Returns `true` if this call took the count to zero.
    pub fn release(&self) -> bool {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "keep-alive released below zero (was {prev})");
        if prev == 1 {
            self.quiesced.post();
            true
        } else {
            false
        }
    }

    /// Snapshot of the current count. Stale by the time it is read.
    pub fn count(&self) -> isize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_quiesced(&self) -> bool {
        self.count.load(Ordering::Acquire) == 0
    }

    /// Block until the count has reached zero.
    pub fn wait_quiesced(&self) {
        self.quiesced.wait();
    }
}

impl Default for KeepAliveControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_with_self_reference() {
        let block = KeepAliveControlBlock::new();
        assert_eq!(block.count(), 1);
        assert!(!block.is_quiesced());
    }

    #[test]
    fn acquire_and_release_balance() {
        let block = KeepAliveControlBlock::new();
        assert!(block.try_acquire());
        block.acquire();
        assert_eq!(block.count(), 3);

        assert!(!block.release());
        assert!(!block.release());
        assert_eq!(block.count(), 1);

        assert!(block.release(), "1 -> 0 must report quiescence");
        assert!(block.is_quiesced());
    }

    #[test]
    fn zero_is_terminal() {
        let block = KeepAliveControlBlock::new();
        assert!(block.release());
        for _ in 0..100 {
            assert!(!block.try_acquire());
        }
        assert_eq!(block.count(), 0);
    }

    #[test]
    fn wait_quiesced_returns_after_last_release() {
        let block = Arc::new(KeepAliveControlBlock::new());
        assert!(block.try_acquire());

        let releaser = {
            let block = block.clone();
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(10));
                block.release();
            })
        };

        block.release();
        block.wait_quiesced();
        assert_eq!(block.count(), 0);
        releaser.join().unwrap();
    }

    #[test]
    fn only_one_release_observes_zero() {
        const THREADS: usize = 8;
        let block = Arc::new(KeepAliveControlBlock::new());
        for _ in 0..THREADS {
            assert!(block.try_acquire());
        }
        // Drop the self-reference up front; the workers race for the last one.
        assert!(!block.release());

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let block = block.clone();
                thread::spawn(move || block.release())
            })
            .collect();

        let zero_observers = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&hit_zero| hit_zero)
            .count();
        assert_eq!(zero_observers, 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "released below zero")]
    fn release_past_zero_is_fatal() {
        let block = KeepAliveControlBlock::new();
        block.release();
        block.release();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "acquired from a count of 0")]
    fn acquire_from_zero_is_fatal() {
        let block = KeepAliveControlBlock::new();
        block.release();
        block.acquire();
    }
}
