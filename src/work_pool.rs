//! Work pool: a fixed set of worker threads behind lock-free priority lanes.
//!
//! `WorkPool` is the task-queue collaborator; `ThreadPoolExecutor` puts the
//! keep-alive protocol in front of it and owns the shutdown order.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  ThreadPoolExecutor                              │
//! │    KeepAliveExecutor<WorkPool>                   │
//! │      add(work, priority)                         │
//! │        ↓                                         │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │ lane[n-1] (highest)  ring + overflow       │  │
//! │  │ ...                                        │  │
//! │  │ lane[0]   (lowest)   ring + overflow       │  │
//! │  └────────────────────────────────────────────┘  │
//! │       │        │        │        │               │
//! │       ▼        ▼        ▼        ▼               │
//! │  ┌───────┐┌───────┐┌───────┐┌───────┐            │
//! │  │Work 0 ││Work 1 ││Work 2 ││Work 3 │            │
//! │  └───────┘└───────┘└───────┘└───────┘            │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Shutdown order
//!
//! 1. `join_keep_alive()`: wait for every keep-alive (including ones held by
//!    queued tasks) to be released. Workers keep running meanwhile.
//! 2. `WorkPool::shutdown()`: stop workers, join them, run anything left.
//!
//! Lanes never block a producer. When the ring is full, work spills into a
//! mutex-guarded overflow list that workers drain after the ring, so a task
//! can fan out onto its own pool without waiting for a free worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{WorkPoolConfig, CONFIG};
use crate::error::ExecutorError;
use crate::executor::{run_guarded, Executor, Priority, Work};
use crate::keep_alive::KeepAlive;
use crate::keep_alive_executor::{KeepAliveCore, KeepAliveExecutor};
use crate::lifecycle::ExecutorState;
use crate::mpmc_ring::MpmcRing;
use crate::queue::TaskQueue;
use crate::weak_ref::WeakExecutorRef;

/// Map a priority onto `num_lanes` lanes. Higher lane index runs first.
fn lane_index(priority: Priority, num_lanes: usize) -> usize {
    let mid = (num_lanes / 2) as i32;
    (mid + i32::from(priority)).clamp(0, num_lanes as i32 - 1) as usize
}

/// One priority level: a lock-free ring, plus an unbounded overflow list
/// used once the ring is full.
struct Lane {
    ring: MpmcRing<Work>,
    overflow: Mutex<VecDeque<Work>>,
    overflow_len: AtomicUsize,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Self {
            ring: MpmcRing::new(capacity),
            overflow: Mutex::new(VecDeque::new()),
            overflow_len: AtomicUsize::new(0),
        }
    }

    fn push(&self, work: Work) {
        // Skip the ring while overflow is non-empty to keep the lane FIFO.
        let work = if self.overflow_len.load(Ordering::Acquire) == 0 {
            match self.ring.try_push(work) {
                Ok(()) => return,
                Err(work) => work,
            }
        } else {
            work
        };
        let mut overflow = self.overflow.lock().unwrap_or_else(PoisonError::into_inner);
        overflow.push_back(work);
        self.overflow_len.store(overflow.len(), Ordering::Release);
    }

    fn pop(&self) -> Option<Work> {
        if let Some(work) = self.ring.try_pop() {
            return Some(work);
        }
        if self.overflow_len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut overflow = self.overflow.lock().unwrap_or_else(PoisonError::into_inner);
        let work = overflow.pop_front();
        self.overflow_len.store(overflow.len(), Ordering::Release);
        work
    }

    fn len(&self) -> usize {
        self.ring.len() + self.overflow_len.load(Ordering::Acquire)
    }
}

struct PoolShared {
    lanes: Vec<Lane>,
    shutdown: AtomicBool,
    /// `enqueue` calls past the shutdown check and not yet pushed.
    enqueuing: AtomicUsize,
    spin_attempts: u32,
    idle_sleep: Duration,
}

impl PoolShared {
    fn pop(&self) -> Option<Work> {
        self.lanes.iter().rev().find_map(Lane::pop)
    }
}

/// Fixed-size pool of worker threads.
pub struct WorkPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_workers: usize,
}

impl WorkPool {
    pub fn new(config: &WorkPoolConfig) -> Result<Self, ExecutorError> {
        config.validate()?;

        let lanes = (0..config.num_priorities)
            .map(|_| Lane::new(config.queue_capacity))
            .collect();
        let shared = Arc::new(PoolShared {
            lanes,
            shutdown: AtomicBool::new(false),
            enqueuing: AtomicUsize::new(0),
            spin_attempts: config.spin_attempts,
            idle_sleep: Duration::from_micros(config.idle_sleep_us),
        });

        // Built up incrementally: if a spawn fails, dropping `pool` stops the
        // workers that did start.
        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(config.num_workers)),
            num_workers: config.num_workers,
        };

        for worker_id in 0..config.num_workers {
            let name = match &config.thread_name_prefix {
                Some(prefix) => format!("{}-{}", prefix, worker_id),
                None => format!("worker-{}", worker_id),
            };
            let mut builder = thread::Builder::new();
            if config.thread_name_prefix.is_some() {
                builder = builder.name(name.clone());
            }

            let shared = Arc::clone(&pool.shared);
            let context = name.clone();
            let handle = builder
                .spawn(move || Self::worker_loop(&context, &shared))
                .map_err(|source| ExecutorError::Spawn { name, source })?;
            pool.workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }

        info!(
            "work pool started: {} workers, {} priority lanes",
            config.num_workers, config.num_priorities
        );
        Ok(pool)
    }

    /// Worker thread loop: highest lane first, spin then sleep when idle.
    fn worker_loop(name: &str, shared: &PoolShared) {
        let mut idle_polls = 0u32;
        loop {
            if let Some(work) = shared.pop() {
                run_guarded(work, name);
                idle_polls = 0;
                continue;
            }

            if shared.shutdown.load(Ordering::Acquire) {
                debug!("{name}: exiting");
                return;
            }

            if idle_polls < shared.spin_attempts {
                idle_polls += 1;
                std::hint::spin_loop();
            } else if idle_polls == shared.spin_attempts {
                idle_polls += 1;
                thread::yield_now();
            } else {
                thread::sleep(shared.idle_sleep);
            }
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Approximate number of queued tasks across all lanes.
    pub fn pending(&self) -> usize {
        self.shared.lanes.iter().map(Lane::len).sum()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stop the workers and run whatever is still queued. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let handles =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let current = thread::current().id();
        for handle in handles {
            // A worker cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("{name}: worker thread panicked");
            }
        }

        // Producers that passed the shutdown check before it flipped.
        while self.shared.enqueuing.load(Ordering::SeqCst) > 0 {
            thread::yield_now();
        }

        // Anything enqueued after the workers looked for the last time.
        while let Some(work) = self.shared.pop() {
            run_guarded(work, "work-pool shutdown");
        }
        info!("work pool stopped");
    }
}

impl TaskQueue for WorkPool {
    fn enqueue(&self, work: Work, priority: Priority) {
        // Pairs with `shutdown`: either we see the flag, or shutdown waits
        // for this push before its final drain.
        self.shared.enqueuing.fetch_add(1, Ordering::SeqCst);
        if self.shared.shutdown.load(Ordering::SeqCst) {
            self.shared.enqueuing.fetch_sub(1, Ordering::SeqCst);
            warn!("work pool is shut down, dropping task");
            return;
        }
        let lane = lane_index(priority, self.shared.lanes.len());
        self.shared.lanes[lane].push(work);
        self.shared.enqueuing.fetch_sub(1, Ordering::SeqCst);
    }

    fn num_priorities(&self) -> u8 {
        self.shared.lanes.len() as u8
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A keep-alive executor backed by a [`WorkPool`].
///
/// Dropping it joins all outstanding keep-alives, then stops the workers.
pub struct ThreadPoolExecutor {
    executor: KeepAliveExecutor<WorkPool>,
}

impl ThreadPoolExecutor {
    pub fn new(name: impl Into<String>, config: &WorkPoolConfig) -> Result<Self, ExecutorError> {
        let pool = WorkPool::new(config)?;
        Ok(Self {
            executor: KeepAliveExecutor::new(name, pool),
        })
    }

    /// Build from the global [`CONFIG`].
    pub fn from_config(name: impl Into<String>) -> Result<Self, ExecutorError> {
        Self::new(name, &CONFIG.pool)
    }

    pub fn keep_alive(&self) -> KeepAlive<KeepAliveCore<WorkPool>> {
        self.executor.keep_alive()
    }

    pub fn weak_ref(&self) -> KeepAlive<WeakExecutorRef<WorkPool>> {
        self.executor.weak_ref()
    }

    /// Wait for every keep-alive to be released, then stop the workers.
    /// Idempotent; also run by `Drop`.
    pub fn join(&mut self) {
        if !self.executor.is_joined() {
            self.executor.join_keep_alive();
        }
        self.executor.queue().shutdown();
    }

    pub fn state(&self) -> ExecutorState {
        self.executor.state()
    }

    pub fn keep_alive_count(&self) -> isize {
        self.executor.keep_alive_count()
    }

    pub fn num_workers(&self) -> usize {
        self.executor.queue().num_workers()
    }

    pub fn name(&self) -> &str {
        self.executor.name()
    }
}

impl Executor for ThreadPoolExecutor {
    fn add(&self, work: Work) {
        self.executor.add(work);
    }

    fn add_with_priority(&self, work: Work, priority: Priority) {
        self.executor.add_with_priority(work, priority);
    }

    fn num_priorities(&self) -> u8 {
        self.executor.num_priorities()
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.join();
    }
}
