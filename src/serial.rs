//! Serial executor: one-at-a-time FIFO execution on top of any parent.
//!
//! `SerialQueue` keeps its own FIFO and schedules at most one drain closure
//! on the parent at a time. Each drain runs exactly one task and, if more are
//! pending, schedules the next drain. Tasks therefore never overlap and run
//! in submission order, even on a multi-threaded parent.
//!
//! Every queued task carries a keep-alive on the serial executor itself, so
//! `join_keep_alive` returns only after the queue is empty. The queue holds a
//! keep-alive on the parent until the serial executor quiesces.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::trace;
use once_cell::sync::OnceCell;

use crate::executor::{run_guarded, Executor, KeepAliveTarget, Priority, Work};
use crate::keep_alive::KeepAlive;
use crate::keep_alive_executor::{KeepAliveCore, KeepAliveExecutor};
use crate::queue::TaskQueue;

type SerialCore<E: ?Sized> = KeepAliveCore<SerialQueue<E>>;

struct SerialTask<E: KeepAliveTarget + ?Sized + 'static> {
    work: Work,
    // Released only after `work` has run.
    hold: KeepAlive<SerialCore<E>>,
}

struct SerialState<E: KeepAliveTarget + ?Sized + 'static> {
    parent: Mutex<KeepAlive<E>>,
    /// The executor that owns this queue. Set once by `serial()`.
    owner: OnceCell<Weak<SerialCore<E>>>,
    tasks: Mutex<VecDeque<SerialTask<E>>>,
    /// Tasks enqueued but not yet finished. A drain is scheduled iff > 0.
    pending: AtomicUsize,
}

impl<E: KeepAliveTarget + ?Sized + 'static> SerialState<E> {
    fn schedule_drain(self: &Arc<Self>) {
        // Never call into the parent with the lock held: an inline parent
        // runs the drain, and the drain may schedule the next one.
        let parent = self
            .parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .copy();
        let state = Arc::clone(self);
        parent.add(Box::new(move || state.run_one()));
    }

    fn hold_owner(&self) -> KeepAlive<SerialCore<E>> {
        match self.owner.get().and_then(Weak::upgrade) {
            Some(core) => KeepAlive::try_acquire(&core),
            None => KeepAlive::empty(),
        }
    }

    fn run_one(self: Arc<Self>) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let hold = task.map(|SerialTask { work, hold }| {
            run_guarded(work, "serial");
            hold
        });
        if self.pending.fetch_sub(1, Ordering::AcqRel) > 1 {
            self.schedule_drain();
        }
        // Last: once this releases, the owner may see quiescence and drop
        // the parent handle.
        drop(hold);
    }
}

/// Task queue that serializes work onto a parent executor.
pub struct SerialQueue<E: KeepAliveTarget + ?Sized + 'static> {
    state: Arc<SerialState<E>>,
}

impl<E: KeepAliveTarget + ?Sized + 'static> SerialQueue<E> {
    fn new(parent: KeepAlive<E>) -> Self {
        Self {
            state: Arc::new(SerialState {
                parent: Mutex::new(parent),
                owner: OnceCell::new(),
                tasks: Mutex::new(VecDeque::new()),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Tasks enqueued and not yet finished.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Whether this queue still holds its keep-alive on the parent.
    pub fn holds_parent(&self) -> bool {
        !self
            .state
            .parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl<E: KeepAliveTarget + ?Sized + 'static> TaskQueue for SerialQueue<E> {
    fn enqueue(&self, work: Work, _priority: Priority) {
        // Callers hold a keep-alive on the owner, so this cannot come back empty.
        let hold = self.state.hold_owner();
        self.state
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(SerialTask { work, hold });
        if self.state.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            self.state.schedule_drain();
        }
    }

    fn on_quiesced(&self) {
        trace!("serial queue quiesced, releasing parent");
        self.state
            .parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

/// A keep-alive executor that runs its tasks one at a time, in order.
pub type SerialExecutor<E: ?Sized> = KeepAliveExecutor<SerialQueue<E>>;

impl<E: KeepAliveTarget + ?Sized + 'static> KeepAliveExecutor<SerialQueue<E>> {
    pub fn serial(name: impl Into<String>, parent: KeepAlive<E>) -> Self {
        let exec = KeepAliveExecutor::new(name, SerialQueue::new(parent));
        // Freshly created, so the cell is empty.
        let _ = exec.queue().state.owner.set(Arc::downgrade(exec.core()));
        exec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkPoolConfig;
    use crate::queue::InlineQueue;
    use crate::work_pool::ThreadPoolExecutor;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    #[test]
    fn serial_on_inline_parent_runs_in_order() {
        let mut parent = KeepAliveExecutor::new("inline", InlineQueue);
        let mut serial = SerialExecutor::serial("serial", parent.keep_alive());

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            serial.add(Box::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(serial.queue().pending(), 0);

        serial.join_keep_alive();
        drop(serial);
        parent.join_keep_alive();
    }

    #[test]
    fn serial_on_pool_is_fifo_and_never_overlaps() {
        const TASKS: usize = 200;
        let config = WorkPoolConfig {
            num_workers: 4,
            thread_name_prefix: Some("serial-parent".to_string()),
            ..WorkPoolConfig::default()
        };
        let mut pool = ThreadPoolExecutor::new("pool", &config).unwrap();
        let mut serial = SerialExecutor::serial("serial", pool.keep_alive());

        let order = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        for i in 0..TASKS {
            let order = order.clone();
            let running = running.clone();
            let overlapped = overlapped.clone();
            serial.add(Box::new(move || {
                if running.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                order.lock().unwrap().push(i);
                running.store(false, Ordering::SeqCst);
            }));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while order.lock().unwrap().len() < TASKS {
            assert!(Instant::now() < deadline, "serial tasks did not finish");
            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(!overlapped.load(Ordering::SeqCst), "serial tasks overlapped");
        assert_eq!(*order.lock().unwrap(), (0..TASKS).collect::<Vec<_>>());

        serial.join_keep_alive();
        drop(serial);
        pool.join();
    }

    #[test]
    fn serial_holds_parent_keep_alive() {
        let mut parent = KeepAliveExecutor::new("inline", InlineQueue);
        let mut serial = SerialExecutor::serial("serial", parent.keep_alive());
        assert_eq!(parent.keep_alive_count(), 2);

        serial.join_keep_alive();
        assert!(!serial.queue().holds_parent());
        assert_eq!(parent.keep_alive_count(), 1);
        drop(serial);
        parent.join_keep_alive();
    }

    fn one_worker_pool(prefix: &str) -> ThreadPoolExecutor {
        let config = WorkPoolConfig {
            num_workers: 1,
            thread_name_prefix: Some(prefix.to_string()),
            ..WorkPoolConfig::default()
        };
        ThreadPoolExecutor::new(prefix, &config).unwrap()
    }

    #[test]
    fn join_waits_for_queued_tasks() {
        let mut pool = one_worker_pool("serial-join");
        let mut serial = SerialExecutor::serial("serial", pool.keep_alive());
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            serial.add(Box::new(move || {
                std::thread::sleep(Duration::from_millis(20));
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }

        serial.join_keep_alive();
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(serial.queue().pending(), 0);
        assert_eq!(serial.state(), crate::ExecutorState::Quiesced);

        drop(serial);
        pool.join();
    }

    #[test]
    fn weak_ref_does_not_pin_parent() {
        let mut pool = one_worker_pool("serial-weak");
        let mut serial = SerialExecutor::serial("serial", pool.keep_alive());
        let weak = serial.weak_ref();
        assert_eq!(pool.keep_alive_count(), 2);

        serial.join_keep_alive();
        drop(serial);
        assert_eq!(pool.keep_alive_count(), 1);
        pool.join();

        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        weak.add(Box::new(move || r.store(true, Ordering::SeqCst)));
        assert!(!ran.load(Ordering::SeqCst));
    }
}
