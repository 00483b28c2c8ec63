//! The owning keep-alive executor.
//!
//! `KeepAliveExecutor<Q>` decorates any [`TaskQueue`] with the keep-alive
//! protocol. The owner keeps the executor value; everything handed out
//! (keep-alives, weak references) points at the shared [`KeepAliveCore`].
//!
//! ```text
//!   owner: KeepAliveExecutor ──┐
//!                              ▼
//!   KeepAlive ──────────► Arc<KeepAliveCore { control, queue }>
//!   KeepAlive ──────────►      ▲
//!   WeakExecutorRef ───────────┘  (try_acquire on every call)
//! ```
//!
//! Shutdown is `join_keep_alive()`: release the self-reference, then park on
//! the control block until every outstanding handle is gone. Every owner must
//! join before dropping the executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, trace};

use crate::control_block::KeepAliveControlBlock;
use crate::executor::{Executor, KeepAliveTarget, Priority, Work, MID_PRI};
use crate::keep_alive::KeepAlive;
use crate::lifecycle::ExecutorState;
use crate::queue::TaskQueue;
use crate::weak_ref::WeakExecutorRef;

/// The shared half of a keep-alive executor.
///
/// Reachable only through handles, so callers never see it unless they hold
/// a reference that keeps it alive.
pub struct KeepAliveCore<Q> {
    name: String,
    queue: Q,
    control: KeepAliveControlBlock,
    self_released: AtomicBool,
}

impl<Q: TaskQueue> KeepAliveCore<Q> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_parts(
            self.self_released.load(Ordering::Acquire),
            self.control.count(),
        )
    }

    pub fn keep_alive_count(&self) -> isize {
        self.control.count()
    }
}

impl<Q: TaskQueue> Executor for KeepAliveCore<Q> {
    fn add(&self, work: Work) {
        self.queue.enqueue(work, MID_PRI);
    }

    fn add_with_priority(&self, work: Work, priority: Priority) {
        self.queue.enqueue(work, priority);
    }

    fn num_priorities(&self) -> u8 {
        self.queue.num_priorities()
    }
}

impl<Q: TaskQueue> KeepAliveTarget for KeepAliveCore<Q> {
    fn control_block(&self) -> &KeepAliveControlBlock {
        &self.control
    }
}

/// Owner of a task queue plus the keep-alive count guarding it.
pub struct KeepAliveExecutor<Q: TaskQueue + 'static> {
    core: Arc<KeepAliveCore<Q>>,
    joined: bool,
}

impl<Q: TaskQueue + 'static> KeepAliveExecutor<Q> {
    pub fn new(name: impl Into<String>, queue: Q) -> Self {
        let core = Arc::new(KeepAliveCore {
            name: name.into(),
            queue,
            control: KeepAliveControlBlock::new(),
            self_released: AtomicBool::new(false),
        });
        debug!("executor '{}' live", core.name);
        Self {
            core,
            joined: false,
        }
    }

    /// A handle that keeps this executor from quiescing.
    ///
    /// Before `join_keep_alive` this always succeeds. Afterwards it succeeds
    /// only while other handles are still outstanding.
    pub fn keep_alive(&self) -> KeepAlive<KeepAliveCore<Q>> {
        if self.joined {
            KeepAlive::try_acquire(&self.core)
        } else {
            self.core.control.acquire();
            KeepAlive::adopt(Arc::clone(&self.core))
        }
    }

    /// A reference that delivers work only while this executor can still be
    /// proven alive, and silently drops it afterwards.
    pub fn weak_ref(&self) -> KeepAlive<WeakExecutorRef<Q>> {
        // The weak ref's own count starts at 1; the returned handle adopts it.
        KeepAlive::adopt(Arc::new(WeakExecutorRef::new(Arc::clone(&self.core))))
    }

    /// Release the self-reference and block until every handle is gone.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn join_keep_alive(&mut self) {
        assert!(
            !self.joined,
            "join_keep_alive called twice on executor '{}'",
            self.core.name
        );
        self.joined = true;
        self.core.self_released.store(true, Ordering::Release);

        debug!(
            "executor '{}' draining ({} outstanding keep-alives)",
            self.core.name,
            self.core.control.count() - 1
        );
        self.core.control.release();
        self.core.control.wait_quiesced();
        self.core.queue.on_quiesced();
        debug!("executor '{}' quiesced", self.core.name);
    }

    pub(crate) fn core(&self) -> &Arc<KeepAliveCore<Q>> {
        &self.core
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn state(&self) -> ExecutorState {
        self.core.state()
    }

    pub fn keep_alive_count(&self) -> isize {
        self.core.keep_alive_count()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn queue(&self) -> &Q {
        self.core.queue()
    }
}

impl<Q: TaskQueue + 'static> Executor for KeepAliveExecutor<Q> {
    fn add(&self, work: Work) {
        self.add_with_priority(work, MID_PRI);
    }

    fn add_with_priority(&self, work: Work, priority: Priority) {
        if !self.joined {
            self.core.add_with_priority(work, priority);
            return;
        }
        let ka = KeepAlive::try_acquire(&self.core);
        if ka.is_empty() {
            trace!("executor '{}' quiesced, dropping work", self.core.name);
        }
        ka.add_with_priority(work, priority);
    }

    fn num_priorities(&self) -> u8 {
        self.core.num_priorities()
    }
}

impl<Q: TaskQueue + 'static> Drop for KeepAliveExecutor<Q> {
    fn drop(&mut self) {
        if self.joined || std::thread::panicking() {
            return;
        }
        error!(
            "executor '{}' dropped without join_keep_alive ({} keep-alives outstanding)",
            self.core.name,
            self.core.control.count()
        );
        if cfg!(debug_assertions) {
            panic!(
                "executor '{}' dropped without join_keep_alive",
                self.core.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InlineQueue;
    use std::sync::atomic::AtomicUsize;

    fn counter_work(counter: &Arc<AtomicUsize>) -> Work {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn add_runs_on_queue() {
        let mut exec = KeepAliveExecutor::new("inline", InlineQueue);
        let ran = Arc::new(AtomicUsize::new(0));
        exec.add(counter_work(&ran));
        exec.add_with_priority(counter_work(&ran), crate::LO_PRI);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        exec.join_keep_alive();
    }

    #[test]
    fn join_without_handles_is_immediate() {
        let mut exec = KeepAliveExecutor::new("idle", InlineQueue);
        assert_eq!(exec.state(), ExecutorState::Live);
        assert_eq!(exec.keep_alive_count(), 1);
        exec.join_keep_alive();
        assert_eq!(exec.state(), ExecutorState::Quiesced);
        assert_eq!(exec.keep_alive_count(), 0);
        assert!(exec.is_joined());
    }

    #[test]
    fn keep_alive_increments_count() {
        let mut exec = KeepAliveExecutor::new("counted", InlineQueue);
        let a = exec.keep_alive();
        let b = a.copy();
        assert_eq!(exec.keep_alive_count(), 3);
        assert_eq!(a.get().map(|c| c.name()), Some("counted"));
        drop(a);
        drop(b);
        assert_eq!(exec.keep_alive_count(), 1);
        exec.join_keep_alive();
    }

    #[test]
    fn handles_after_quiescence_are_empty() {
        let mut exec = KeepAliveExecutor::new("done", InlineQueue);
        exec.join_keep_alive();
        assert!(exec.keep_alive().is_empty());

        let ran = Arc::new(AtomicUsize::new(0));
        exec.add(counter_work(&ran));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handle_reports_draining_state() {
        let mut exec = KeepAliveExecutor::new("drain", InlineQueue);
        let ka = exec.keep_alive();
        let observer = ka.copy();

        let releaser = std::thread::spawn(move || {
            // Wait until the owner has released its self-reference.
            while observer.get().map(|c| c.state()) == Some(ExecutorState::Live) {
                std::thread::yield_now();
            }
            let state = observer.get().map(|c| c.state());
            drop(observer);
            drop(ka);
            state
        });

        exec.join_keep_alive();
        assert_eq!(releaser.join().unwrap(), Some(ExecutorState::Draining));
        assert_eq!(exec.state(), ExecutorState::Quiesced);
    }

    #[derive(Default)]
    struct QuiesceCounting {
        quiesced: AtomicUsize,
    }

    impl TaskQueue for QuiesceCounting {
        fn enqueue(&self, work: Work, _priority: Priority) {
            work();
        }

        fn on_quiesced(&self) {
            self.quiesced.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn join_notifies_queue_once_after_quiescence() {
        let mut exec = KeepAliveExecutor::new("hooked", QuiesceCounting::default());
        let ka = exec.keep_alive();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            drop(ka);
        });

        exec.join_keep_alive();
        assert_eq!(exec.queue().quiesced.load(Ordering::SeqCst), 1);
        releaser.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "join_keep_alive called twice")]
    fn double_join_panics() {
        let mut exec = KeepAliveExecutor::new("twice", InlineQueue);
        exec.join_keep_alive();
        exec.join_keep_alive();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "dropped without join_keep_alive")]
    fn drop_without_join_is_detected() {
        let exec = KeepAliveExecutor::new("leaky", InlineQueue);
        drop(exec);
    }
}
