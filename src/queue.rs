//! The task-queue collaborator.
//!
//! A keep-alive executor owns one of these and forwards every `add` to it.
//! The only contract: `enqueue` is safe to call from many threads at once and
//! each enqueued closure eventually runs exactly once.
//!
//! `on_quiesced` runs once, on the owner's thread, after the last keep-alive
//! is gone. Queues that hold resources of their own (such as a keep-alive on
//! another executor) release them there.

use crate::executor::{run_guarded, Priority, Work};

pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, work: Work, priority: Priority);

    fn num_priorities(&self) -> u8 {
        1
    }

    fn on_quiesced(&self) {}
}

/// Runs each closure immediately on the enqueuing thread.
///
/// Useful as a parent for [`SerialExecutor`](crate::SerialExecutor) and in
/// tests that need deterministic delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineQueue;

impl TaskQueue for InlineQueue {
    fn enqueue(&self, work: Work, _priority: Priority) {
        run_guarded(work, "inline");
    }
}
