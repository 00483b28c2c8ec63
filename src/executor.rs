//! The minimal scheduling capability every executor in this crate exposes.

use std::panic::{self, AssertUnwindSafe};

use log::error;

use crate::control_block::KeepAliveControlBlock;

/// A unit of work: run once, on some thread, eventually.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling priority. Higher runs first on executors with more than one lane.
pub type Priority = i8;

pub const LO_PRI: Priority = i8::MIN;
pub const MID_PRI: Priority = 0;
pub const HI_PRI: Priority = i8::MAX;

/// Anything that accepts work.
///
/// Implementations must be callable concurrently from many threads and must
/// never block on the completion of `work`.
pub trait Executor: Send + Sync {
    fn add(&self, work: Work);

    /// Executors with a single lane ignore `priority`.
    fn add_with_priority(&self, work: Work, priority: Priority) {
        let _ = priority;
        self.add(work);
    }

    fn num_priorities(&self) -> u8 {
        1
    }
}

/// An executor whose liveness is tracked by a [`KeepAliveControlBlock`].
///
/// Only types implementing this trait can be wrapped in a
/// [`KeepAlive`](crate::KeepAlive) handle.
pub trait KeepAliveTarget: Executor {
    fn control_block(&self) -> &KeepAliveControlBlock;
}

/// Run `work`, logging instead of unwinding if it panics.
///
/// Worker loops call this so one bad task cannot take a thread down with it.
pub(crate) fn run_guarded(work: Work, context: &str) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!("{context}: task panicked: {msg}");
    }
}
