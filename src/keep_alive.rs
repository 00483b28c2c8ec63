//! Keep-alive handles.
//!
//! A [`KeepAlive`] is a capability: while it is held, the referenced executor
//! will not finish shutting down. Handles are not `Clone`; taking another
//! reference is an explicit [`copy`](KeepAlive::copy), so every increment of
//! the count is visible at the call site.

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::executor::{Executor, KeepAliveTarget, Priority, Work};

/// A counted reference to a [`KeepAliveTarget`]. Releases on drop.
pub struct KeepAlive<E: KeepAliveTarget + ?Sized> {
    target: Option<Arc<E>>,
}

impl<E: KeepAliveTarget + ?Sized> KeepAlive<E> {
    /// A handle that references nothing. Work added to it is dropped.
    pub fn empty() -> Self {
        Self { target: None }
    }

    /// Wrap a target whose count has already been incremented for this handle.
    pub(crate) fn adopt(target: Arc<E>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// Acquire a handle if the target has not reached quiescence.
    ///
    /// Returns an empty handle when it is already too late.
    pub fn try_acquire(target: &Arc<E>) -> Self {
        if target.control_block().try_acquire() {
            Self::adopt(Arc::clone(target))
        } else {
            Self::empty()
        }
    }

    /// Take another reference to the same target.
    ///
    /// Copying an empty handle yields an empty handle.
    #[must_use]
    pub fn copy(&self) -> Self {
        match &self.target {
            Some(target) => {
                // We already hold a reference, so the count cannot be zero.
                target.control_block().acquire();
                Self::adopt(Arc::clone(target))
            }
            None => Self::empty(),
        }
    }

    /// Release the reference now instead of at drop. Idempotent.
    pub fn reset(&mut self) {
        if let Some(target) = self.target.take() {
            target.control_block().release();
        }
    }

    pub fn get(&self) -> Option<&E> {
        self.target.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_none()
    }
}

impl<E: KeepAliveTarget + ?Sized> Drop for KeepAlive<E> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<E: KeepAliveTarget + ?Sized> Default for KeepAlive<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: KeepAliveTarget + ?Sized> fmt::Debug for KeepAlive<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("empty", &self.is_empty())
            .field(
                "count",
                &self.get().map(|t| t.control_block().count()),
            )
            .finish()
    }
}

impl<E: KeepAliveTarget + ?Sized> Executor for KeepAlive<E> {
    fn add(&self, work: Work) {
        match self.get() {
            Some(target) => target.add(work),
            None => trace!("dropping work added to an empty keep-alive"),
        }
    }

    fn add_with_priority(&self, work: Work, priority: Priority) {
        match self.get() {
            Some(target) => target.add_with_priority(work, priority),
            None => trace!("dropping work added to an empty keep-alive"),
        }
    }

    fn num_priorities(&self) -> u8 {
        self.get().map_or(1, |t| t.num_priorities())
    }
}
