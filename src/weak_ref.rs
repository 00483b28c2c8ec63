//! Non-owning executor references.
//!
//! A `WeakExecutorRef` never keeps its parent alive on its own. Each call
//! tries to take a keep-alive on the parent for just that call; once the
//! parent has quiesced the call becomes a silent no-op.
//!
//! The weak reference carries its own control block so that it can be handed
//! around as a `KeepAlive<WeakExecutorRef<_>>` like any other executor.

use std::sync::Arc;

use log::trace;

use crate::control_block::KeepAliveControlBlock;
use crate::executor::{Executor, KeepAliveTarget, Priority, Work};
use crate::keep_alive::KeepAlive;
use crate::keep_alive_executor::KeepAliveCore;
use crate::queue::TaskQueue;

pub struct WeakExecutorRef<Q> {
    parent: Arc<KeepAliveCore<Q>>,
    control: KeepAliveControlBlock,
    // Cached so it stays answerable after the parent is gone.
    num_priorities: u8,
}

impl<Q: TaskQueue> WeakExecutorRef<Q> {
    pub(crate) fn new(parent: Arc<KeepAliveCore<Q>>) -> Self {
        let num_priorities = parent.num_priorities();
        Self {
            parent,
            control: KeepAliveControlBlock::new(),
            num_priorities,
        }
    }

    /// Try to upgrade to a real keep-alive on the parent.
    pub fn lock(&self) -> Option<KeepAlive<KeepAliveCore<Q>>> {
        let ka = KeepAlive::try_acquire(&self.parent);
        if ka.is_empty() {
            None
        } else {
            Some(ka)
        }
    }

    pub fn parent_name(&self) -> &str {
        self.parent.name()
    }
}

impl<Q: TaskQueue> Executor for WeakExecutorRef<Q> {
    fn add(&self, work: Work) {
        match self.lock() {
            Some(parent) => parent.add(work),
            None => trace!("'{}' is gone, dropping work", self.parent.name()),
        }
    }

    fn add_with_priority(&self, work: Work, priority: Priority) {
        match self.lock() {
            Some(parent) => parent.add_with_priority(work, priority),
            None => trace!("'{}' is gone, dropping work", self.parent.name()),
        }
    }

    fn num_priorities(&self) -> u8 {
        self.num_priorities
    }
}

impl<Q: TaskQueue> KeepAliveTarget for WeakExecutorRef<Q> {
    fn control_block(&self) -> &KeepAliveControlBlock {
        &self.control
    }
}
