//! Executor lifecycle state.
//!
//! ```text
//! new() ──► Live ──join_keep_alive()──► Draining ──last release──► Quiesced
//! ```
//!
//! `Live → Draining` happens exactly once, when the owner gives up its
//! self-reference. `Draining → Quiesced` happens when the count hits zero,
//! which may be immediate if no handles were outstanding.

/// Observable lifecycle state of a keep-alive executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Self-reference held. Accepts work and hands out keep-alives.
    Live,

    /// Self-reference released, external handles still outstanding.
    /// Handles may still be copied and weak references may still deliver.
    Draining,

    /// Count reached zero. Terminal; safe to destroy.
    Quiesced,
}

impl ExecutorState {
    pub(crate) fn from_parts(self_released: bool, count: isize) -> Self {
        match (self_released, count) {
            (false, _) => ExecutorState::Live,
            (true, 0) => ExecutorState::Quiesced,
            (true, _) => ExecutorState::Draining,
        }
    }

    /// Returns `true` if new keep-alives can still be acquired.
    #[must_use]
    pub fn accepts_keep_alives(&self) -> bool {
        !self.is_quiesced()
    }

    #[must_use]
    pub fn is_quiesced(&self) -> bool {
        matches!(self, ExecutorState::Quiesced)
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorState::Live => write!(f, "Live"),
            ExecutorState::Draining => write!(f, "Draining"),
            ExecutorState::Quiesced => write!(f, "Quiesced"),
        }
    }
}
