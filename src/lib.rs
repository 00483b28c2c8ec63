//! Keep-alive executors.
//!
//! An executor that hands out references to itself has to answer one
//! question at shutdown: when is it safe to go away? This crate answers it
//! with a reference count:
//!
//! - The executor starts holding one reference to itself.
//! - Callers take [`KeepAlive`] handles while they depend on the executor
//!   (to add work, or while their work is in flight).
//! - Shutdown ([`KeepAliveExecutor::join_keep_alive`]) drops the
//!   self-reference and blocks until the last handle is released.
//!
//! # Architecture
//!
//! ```text
//!   KeepAliveControlBlock   atomic count + one-shot baton
//!            ▲
//!   KeepAliveExecutor<Q> ── owns Arc<KeepAliveCore<Q>> ── Q: TaskQueue
//!            │                        ▲        InlineQueue
//!            │                        │        WorkPool   (ThreadPoolExecutor)
//!            ├── keep_alive() ──► KeepAlive  SerialQueue (SerialExecutor)
//!            └── weak_ref()   ──► KeepAlive<WeakExecutorRef>
//! ```
//!
//! The hot path (acquire, release, add) is lock-free. Only the final wait
//! in `join_keep_alive` blocks.
//!
//! # Example
//!
//! ```rust
//! use keepalive_executor::{Executor, InlineQueue, KeepAliveExecutor};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let mut exec = KeepAliveExecutor::new("example", InlineQueue);
//! let weak = exec.weak_ref();
//! let ran = Arc::new(AtomicUsize::new(0));
//!
//! let handle = exec.keep_alive();
//! let r = ran.clone();
//! handle.add(Box::new(move || {
//!     r.fetch_add(1, Ordering::SeqCst);
//! }));
//! drop(handle);
//!
//! exec.join_keep_alive();
//!
//! // The executor is gone; the weak reference silently drops work.
//! let r = ran.clone();
//! weak.add(Box::new(move || {
//!     r.fetch_add(1, Ordering::SeqCst);
//! }));
//! assert_eq!(ran.load(Ordering::SeqCst), 1);
//! ```

mod baton;
pub mod config;
mod control_block;
mod error;
mod executor;
mod keep_alive;
mod keep_alive_executor;
mod lifecycle;
pub mod mpmc_ring;
mod queue;
mod serial;
mod weak_ref;
mod work_pool;

pub use baton::Baton;
pub use config::{Config, WorkPoolConfig, CONFIG};
pub use control_block::KeepAliveControlBlock;
pub use error::ExecutorError;
pub use executor::{Executor, KeepAliveTarget, Priority, Work, HI_PRI, LO_PRI, MID_PRI};
pub use keep_alive::KeepAlive;
pub use keep_alive_executor::{KeepAliveCore, KeepAliveExecutor};
pub use lifecycle::ExecutorState;
pub use mpmc_ring::MpmcRing;
pub use queue::{InlineQueue, TaskQueue};
pub use serial::{SerialExecutor, SerialQueue};
pub use weak_ref::WeakExecutorRef;
pub use work_pool::{ThreadPoolExecutor, WorkPool};
