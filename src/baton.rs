//! Single-use wait/notify primitive.
//!
//! A `Baton` is posted exactly once and waited on by (usually) one thread.
//! It backs the cold path of the keep-alive protocol: the owner parks here
//! in `join_keep_alive` until the last handle is released.

use std::sync::{Condvar, Mutex, PoisonError};

/// One-shot event built from a flag and a condition variable.
#[derive(Debug, Default)]
pub struct Baton {
    posted: Mutex<bool>,
    cv: Condvar,
}

impl Baton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post the baton and wake every waiter.
    ///
    /// Posting twice is a logic error and trips a debug assertion.
    pub fn post(&self) {
        let mut posted = self.posted.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(!*posted, "baton posted twice");
        *posted = true;
        self.cv.notify_all();
    }

    /// Block until [`post`](Baton::post) has been called.
    ///
    /// Returns immediately if the baton was already posted.
    pub fn wait(&self) {
        let mut posted = self.posted.lock().unwrap_or_else(PoisonError::into_inner);
        while !*posted {
            posted = self.cv.wait(posted).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking check.
    pub fn is_posted(&self) -> bool {
        *self.posted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
