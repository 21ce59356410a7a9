// SPDX-License-Identifier: MIT

//! Pause/Resume Gate (§4.5): a process-wide flag that blocks new task
//! admission without draining running tasks. `pause()`/`resume()` are
//! idempotent (§8 round-trip law).

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct PauseFlag {
    paused: AtomicBool,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self { paused: AtomicBool::new(false) }
    }

    /// Idempotent: calling pause twice leaves the flag set once.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Idempotent: calling resume twice leaves the flag cleared once.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "pause_tests.rs"]
mod tests;
