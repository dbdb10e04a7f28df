//! Single-slot latching semaphore backing the queue's slow paths.
//!
//! # Contract
//!
//! - [`Semaphore::signal`] sets a latch and wakes the parked waiter, if any.
//!   A signal delivered while no thread is waiting is not lost: the latch
//!   persists until the next [`Semaphore::wait`] consumes it.
//! - [`Semaphore::wait`] returns immediately when the latch is set, clearing
//!   it; otherwise it parks the calling thread until signaled.
//! - At most one thread ever waits on a given instance. Callers re-check
//!   their wake condition after `wait` returns, so a stale or duplicate
//!   signal is harmless.
//!
//! Built on a mutex + condition-variable pair; the mutex also gives the
//! park/wake handshake a synchronization point, so state published by the
//! signaler before `signal` is visible to the waiter after `wait`.

#[cfg(loom)]
use loom::sync::{Condvar, Mutex};
#[cfg(not(loom))]
use std::sync::{Condvar, Mutex};

/// Edge-held wake-up primitive: a set-once latch cleared by the next wait.
pub struct Semaphore {
    latch: Mutex<bool>,
    wakeup: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    /// Set the latch and wake the waiter, if one is parked.
    pub fn signal(&self) {
        // Poisoning is unreachable here (no user code runs under the lock),
        // but recovering the guard keeps the primitive panic-proof.
        let mut set = self.latch.lock().unwrap_or_else(|e| e.into_inner());
        *set = true;
        self.wakeup.notify_one();
    }

    /// Consume a pending signal, parking until one arrives.
    pub fn wait(&self) {
        let mut set = self.latch.lock().unwrap_or_else(|e| e.into_inner());
        while !*set {
            set = self.wakeup.wait(set).unwrap_or_else(|e| e.into_inner());
        }
        *set = false;
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}
