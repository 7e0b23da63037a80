//! Cooperative shutdown signal
//!
//! One `Shutdown` per shard, triggered by the pool. Loops check the flag at
//! their suspension points via `wait()` inside `select!`, so teardown never
//! surfaces as an error.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

pub struct Shutdown {
    flag: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Trip the signal; idempotent
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolve once the signal has been tripped
    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent trigger
            // cannot slip between the check and the await.
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
