//! Global rate-limit coordination
//!
//! A global 429 blocks every bucket at once. The shared deadline lives in a
//! single atomic (milliseconds since the Unix epoch) advanced with
//! compare-and-set-to-max semantics, so concurrent responses can only push
//! it forward, never back. A separate mutex makes sure only one caller
//! actually sleeps on an active limit while the rest queue behind it, then
//! everyone re-checks the possibly-updated deadline after waking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, warn};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Cross-bucket gate for global 429 windows
pub struct GlobalRateLimiter {
    /// Earliest epoch-ms any request may be sent. 0 = no limit active.
    until_ms: AtomicU64,
    /// Serializes the actual sleeping, not the deadline itself.
    sleeper: Mutex<()>,
}

impl GlobalRateLimiter {
    pub fn new() -> Self {
        Self {
            until_ms: AtomicU64::new(0),
            sleeper: Mutex::new(()),
        }
    }

    /// Block until no global window is active
    ///
    /// Lock-free fast path when there is nothing to wait for.
    pub async fn wait_for_global(&self) {
        if self.until_ms.load(Ordering::Acquire) <= now_ms() {
            return;
        }

        let _guard = self.sleeper.lock().await;
        loop {
            let until = self.until_ms.load(Ordering::Acquire);
            let now = now_ms();
            if until <= now {
                return;
            }
            debug!(wait_ms = until - now, "waiting out global rate limit");
            tokio::time::sleep(Duration::from_millis(until - now)).await;
        }
    }

    /// Record a global retry-after window starting now
    ///
    /// Monotonic: a shorter concurrent window never shrinks a longer one.
    pub fn note_retry_after(&self, retry_after: Duration) {
        let candidate = now_ms().saturating_add(retry_after.as_millis() as u64);
        let previous = self.until_ms.fetch_max(candidate, Ordering::AcqRel);
        if candidate > previous {
            warn!(retry_after_ms = retry_after.as_millis() as u64, "global rate limit hit");
        }
    }

    /// Record a global window, then wait it out
    pub async fn note_and_wait(&self, retry_after: Duration) {
        self.note_retry_after(retry_after);
        self.wait_for_global().await;
    }

    /// Current deadline in epoch milliseconds (0 when none was ever set)
    pub fn deadline_ms(&self) -> u64 {
        self.until_ms.load(Ordering::Acquire)
    }
}

impl Default for GlobalRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_no_limit_returns_immediately() {
        let limiter = GlobalRateLimiter::new();
        let start = Instant::now();
        limiter.wait_for_global().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_deadline_is_monotonic_max_under_concurrency() {
        let limiter = Arc::new(GlobalRateLimiter::new());
        let floor = now_ms();

        let mut handles = Vec::new();
        for ms in [100u64, 50, 200] {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.note_retry_after(Duration::from_millis(ms));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let deadline = limiter.deadline_ms();
        // The winner must be the longest window; racing shorter updates can
        // never pull the deadline below it.
        assert!(deadline >= floor + 200);
        assert!(deadline <= now_ms() + 200);

        limiter.note_retry_after(Duration::from_millis(10));
        assert!(limiter.deadline_ms() >= deadline);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_deadline() {
        let limiter = GlobalRateLimiter::new();
        limiter.note_retry_after(Duration::from_millis(80));

        let start = Instant::now();
        limiter.wait_for_global().await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_only_one_sleeper_many_waiters() {
        let limiter = Arc::new(GlobalRateLimiter::new());
        limiter.note_retry_after(Duration::from_millis(80));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.wait_for_global().await;
            }));
        }
        for h in handles {
            tokio::time::timeout(Duration::from_secs(2), h)
                .await
                .unwrap()
                .unwrap();
        }
        assert!(limiter.deadline_ms() <= now_ms());
    }
}
