//! Per-bucket request workers
//!
//! Each route bucket gets one long-lived tokio task owning a bounded queue.
//! Requests queued to the same bucket execute strictly one at a time, in
//! FIFO order, so a 429 on one request delays its successors instead of
//! letting them pile onto the same limit. The worker also defers to the
//! shared [`GlobalRateLimiter`] before every send.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{Result, RestError};
use crate::global::GlobalRateLimiter;
use crate::headers::RateLimitHeaders;

/// Bounded depth of each bucket's queue
pub const QUEUE_CAPACITY: usize = 64;

/// Attempts per request before giving up (the first send counts as one)
pub const MAX_ATTEMPTS: u32 = 5;

/// A request waiting its turn in a bucket queue
pub struct PendingRequest {
    pub builder: RequestBuilder,
    pub completion: oneshot::Sender<Result<Response>>,
}

/// Limit state learned from the most recent response in this bucket
#[derive(Debug, Default, Clone)]
struct BucketState {
    /// Server-assigned bucket hash, recorded for logging once known
    bucket_id: Option<String>,
    remaining: Option<u64>,
    /// Absolute time the current window resets, taken at header-parse time.
    /// Stale deadlines fall behind `Instant::now()` and cost nothing.
    reset_at: Option<Instant>,
}

/// Spawn the worker task for one bucket and hand back its queue sender
pub fn spawn_bucket_worker(
    route: String,
    global: Arc<GlobalRateLimiter>,
) -> mpsc::Sender<PendingRequest> {
    let (tx, mut rx) = mpsc::channel::<PendingRequest>(QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut state = BucketState::default();
        debug!(route = %route, "bucket worker started");

        while let Some(pending) = rx.recv().await {
            let outcome = process(&route, &global, &mut state, pending.builder).await;
            // Receiver may have been dropped; nothing left to do then.
            let _ = pending.completion.send(outcome);
        }

        debug!(route = %route, "bucket worker stopped");
    });

    tx
}

/// Execute one request, retrying through 429s up to [`MAX_ATTEMPTS`]
async fn process(
    route: &str,
    global: &GlobalRateLimiter,
    state: &mut BucketState,
    builder: RequestBuilder,
) -> Result<Response> {
    let mut attempts: u32 = 0;

    loop {
        global.wait_for_global().await;

        // Preemptive wait: if the last response said the window is spent,
        // sleep out whatever remains of it rather than eat a guaranteed 429.
        if state.remaining == Some(0) {
            if let Some(reset_at) = state.reset_at {
                if reset_at > Instant::now() {
                    let wait = reset_at - Instant::now();
                    debug!(route = %route, wait_ms = wait.as_millis() as u64, "bucket exhausted, waiting for reset");
                    tokio::time::sleep_until(reset_at).await;
                }
            }
            state.remaining = None;
        }

        let attempt = builder.try_clone().ok_or(RestError::UnclonableRequest)?;
        let response = attempt.send().await?;
        let headers = RateLimitHeaders::parse(response.headers());

        if let Some(bucket_id) = &headers.bucket {
            if state.bucket_id.as_deref() != Some(bucket_id) {
                trace!(route = %route, bucket = %bucket_id, "bucket hash assigned");
                state.bucket_id = Some(bucket_id.clone());
            }
        }
        if headers.remaining.is_some() {
            state.remaining = headers.remaining;
        }
        if let Some(secs) = headers.reset_after {
            state.reset_at = Some(Instant::now() + sanitize_secs(secs));
        }

        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let retry_after = match headers.retry_after {
            Some(secs) => Some(secs),
            None => body_retry_after(response).await,
        };

        if headers.global {
            if let Some(secs) = retry_after {
                // Global limits are not this bucket's fault; retrying after
                // the shared window does not consume one of the request's
                // attempts.
                global.note_and_wait(sanitize_secs(secs)).await;
                continue;
            }
            // A global marker without a numeric retry-after never advances
            // the shared deadline; fall through to bucket-local handling.
        }

        attempts += 1;
        if attempts >= MAX_ATTEMPTS {
            warn!(route = %route, attempts, "rate limit retries exhausted");
            return Err(RestError::RetriesExhausted { attempts });
        }
        let wait = headers.reset_after.or(retry_after).unwrap_or(1.0);
        warn!(route = %route, retry_after_secs = wait, attempt = attempts, "bucket rate limited, retrying");
        tokio::time::sleep(sanitize_secs(wait)).await;
    }
}

/// Retry delay from a 429's JSON body (`retry_after`, seconds)
async fn body_retry_after(response: Response) -> Option<f64> {
    let body = response.json::<serde_json::Value>().await.ok()?;
    body.get("retry_after").and_then(|v| v.as_f64())
}

/// Seconds-to-duration that tolerates skewed servers and proxies
///
/// Negative, NaN, infinite and overflowing values all collapse to zero
/// instead of panicking the worker task.
fn sanitize_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
