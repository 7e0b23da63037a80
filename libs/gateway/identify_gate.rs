//! Identify admission gate
//!
//! The gateway only allows a bounded number of shards to run the identify
//! handshake inside one rate-limit window (`max_concurrency` from the
//! session-start limit). Standard semaphores don't fit: the limit changes at
//! runtime when the server reports a new quota, waiters must be admitted in
//! strict FIFO order, and lowering the limit must never revoke permits that
//! were already granted. So the gate is hand-rolled: a counting semaphore
//! with an adjustable limit behind a single per-instance lock.
//!
//! Cancellation is drop-based: dropping a pending [`IdentifyGate::acquire`]
//! future removes its waiter and gives back its pending slot, without
//! touching any other waiter.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{GatewayError, Result};

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

struct GateInner {
    max_concurrency: u32,
    /// Permits currently held or queued. Only decreases via `release` or
    /// waiter cancellation.
    pending: u32,
    waiters: VecDeque<Waiter>,
    disposed: bool,
    next_waiter_id: u64,
}

impl GateInner {
    /// Holders = permits granted and not yet released.
    fn holders(&self) -> u32 {
        self.pending - self.waiters.len() as u32
    }
}

/// FIFO counting semaphore bounding concurrent identify handshakes
pub struct IdentifyGate {
    inner: Mutex<GateInner>,
}

impl IdentifyGate {
    /// Create a gate admitting `max_concurrency` holders at once
    ///
    /// The value is clamped to at least 1; the server-reported quota is
    /// always >= 1 as well.
    pub fn new(max_concurrency: u32) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                max_concurrency: max_concurrency.max(1),
                pending: 0,
                waiters: VecDeque::new(),
                disposed: false,
                next_waiter_id: 0,
            }),
        }
    }

    /// Request a permit
    ///
    /// Resolves immediately when the gate has headroom (no waiter is
    /// allocated on that path). Otherwise the caller is queued FIFO and the
    /// returned future resolves when a permit is released to it, or fails
    /// with [`GatewayError::GateDisposed`] if the gate is torn down first.
    /// Dropping the future before it resolves cancels the wait.
    ///
    /// The pending slot is taken eagerly, in this call, not on first poll.
    pub fn acquire(&self) -> Acquire<'_> {
        let mut inner = self.inner.lock();

        if inner.disposed {
            return Acquire {
                gate: self,
                state: AcquireState::Done(Err(GatewayError::GateDisposed)),
            };
        }

        inner.pending += 1;
        if inner.pending <= inner.max_concurrency {
            return Acquire {
                gate: self,
                state: AcquireState::Done(Ok(())),
            };
        }

        let id = inner.next_waiter_id;
        inner.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        inner.waiters.push_back(Waiter { id, tx });
        debug!(waiters = inner.waiters.len(), "identify gate full, queueing");

        Acquire {
            gate: self,
            state: AcquireState::Waiting { rx, id },
        }
    }

    /// Give a permit back
    ///
    /// Safe no-op when nothing is pending. Wakes the oldest queued waiter,
    /// if any.
    pub fn release(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GatewayError::GateDisposed);
        }
        Self::release_locked(&mut inner);
        Ok(())
    }

    fn release_locked(inner: &mut GateInner) {
        if inner.pending > 0 {
            inner.pending -= 1;
        }
        // The freed slot goes to the oldest waiter. A send failure means the
        // waiter's future was dropped between cancellation bookkeeping steps,
        // which cannot happen: cancellation removes the waiter under this
        // same lock. Still, don't let it wedge the queue.
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.tx.send(()).is_ok() {
                break;
            }
        }
    }

    /// Change the admission limit
    ///
    /// Raising the limit immediately admits queued waiters, oldest first,
    /// until the new headroom is used up. Lowering it never revokes permits
    /// that were already granted; it only affects future admissions.
    pub fn set_max_concurrency(&self, max_concurrency: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GatewayError::GateDisposed);
        }
        if max_concurrency == 0 {
            return Err(GatewayError::InvalidConcurrency(max_concurrency));
        }
        if max_concurrency == inner.max_concurrency {
            return Ok(());
        }

        let raised = max_concurrency > inner.max_concurrency;
        inner.max_concurrency = max_concurrency;

        if raised {
            while !inner.waiters.is_empty() && inner.holders() < inner.max_concurrency {
                // Admission, not a release: the waiter keeps its pending slot
                // and simply becomes a holder.
                if let Some(waiter) = inner.waiters.pop_front() {
                    let _ = waiter.tx.send(());
                }
            }
        }
        Ok(())
    }

    /// Tear the gate down
    ///
    /// Idempotent. Every queued waiter resolves with
    /// [`GatewayError::GateDisposed`]; the pending count resets to zero and
    /// all later calls on the gate fail with the same error.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        inner.pending = 0;
        // Dropping the senders resolves the waiters' receivers with a closed
        // error, which Acquire maps to GateDisposed.
        inner.waiters.clear();
        debug!("identify gate disposed");
    }

    /// Permits currently held or queued
    pub fn pending(&self) -> u32 {
        self.inner.lock().pending
    }

    /// Current admission limit
    pub fn max_concurrency(&self) -> u32 {
        self.inner.lock().max_concurrency
    }
}

enum AcquireState {
    Done(Result<()>),
    Waiting { rx: oneshot::Receiver<()>, id: u64 },
    Finished,
}

/// Future returned by [`IdentifyGate::acquire`]
pub struct Acquire<'a> {
    gate: &'a IdentifyGate,
    state: AcquireState,
}

impl Future for Acquire<'_> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            AcquireState::Done(_) => {
                let AcquireState::Done(res) =
                    std::mem::replace(&mut self.state, AcquireState::Finished)
                else {
                    unreachable!()
                };
                Poll::Ready(res)
            }
            AcquireState::Waiting { rx, .. } => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(())) => {
                    self.state = AcquireState::Finished;
                    Poll::Ready(Ok(()))
                }
                Poll::Ready(Err(_)) => {
                    self.state = AcquireState::Finished;
                    Poll::Ready(Err(GatewayError::GateDisposed))
                }
            },
            AcquireState::Finished => Poll::Pending,
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.state, AcquireState::Finished) {
            AcquireState::Done(Ok(())) => {
                // Fast-path grant that was never polled. Nobody will ever
                // release it, so release it here.
                let mut inner = self.gate.inner.lock();
                if !inner.disposed {
                    IdentifyGate::release_locked(&mut inner);
                }
            }
            AcquireState::Waiting { rx, id } => {
                let mut inner = self.gate.inner.lock();
                if inner.disposed {
                    return;
                }
                if let Some(pos) = inner.waiters.iter().position(|w| w.id == id) {
                    // Still queued: plain cancellation, give the slot back.
                    inner.waiters.remove(pos);
                    if inner.pending > 0 {
                        inner.pending -= 1;
                    }
                    debug!("queued identify wait cancelled");
                } else {
                    // The permit was granted between the last poll and this
                    // drop; treat it like a held permit.
                    drop(rx);
                    IdentifyGate::release_locked(&mut inner);
                }
            }
            AcquireState::Done(Err(_)) | AcquireState::Finished => {}
        }
    }
}
