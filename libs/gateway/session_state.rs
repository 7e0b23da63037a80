//! Atomic shard session state

use std::sync::atomic::{AtomicU8, Ordering};

/// Protocol position of one shard session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Connected, waiting for the server's Hello
    PendingHello = 0,
    /// Identify/Resume sent, waiting for READY/RESUMED
    PendingAck = 1,
    /// Live and dispatching events
    Ready = 2,
    /// Disconnected, reconnect pending
    ConnectionLost = 3,
}

/// Lock-free state cell shared between the session loops and observers
///
/// Written only by the owning session's receive loop; reads elsewhere are
/// informational snapshots.
pub struct AtomicSessionState {
    state: AtomicU8,
}

impl AtomicSessionState {
    pub fn new(initial: SessionState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    pub fn set(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            0 => SessionState::PendingHello,
            1 => SessionState::PendingAck,
            2 => SessionState::Ready,
            _ => SessionState::ConnectionLost,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.get() == SessionState::Ready
    }
}
