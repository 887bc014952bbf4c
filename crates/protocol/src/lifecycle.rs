//! Producer lifecycle state
//!
//! A producer advances Active -> Stopping -> Stopped. The distinction
//! matters for backpressure: while active or stopping, a full batch
//! buffer blocks the ingest path; once stopped, blocked appends give up
//! and route to fallback instead.

use std::sync::atomic::{AtomicU8, Ordering};

const ACTIVE: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Shared lifecycle flag for a producer
///
/// Shared as `Arc<SinkLifecycle>` between the producer's run loop and
/// anything that needs the activity probe.
#[derive(Debug)]
pub struct SinkLifecycle {
    state: AtomicU8,
}

impl SinkLifecycle {
    /// Create a lifecycle in the active state
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Whether the producer is accepting new messages
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Whether the producer is still running, including the shutdown
    /// flush window
    ///
    /// This is the backpressure probe: blocking appends keep waiting
    /// while this holds and fall back once it does not.
    #[inline]
    pub fn is_active_or_stopping(&self) -> bool {
        self.state.load(Ordering::Acquire) != STOPPED
    }

    /// Enter the stopping state (shutdown flush in progress)
    pub fn set_stopping(&self) {
        self.state.store(STOPPING, Ordering::Release);
    }

    /// Enter the stopped state
    pub fn set_stopped(&self) {
        self.state.store(STOPPED, Ordering::Release);
    }
}

impl Default for SinkLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
