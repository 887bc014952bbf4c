//! Fallback routing
//!
//! When a producer cannot deliver a message (unwritable destination,
//! buffer full during shutdown), it hands the message to the fallback
//! stage - typically a spooling producer that persists to local disk and
//! replays later. The hand-off is non-blocking: a producer that is already
//! in trouble must not also wedge on its escape hatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::message::Message;

/// Handle for routing messages to the fallback stage
///
/// Wraps the spooling producer's channel sender. Cloning the handle is
/// cheap; all clones share the dropped-message counter.
///
/// # Example
///
/// ```
/// use rill_protocol::{FallbackHandle, Message, StreamId};
///
/// let (fallback, mut rx) = FallbackHandle::channel(16);
/// assert!(fallback.try_route(Message::new(StreamId::new(1), "spooled")));
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FallbackHandle {
    sender: mpsc::Sender<Message>,
    dropped: Arc<AtomicU64>,
}

impl FallbackHandle {
    /// Create a handle over an existing spool channel sender
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a handle together with the receiving end of its channel
    ///
    /// Convenience for tests and for runtimes that wire the spooling
    /// producer up separately.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Try to route a message to the fallback stage without blocking
    ///
    /// Returns `true` if the message was queued. A full or closed spool
    /// channel drops the message, counts it and logs a warning - the
    /// fallback stage owns durability, not this handle.
    pub fn try_route(&self, msg: Message) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(stream = %msg.stream(), "fallback channel full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(stream = %msg.stream(), "fallback channel closed, dropping message");
                false
            }
        }
    }

    /// Number of messages dropped because the spool channel was
    /// unavailable
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the spool channel has been closed
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamId;

    #[test]
    fn test_try_route_delivers() {
        let (fallback, mut rx) = FallbackHandle::channel(4);
        let msg = Message::new(StreamId::new(1), "a");

        assert!(fallback.try_route(msg.clone()));
        assert_eq!(rx.try_recv().unwrap(), msg);
        assert_eq!(fallback.dropped(), 0);
    }

    #[test]
    fn test_try_route_full_channel_drops() {
        let (fallback, _rx) = FallbackHandle::channel(1);

        assert!(fallback.try_route(Message::new(StreamId::new(1), "a")));
        assert!(!fallback.try_route(Message::new(StreamId::new(1), "b")));
        assert_eq!(fallback.dropped(), 1);
    }

    #[test]
    fn test_try_route_closed_channel_drops() {
        let (fallback, rx) = FallbackHandle::channel(1);
        drop(rx);

        assert!(fallback.is_closed());
        assert!(!fallback.try_route(Message::new(StreamId::new(1), "a")));
        assert_eq!(fallback.dropped(), 1);
    }

    #[test]
    fn test_clones_share_dropped_counter() {
        let (fallback, rx) = FallbackHandle::channel(1);
        drop(rx);

        let clone = fallback.clone();
        clone.try_route(Message::new(StreamId::new(1), "a"));
        assert_eq!(fallback.dropped(), 1);
    }
}
