//! Message type flowing through the router
//!
//! A `Message` is an opaque, already-formatted payload tagged with the
//! stream it belongs to. Sinks treat the payload as raw bytes and add no
//! framing of their own.

use bytes::Bytes;

use crate::stream::StreamId;

/// A single routed message: stream tag + opaque payload
///
/// Payloads are reference-counted (`bytes::Bytes`), so `Clone` is cheap.
/// A producer clones the message before buffering it; the clone's lifetime
/// ends when the payload has been written or the message was routed to
/// fallback.
///
/// # Example
///
/// ```
/// use rill_protocol::{Message, StreamId};
///
/// let msg = Message::new(StreamId::new(7), "hello\n");
/// assert_eq!(msg.stream(), StreamId::new(7));
/// assert_eq!(msg.payload(), b"hello\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    stream: StreamId,
    payload: Bytes,
}

impl Message {
    /// Create a new message for a stream
    #[inline]
    pub fn new(stream: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            payload: payload.into(),
        }
    }

    /// The stream this message was routed on
    #[inline]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// The raw payload bytes
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
