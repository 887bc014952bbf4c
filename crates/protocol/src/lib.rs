//! Rill - Protocol
//!
//! Foundational types for the rill log/event router, plus the interfaces
//! producers consume from the surrounding runtime:
//!
//! - `Message` - an opaque payload tagged with a `StreamId`
//! - `StreamRegistry` - stream id to stream name resolution
//! - `FallbackHandle` - non-blocking hand-off to the spooling producer
//! - `SinkLifecycle` - activity probe for backpressure release
//!
//! # Design Principles
//!
//! - **Zero-copy**: payloads are `bytes::Bytes`, so the clone a producer
//!   takes before buffering is a refcount bump, not a copy
//! - **No ambient globals**: producers receive the registry and fallback
//!   handle at construction instead of reaching for process-wide state

mod fallback;
mod lifecycle;
mod message;
mod stream;

pub use fallback::FallbackHandle;
pub use lifecycle::SinkLifecycle;
pub use message::Message;
pub use stream::{MemoryStreamRegistry, StreamId, StreamRegistry, WILDCARD_STREAM_NAME};
