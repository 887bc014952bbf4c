//! Stream identification and name resolution
//!
//! `StreamId` tags every message with the logical stream it was routed on.
//! Producers that expand wildcard paths resolve ids back to names through
//! a `StreamRegistry`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

/// Stream name used when the wildcard stream id is substituted into a path
pub const WILDCARD_STREAM_NAME: &str = "ALL";

/// Stream identifier
///
/// A lightweight handle identifying a logical stream. Designed to be
/// `Copy` and fit in a register; name lookups go through the registry.
///
/// # Example
///
/// ```
/// use rill_protocol::StreamId;
///
/// let stream = StreamId::new(1);
/// let copy = stream; // Copy, not move
/// assert_eq!(stream, copy);
/// assert_ne!(stream, StreamId::WILDCARD);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// The wildcard stream: matches every stream, resolves to `"ALL"`
    /// when substituted into templated paths
    pub const WILDCARD: StreamId = StreamId(0);

    /// Create a stream id from a numeric index
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the numeric index of this stream
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Whether this is the wildcard stream
    #[inline]
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.0 == Self::WILDCARD.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves stream ids to human-readable stream names
///
/// Producers hold this as `Arc<dyn StreamRegistry>`; the embedding runtime
/// decides where names actually come from.
pub trait StreamRegistry: Send + Sync {
    /// Resolve a stream id to its name
    ///
    /// Must return `"ALL"` for [`StreamId::WILDCARD`] and a stable
    /// placeholder for ids it has never seen.
    fn stream_name(&self, id: StreamId) -> String;
}

/// In-memory stream registry
///
/// Assigns ids sequentially starting at 1; id 0 is reserved for the
/// wildcard stream.
#[derive(Debug)]
pub struct MemoryStreamRegistry {
    names: RwLock<HashMap<StreamId, String>>,
    next: AtomicU32,
}

impl Default for MemoryStreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
            next: AtomicU32::new(1),
        }
    }

    /// Register a stream name and return its id
    pub fn register(&self, name: impl Into<String>) -> StreamId {
        let id = StreamId::new(self.next.fetch_add(1, Ordering::Relaxed));
        self.names.write().insert(id, name.into());
        id
    }

    /// Number of registered streams (the wildcard is not counted)
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether no streams have been registered
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

impl StreamRegistry for MemoryStreamRegistry {
    fn stream_name(&self, id: StreamId) -> String {
        if id.is_wildcard() {
            return WILDCARD_STREAM_NAME.to_string();
        }
        match self.names.read().get(&id) {
            Some(name) => name.clone(),
            None => format!("stream-{}", id.index()),
        }
    }
}
