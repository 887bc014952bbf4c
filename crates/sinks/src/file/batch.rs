//! Batch buffer for pending messages
//!
//! A bounded buffer of messages waiting to be written to one destination.
//! Flushing is triggered by size (buffered count reaches the flush
//! threshold) or by age (nothing appended for the batch timeout). The
//! buffer itself holds no lock; `DestinationState` owns it behind the
//! per-destination mutex.

use std::time::{Duration, Instant};

use rill_protocol::Message;

/// Bounded buffer of messages pending a flush
///
/// Order is preserved: messages drain in append order, and the caller
/// writes them in drain order, so append order survives through to the
/// file per destination.
#[derive(Debug)]
pub struct BatchBuffer {
    capacity: usize,
    flush_threshold: usize,
    items: Vec<Message>,
    last_appended: Instant,
}

impl BatchBuffer {
    /// Create a buffer holding at most `capacity` messages, flushing once
    /// `flush_threshold` are buffered (clamped to `capacity`)
    pub fn new(capacity: usize, flush_threshold: usize) -> Self {
        Self {
            capacity,
            flush_threshold: flush_threshold.min(capacity),
            items: Vec::with_capacity(capacity.min(1024)),
            last_appended: Instant::now(),
        }
    }

    /// Append a message, or hand it back when the buffer is full
    pub fn append(&mut self, msg: Message) -> Result<(), Message> {
        if self.items.len() >= self.capacity {
            return Err(msg);
        }
        self.items.push(msg);
        self.last_appended = Instant::now();
        Ok(())
    }

    /// Number of buffered messages
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer holds no messages
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the buffer is at capacity
    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// The configured flush threshold
    #[inline]
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// True when the buffer is non-empty and nothing was appended for at
    /// least `timeout`
    pub fn reached_time_threshold(&self, timeout: Duration) -> bool {
        !self.items.is_empty() && self.last_appended.elapsed() >= timeout
    }

    /// True when at least `threshold` messages are buffered
    pub fn reached_size_threshold(&self, threshold: usize) -> bool {
        self.items.len() >= threshold
    }

    /// Atomically take the buffered messages, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
