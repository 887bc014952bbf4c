//! Common types and utilities for sinks
//!
//! Shared functionality across all sink types.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Errors surfaced by sinks
///
/// Transient I/O failures carry the path they occurred on; the file sink
/// reacts to them by routing the affected message to fallback and
/// retrying on the next message.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Configuration rejected at construction
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to create the destination directory
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open a destination file
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to a destination file
    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Flush requested while no destination file is open
    #[error("no open writer for {path}")]
    NoWriter { path: PathBuf },

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Metrics for the file sink
///
/// Plain atomic counters; the sink exposes an `Arc` to them so the
/// embedding runtime can report snapshots without a global registry.
#[derive(Debug, Default)]
pub struct FileSinkMetrics {
    /// Messages accepted into a batch buffer
    pub messages_buffered: AtomicU64,

    /// Messages written to disk
    pub messages_written: AtomicU64,

    /// Payload bytes written to disk
    pub bytes_written: AtomicU64,

    /// Messages routed to the fallback stage
    pub messages_fallback: AtomicU64,

    /// Flush operations that wrote at least one message
    pub flushes: AtomicU64,

    /// File rotations performed
    pub rotations: AtomicU64,

    /// Write or open errors encountered
    pub write_errors: AtomicU64,
}

impl FileSinkMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            messages_buffered: AtomicU64::new(0),
            messages_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            messages_fallback: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    /// Record a message accepted into a batch buffer
    #[inline]
    pub fn message_buffered(&self) {
        self.messages_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed flush
    #[inline]
    pub fn flush_written(&self, messages: u64, bytes: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.messages_written.fetch_add(messages, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a message routed to fallback
    #[inline]
    pub fn message_fallback(&self) {
        self.messages_fallback.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a file rotation
    #[inline]
    pub fn rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write or open error
    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_buffered: self.messages_buffered.load(Ordering::Relaxed),
            messages_written: self.messages_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            messages_fallback: self.messages_fallback.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of file sink metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub messages_buffered: u64,
    pub messages_written: u64,
    pub bytes_written: u64,
    pub messages_fallback: u64,
    pub flushes: u64,
    pub rotations: u64,
    pub write_errors: u64,
}
