//! Rill - Sinks
//!
//! Output sinks for the rill log/event router.
//!
//! # Architecture
//!
//! A sink receives `Message`s via a tokio channel and writes them to its
//! destination. Messages it cannot deliver are routed to the fallback
//! stage (the spooling producer) instead of being dropped.
//!
//! ```text
//! [Router] --Message--> [Sink Channel] --> [Sink Task] --> [Destination]
//!                                              |
//!                                              +--> [FallbackHandle]
//! ```
//!
//! # File Sink
//!
//! The file sink ([`FileSink`]) writes batched messages to one file per
//! resolved destination, with:
//!
//! - size-, age- and wall-clock-triggered rotation with a `_current`
//!   symlink naming the latest file
//! - asynchronous gzip compression of rotated files
//! - age / count / total-size retention pruning
//! - backpressure and fallback semantics under overload and shutdown
//!
//! # Example
//!
//! ```ignore
//! use rill_sinks::{FileSink, FileSinkConfig};
//! use rill_protocol::{FallbackHandle, MemoryStreamRegistry};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! let (tx, rx) = mpsc::channel(1000);
//! let (fallback, spool_rx) = FallbackHandle::channel(1000);
//! let registry = Arc::new(MemoryStreamRegistry::new());
//!
//! let sink = FileSink::new(FileSinkConfig::default(), registry, fallback, rx)?;
//! let controller = sink.controller();
//!
//! // Run sink (typically spawned as a task)
//! tokio::spawn(sink.run());
//! ```

/// File sink - rotating, batched file output with compression and pruning
pub mod file;

/// Common types shared by all sinks (errors, metrics)
mod common;

pub use common::{FileSinkMetrics, MetricsSnapshot, SinkError};
pub use file::config::{
    BatchConfig, FileSinkConfig, PruneSettings, RotationSettings,
};
pub use file::{FileSink, SinkCommand, SinkController};
