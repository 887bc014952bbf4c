//! Per-destination state
//!
//! One `DestinationState` exists per resolved output path, shared by
//! every stream that maps to it. A single mutex guards the batch buffer
//! and the writer together, so a flush and the writer-swap step of a
//! rotation can never interleave for the same destination. The lock is
//! never held across an await point; closing a writer (which may
//! compress) happens after the writer has been detached under the lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use rill_protocol::{FallbackHandle, Message, SinkLifecycle};

use crate::common::{FileSinkMetrics, SinkError};
use crate::file::batch::BatchBuffer;
use crate::file::rotation::RotationPolicy;
use crate::file::writer::{DestinationWriter, write_all};

/// State for one destination file: pending batch + open writer
pub struct DestinationState {
    key: PathBuf,
    inner: Mutex<StateInner>,
}

struct StateInner {
    writer: Option<Box<dyn DestinationWriter>>,
    batch: BatchBuffer,
    created_at: DateTime<Local>,
}

impl DestinationState {
    /// Create state for the destination `key` with an empty batch buffer
    pub fn new(key: PathBuf, batch_capacity: usize, flush_threshold: usize) -> Self {
        Self {
            key,
            inner: Mutex::new(StateInner {
                writer: None,
                batch: BatchBuffer::new(batch_capacity, flush_threshold),
                created_at: Local::now(),
            }),
        }
    }

    /// The destination key (base path) this state serves
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Consult the rotation policy against the current writer
    pub fn needs_rotate(&self, policy: &RotationPolicy, force: bool) -> bool {
        let inner = self.inner.lock();
        policy.needs_rotate(inner.writer.as_deref(), inner.created_at, force)
    }

    /// Detach the open writer, if any, leaving the slot empty
    ///
    /// The caller closes (and possibly compresses) the detached writer on
    /// a background task; no other task references it afterwards.
    pub fn detach_writer(&self) -> Option<Box<dyn DestinationWriter>> {
        self.inner.lock().writer.take()
    }

    /// Install a freshly opened writer and stamp the creation time
    pub fn install_writer(&self, writer: Box<dyn DestinationWriter>) {
        let mut inner = self.inner.lock();
        inner.writer = Some(writer);
        inner.created_at = Local::now();
    }

    /// Append a message, flushing as thresholds demand
    ///
    /// At capacity the call flushes synchronously to make room and
    /// retries; when the sink is no longer active-or-stopping the message
    /// is routed to fallback instead of blocking.
    pub fn append_or_flush(
        &self,
        msg: Message,
        lifecycle: &SinkLifecycle,
        fallback: &FallbackHandle,
        metrics: &FileSinkMetrics,
    ) {
        let mut msg = msg;
        loop {
            {
                let mut inner = self.inner.lock();
                match inner.batch.append(msg) {
                    Ok(()) => {
                        metrics.message_buffered();
                        if inner.batch.reached_size_threshold(inner.batch.flush_threshold()) {
                            if let Err(err) = self.flush_locked(&mut inner, fallback, metrics) {
                                tracing::error!(
                                    path = %self.key.display(),
                                    error = %err,
                                    "flush after append failed"
                                );
                            }
                        }
                        return;
                    }
                    Err(rejected) => msg = rejected,
                }
            }

            if !lifecycle.is_active_or_stopping() {
                metrics.message_fallback();
                fallback.try_route(msg);
                return;
            }

            // Buffer full: flush synchronously to make room, then retry.
            if let Err(err) = self.flush(fallback, metrics) {
                tracing::error!(
                    path = %self.key.display(),
                    error = %err,
                    "flush of full batch failed"
                );
            }
        }
    }

    /// Drain the batch and write it through the current writer
    pub fn flush(
        &self,
        fallback: &FallbackHandle,
        metrics: &FileSinkMetrics,
    ) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        self.flush_locked(&mut inner, fallback, metrics)
    }

    /// Flush only when the batch passed its time or size threshold
    pub fn flush_if_expired(
        &self,
        timeout: Duration,
        fallback: &FallbackHandle,
        metrics: &FileSinkMetrics,
    ) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        let threshold = inner.batch.flush_threshold();
        if inner.batch.reached_time_threshold(timeout) || inner.batch.reached_size_threshold(threshold)
        {
            self.flush_locked(&mut inner, fallback, metrics)
        } else {
            Ok(())
        }
    }

    /// Flush pending messages, then close and clear the writer
    ///
    /// Closing may compress; that part runs after the lock is released.
    pub async fn close(
        &self,
        fallback: &FallbackHandle,
        metrics: &FileSinkMetrics,
    ) -> Result<(), SinkError> {
        let (flush_result, writer) = {
            let mut inner = self.inner.lock();
            let flush_result = self.flush_locked(&mut inner, fallback, metrics);
            (flush_result, inner.writer.take())
        };

        let close_result = match writer {
            Some(writer) => writer.close().await.map_err(SinkError::Io),
            None => Ok(()),
        };

        flush_result.and(close_result)
    }

    fn flush_locked(
        &self,
        inner: &mut StateInner,
        fallback: &FallbackHandle,
        metrics: &FileSinkMetrics,
    ) -> Result<(), SinkError> {
        let items = inner.batch.drain();
        if items.is_empty() {
            return Ok(());
        }

        let Some(writer) = inner.writer.as_deref_mut() else {
            // No open file: everything drained goes to the spool rather
            // than back into the buffer, where it would pin the capacity.
            metrics.write_error();
            for msg in items {
                metrics.message_fallback();
                fallback.try_route(msg);
            }
            return Err(SinkError::NoWriter {
                path: self.key.clone(),
            });
        };

        let mut written: u64 = 0;
        let mut bytes: u64 = 0;
        let mut iter = items.into_iter();

        while let Some(msg) = iter.next() {
            match write_all(writer, msg.payload()) {
                Ok(()) => {
                    written += 1;
                    bytes += msg.len() as u64;
                }
                Err(err) => {
                    let path = writer.name().to_path_buf();
                    metrics.write_error();
                    // The failed message and everything behind it fall
                    // back; messages already written stay written.
                    metrics.message_fallback();
                    fallback.try_route(msg);
                    for rest in iter.by_ref() {
                        metrics.message_fallback();
                        fallback.try_route(rest);
                    }
                    if written > 0 {
                        metrics.flush_written(written, bytes);
                    }
                    return Err(SinkError::Write { path, source: err });
                }
            }
        }

        metrics.flush_written(written, bytes);
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
