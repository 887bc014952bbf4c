//! Test doubles shared by the file sink tests

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::writer::DestinationWriter;

/// In-memory destination writer
///
/// Captures everything written, with optional injected failures: writes
/// start failing after `fail_after` successful calls, and accessibility
/// can be toggled off to simulate an unlinked file.
pub(crate) struct MockWriter {
    path: PathBuf,
    data: Arc<Mutex<Vec<u8>>>,
    writes: usize,
    fail_after: Option<usize>,
    accessible: bool,
}

impl MockWriter {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Arc::new(Mutex::new(Vec::new())),
            writes: 0,
            fail_after: None,
            accessible: true,
        }
    }

    /// Fail every write after `successful` calls have gone through
    pub(crate) fn failing_after(mut self, successful: usize) -> Self {
        self.fail_after = Some(successful);
        self
    }

    /// Report the file as unreachable
    pub(crate) fn inaccessible(mut self) -> Self {
        self.accessible = false;
        self
    }

    /// Handle onto the captured bytes, usable after the writer is boxed
    pub(crate) fn data(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.data)
    }
}

#[async_trait]
impl DestinationWriter for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(limit) = self.fail_after {
            if self.writes >= limit {
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
        }
        self.writes += 1;
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn name(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    fn is_accessible(&self) -> bool {
        self.accessible
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
