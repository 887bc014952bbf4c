//! Destination writer abstraction
//!
//! Trait over an open output target so the per-destination state can hold
//! the production file writer or a test double behind `Box<dyn>`. The
//! production variant owns the file descriptor exclusively; closing it
//! transfers ownership to the compressor task when compress-on-close is
//! set.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::compress;

/// An open output target for one destination
///
/// `close` consumes the writer: either the descriptor is dropped, or the
/// compressor takes it over to produce `<name>.gz`.
#[async_trait]
pub trait DestinationWriter: Send {
    /// Append bytes, returning how many were written
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Absolute path of the target
    fn name(&self) -> &Path;

    /// Current length in bytes
    fn size(&self) -> u64;

    /// Probe whether the target is still reachable
    ///
    /// `false` means the file was unlinked underneath us or the
    /// filesystem is unhealthy; the rotation policy reacts by reopening.
    fn is_accessible(&self) -> bool;

    /// Close the target, compressing it first when configured
    async fn close(self: Box<Self>) -> io::Result<()>;
}

/// Write an entire buffer through a destination writer
pub fn write_all(writer: &mut dyn DestinationWriter, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = writer.write(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "destination accepted no bytes",
            ));
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// File-on-disk destination writer
///
/// Opened in append mode (or truncating when `overwrite` is set). The
/// reported size is the length found at open plus the bytes written
/// since; it only feeds rotation triggers, which need a monotonic value,
/// not a fresh stat per call.
pub struct DiskWriter {
    file: std::fs::File,
    path: PathBuf,
    size: u64,
    compress_on_close: bool,
}

impl DiskWriter {
    /// Open (creating if needed) the file at `path` with the given unix
    /// mode
    pub fn open(path: &Path, mode: u32, overwrite: bool, compress_on_close: bool) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).mode(mode);
        if overwrite {
            options.read(true).write(true).truncate(true);
        } else {
            options.read(true).append(true);
        }

        let file = options.open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            compress_on_close,
        })
    }
}

#[async_trait]
impl DestinationWriter for DiskWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = io::Write::write(&mut self.file, buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn name(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_accessible(&self) -> bool {
        std::fs::metadata(&self.path).is_ok()
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        if self.compress_on_close {
            let DiskWriter { file, path, .. } = *self;
            tracing::info!(path = %path.display(), "compressing rotated file");
            compress::compress(file, &path).await
        } else {
            // Dropping the handle closes the descriptor
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
