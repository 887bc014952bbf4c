//! Background gzip compression of rotated files
//!
//! A rotated file is compressed into `<name>.gz` and the original
//! removed. The copy runs in 1 MiB chunks with a scheduler yield between
//! chunks so a large rotation cannot starve the writer tasks sharing the
//! runtime.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

const CHUNK_SIZE: usize = 1 << 20;

/// Compress `source` (already open, any offset) into `<source_path>.gz`
///
/// On success the original file is removed and only the `.gz` remains.
/// On failure the partial `.gz` is removed and the original is retained
/// for the operator; exactly one of the two artifacts survives either
/// way.
pub async fn compress(mut source: std::fs::File, source_path: &Path) -> io::Result<()> {
    let mut target_name = source_path.as_os_str().to_owned();
    target_name.push(".gz");
    let target_path = Path::new(&target_name);

    let target = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(target_path)?;

    match copy_gzip(&mut source, target).await {
        Ok(()) => {
            drop(source);
            std::fs::remove_file(source_path)?;
            Ok(())
        }
        Err(err) => {
            if let Err(remove_err) = std::fs::remove_file(target_path) {
                tracing::error!(
                    path = %target_path.display(),
                    error = %remove_err,
                    "failed to remove partial compressed file"
                );
            }
            Err(err)
        }
    }
}

async fn copy_gzip(source: &mut std::fs::File, target: std::fs::File) -> io::Result<()> {
    source.seek(SeekFrom::Start(0))?;

    let mut encoder = GzEncoder::new(target, Compression::default());
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&chunk[..n])?;
        // Large files compress over many chunks; let other tasks run.
        tokio::task::yield_now().await;
    }

    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
#[path = "compress_test.rs"]
mod compress_test;
