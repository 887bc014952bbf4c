//! Rotation policy and rotated-file naming
//!
//! The policy is a pure decision object configured once: given the state
//! of the open writer and the wall clock it answers "rotate now?", and it
//! computes the name of the next file in the rotation sequence.
//!
//! # Filename grammar
//!
//! With rotation enabled a destination's files are named
//! `<name>_<timestamp>[_<counter>]<ext>`, where the counter is chosen
//! strictly greater than every counter already present for the same
//! `<name>_<timestamp>` prefix. The `<name>_current<ext>` symlink always
//! points at the most recently opened file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::common::SinkError;
use crate::file::config::RotationSettings;
use crate::file::writer::DestinationWriter;

/// Immutable rotation decision policy for one sink
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    enabled: bool,
    timeout: Option<Duration>,
    size_bytes: u64,
    at: Option<(u32, u32)>,
    zero_pad: usize,
    compress: bool,
    timestamp_format: String,
}

impl RotationPolicy {
    /// Build the policy from validated settings
    pub fn from_settings(settings: &RotationSettings) -> Result<Self, SinkError> {
        Ok(Self {
            enabled: settings.enable,
            timeout: settings.timeout(),
            size_bytes: settings.size_bytes(),
            at: settings.rotate_at()?,
            zero_pad: settings.zero_padding,
            compress: settings.compress,
            timestamp_format: settings.timestamp.clone(),
        })
    }

    /// Whether rotation is enabled at all
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether rotated files are gzip compressed on close
    #[inline]
    pub fn compress(&self) -> bool {
        self.enabled && self.compress
    }

    /// Size threshold in bytes (0 when disabled)
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Decide whether the destination must (re)open its file
    ///
    /// A missing or inaccessible writer always rotates, independent of
    /// the `enabled` flag - that is how the sink recovers from open
    /// failures and unlinked files.
    pub fn needs_rotate<W: DestinationWriter + ?Sized>(
        &self,
        writer: Option<&W>,
        created_at: DateTime<Local>,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }

        let writer = match writer {
            Some(writer) if writer.is_accessible() => writer,
            _ => return true,
        };

        if !self.enabled {
            return false;
        }

        if self.size_bytes > 0 && writer.size() >= self.size_bytes {
            return true;
        }

        let now = Local::now();
        if let Some(timeout) = self.timeout {
            let age = now
                .signed_duration_since(created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age >= timeout {
                return true;
            }
        }

        if let Some((hour, minute)) = self.at {
            // First ingest or tick after the wall clock crosses HH:MM
            // following the file's creation.
            if let Some(trigger) = now.date_naive().and_hms_opt(hour, minute, 0) {
                if created_at.naive_local() < trigger && now.naive_local() >= trigger {
                    return true;
                }
            }
        }

        false
    }

    /// Compute the next rotated file name for `<dir>/<name><ext>`
    ///
    /// Scans `dir` once to find the highest counter already used for the
    /// current timestamp; the first file of a timestamp carries no
    /// counter.
    pub fn rotated_file_name(
        &self,
        dir: &Path,
        name: &str,
        ext: &str,
        now: DateTime<Local>,
    ) -> String {
        let timestamp = now.format(&self.timestamp_format).to_string();
        let signature = format!("{name}_{timestamp}");

        let mut next_counter: u64 = 0;
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    continue;
                };
                let Some(rest) = file_name.strip_prefix(signature.as_str()) else {
                    continue;
                };
                let counter = parse_counter(rest);
                if next_counter <= counter {
                    next_counter = counter + 1;
                }
            }
        }

        if next_counter == 0 {
            format!("{signature}{ext}")
        } else if self.zero_pad > 0 {
            format!(
                "{signature}_{next_counter:0width$}{ext}",
                width = self.zero_pad
            )
        } else {
            format!("{signature}_{next_counter}{ext}")
        }
    }
}

/// Counter embedded in a rotated file name, given the part after the
/// `<name>_<timestamp>` signature
///
/// `""` and `"<ext>"` mean the counter-less first file (0); `_<digits>`
/// parses to the counter regardless of padding.
fn parse_counter(rest: &str) -> u64 {
    let Some(rest) = rest.strip_prefix('_') else {
        return 0;
    };
    let digits: &str = &rest[..rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len())];
    digits.parse().unwrap_or(0)
}

/// Point `<dir>/<name>_current<ext>` at `target_file` atomically
///
/// The symlink is created under a temporary name and renamed over the
/// real one; failures are logged, never fatal.
pub fn update_current_symlink(dir: &Path, name: &str, ext: &str, target_file: &str) {
    let link = dir.join(format!("{name}_current{ext}"));
    let tmp = dir.join(format!("{name}_current{ext}.tmp"));

    // A leftover tmp link from a crashed run would fail the symlink call.
    let _ = fs::remove_file(&tmp);

    if let Err(err) = std::os::unix::fs::symlink(target_file, &tmp) {
        tracing::warn!(link = %link.display(), error = %err, "failed to stage current symlink");
        return;
    }
    if let Err(err) = fs::rename(&tmp, &link) {
        tracing::warn!(link = %link.display(), error = %err, "failed to update current symlink");
    }
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod rotation_test;
