//! File sink configuration
//!
//! Deserializable option surface for the file sink. All fields have
//! defaults; `validate()` runs at sink construction and the sink refuses
//! to start on any rejected value.
//!
//! # Example
//!
//! ```toml
//! path = "/var/log/rill/*.log"
//! permissions = "0644"
//!
//! [batch]
//! max_count = 8192
//! flush_count = 4096
//! timeout_sec = 5
//!
//! [rotation]
//! enable = true
//! size_mb = 1024
//! at = "00:00"
//! compress = true
//!
//! [prune]
//! count = 30
//! ```

use std::fmt::Write as _;
use std::time::Duration;

use chrono::Local;
use serde::Deserialize;

use crate::common::SinkError;

/// File sink configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    /// Path of the log file to write. The wildcard character `*` can be
    /// used as a placeholder for the stream name, in the directory, base
    /// name or extension.
    /// Default: "/var/log/rill.log"
    pub path: String,

    /// Truncate the file on open instead of appending
    /// Default: false
    pub overwrite: bool,

    /// Octal unix mode for created files
    /// Default: "0644"
    pub permissions: String,

    /// Octal unix mode for created directories
    /// Default: "0755"
    pub folder_permissions: String,

    /// Batch buffering options
    pub batch: BatchConfig,

    /// Ceiling in seconds on the shutdown flush; 0 does not abort
    /// Default: 0
    pub flush_timeout_sec: u64,

    /// Rotation options
    pub rotation: RotationSettings,

    /// Retention options, applied after each rotation
    pub prune: PruneSettings,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: "/var/log/rill.log".into(),
            overwrite: false,
            permissions: "0644".into(),
            folder_permissions: "0755".into(),
            batch: BatchConfig::default(),
            flush_timeout_sec: 0,
            rotation: RotationSettings::default(),
            prune: PruneSettings::default(),
        }
    }
}

/// Batch buffering options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of messages buffered per destination before the
    /// ingest path blocks
    /// Default: 8192
    pub max_count: usize,

    /// Number of buffered messages that triggers a flush; clamped to
    /// `max_count`
    /// Default: 4096
    pub flush_count: usize,

    /// Seconds after the last append before an idle batch is flushed
    /// Default: 5
    pub timeout_sec: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_count: 8192,
            flush_count: 4096,
            timeout_sec: 5,
        }
    }
}

/// Rotation options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    /// Whether files rotate at all
    /// Default: false
    pub enable: bool,

    /// chrono strftime layout for the timestamp embedded in rotated
    /// file names
    /// Default: "%Y-%m-%d_%H"
    pub timestamp: String,

    /// Minutes after which an open file rotates; 0 disables
    /// Default: 1440
    pub timeout_min: u64,

    /// File size in MiB that triggers a rotation; 0 disables
    /// Default: 1024
    pub size_mb: u64,

    /// Wall-clock time of day ("HH:MM", 24h local) to rotate at; empty
    /// disables
    /// Default: ""
    pub at: String,

    /// Leading zeros for the rotation counter; 0 renders unpadded
    /// Default: 0
    pub zero_padding: usize,

    /// gzip rotated files in the background
    /// Default: false
    pub compress: bool,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            enable: false,
            timestamp: "%Y-%m-%d_%H".into(),
            timeout_min: 1440,
            size_mb: 1024,
            at: String::new(),
            zero_padding: 0,
            compress: false,
        }
    }
}

/// Retention options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PruneSettings {
    /// Keep at most this many files per destination; 0 disables
    /// Default: 0
    pub count: usize,

    /// Delete files older than this many hours; 0 disables
    /// Default: 0
    pub after_hours: u64,

    /// Keep at most this many MiB per destination; 0 disables
    /// Default: 0
    pub total_size_mb: u64,
}

impl Default for PruneSettings {
    fn default() -> Self {
        Self {
            count: 0,
            after_hours: 0,
            total_size_mb: 0,
        }
    }
}

impl FileSinkConfig {
    /// Validate the configuration
    ///
    /// Called at sink construction; any error prevents the sink from
    /// starting.
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.path.trim().is_empty() {
            return Err(SinkError::config("path must not be empty"));
        }
        if self.batch.max_count == 0 {
            return Err(SinkError::config("batch.max_count must be at least 1"));
        }
        if self.batch.timeout_sec == 0 {
            return Err(SinkError::config("batch.timeout_sec must be at least 1"));
        }
        self.file_mode()?;
        self.folder_mode()?;
        self.rotation.rotate_at()?;
        if self.rotation.enable {
            self.rotation.validate_timestamp()?;
        }
        Ok(())
    }

    /// Parsed unix mode for created files
    pub fn file_mode(&self) -> Result<u32, SinkError> {
        parse_octal_mode(&self.permissions, "permissions")
    }

    /// Parsed unix mode for created directories
    pub fn folder_mode(&self) -> Result<u32, SinkError> {
        parse_octal_mode(&self.folder_permissions, "folder_permissions")
    }

    /// Effective flush threshold, clamped to `batch.max_count`
    pub fn flush_count(&self) -> usize {
        self.batch.flush_count.min(self.batch.max_count)
    }

    /// Idle-batch flush interval
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch.timeout_sec)
    }

    /// Shutdown flush ceiling, `None` when unbounded
    pub fn flush_timeout(&self) -> Option<Duration> {
        match self.flush_timeout_sec {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl RotationSettings {
    /// Size threshold in bytes; 0 when disabled (either by `size_mb = 0`
    /// or because rotation is off entirely)
    pub fn size_bytes(&self) -> u64 {
        if self.enable {
            self.size_mb << 20
        } else {
            0
        }
    }

    /// Age threshold for an open file; `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_min {
            0 => None,
            min => Some(Duration::from_secs(min * 60)),
        }
    }

    /// Parsed wall-clock rotation trigger
    pub fn rotate_at(&self) -> Result<Option<(u32, u32)>, SinkError> {
        if self.at.is_empty() {
            return Ok(None);
        }
        let (hour, minute) = self
            .at
            .split_once(':')
            .ok_or_else(|| SinkError::config(format!("rotation.at {:?} is not HH:MM", self.at)))?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| SinkError::config(format!("rotation.at hour {:?} is not a number", hour)))?;
        let minute: u32 = minute.parse().map_err(|_| {
            SinkError::config(format!("rotation.at minute {:?} is not a number", minute))
        })?;
        if hour > 23 || minute > 59 {
            return Err(SinkError::config(format!(
                "rotation.at {:02}:{:02} is out of range",
                hour, minute
            )));
        }
        Ok(Some((hour, minute)))
    }

    fn validate_timestamp(&self) -> Result<(), SinkError> {
        if self.timestamp.is_empty() {
            return Err(SinkError::config("rotation.timestamp must not be empty"));
        }
        // chrono reports invalid layouts only when formatting; render once
        // through a fallible writer so a bad layout fails here, not later.
        let mut rendered = String::new();
        write!(&mut rendered, "{}", Local::now().format(&self.timestamp)).map_err(|_| {
            SinkError::config(format!(
                "rotation.timestamp {:?} is not a valid layout",
                self.timestamp
            ))
        })?;
        Ok(())
    }
}

fn parse_octal_mode(value: &str, field: &str) -> Result<u32, SinkError> {
    u32::from_str_radix(value, 8)
        .map_err(|_| SinkError::config(format!("{field} {value:?} is not an octal mode")))
}
