//! Retention pruning of rotated files
//!
//! After each rotation the sink schedules a sweep over the destination's
//! files, applying up to three retention policies in a fixed order: by
//! age, by count, by total size. Only regular files whose names start
//! with the destination's base name are considered; the `_current`
//! symlink and unrelated files are never touched.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::file::config::PruneSettings;

/// Retention sweeper for one sink
///
/// Cheap to clone; each rotation spawns a sweep on a background task.
#[derive(Debug, Clone)]
pub struct Pruner {
    max_count: usize,
    max_age: Option<Duration>,
    max_total_bytes: u64,
}

impl Pruner {
    /// Build the pruner, reserving headroom for the currently-open file
    ///
    /// When both a total-size budget and a rotation size threshold are
    /// configured, the threshold is subtracted from the budget so the
    /// open file fits. A budget that cannot fit even one rotated file
    /// degrades to keep-one-file.
    pub fn from_settings(settings: &PruneSettings, rotation_size_bytes: u64) -> Self {
        let mut max_count = settings.count;
        let mut max_total_bytes = settings.total_size_mb << 20;

        if max_total_bytes > 0 && rotation_size_bytes > 0 {
            if max_total_bytes > rotation_size_bytes {
                max_total_bytes -= rotation_size_bytes;
            } else {
                max_count = 1;
                max_total_bytes = 0;
            }
        }

        Self {
            max_count,
            max_age: match settings.after_hours {
                0 => None,
                hours => Some(Duration::from_secs(hours * 3600)),
            },
            max_total_bytes,
        }
    }

    /// Whether any retention policy is active
    pub fn is_enabled(&self) -> bool {
        self.max_count > 0 || self.max_age.is_some() || self.max_total_bytes > 0
    }

    /// Apply every enabled policy over files matching `base_path`
    ///
    /// `base_path` is the destination key `<dir>/<name><ext>`; matching
    /// files share the `<name>` prefix. Per-file deletion failures are
    /// logged and do not stop the sweep.
    pub fn prune(&self, base_path: &Path) {
        if let Some(max_age) = self.max_age {
            self.prune_by_age(base_path, max_age);
        }
        if self.max_count > 0 {
            self.prune_by_count(base_path, self.max_count);
        }
        if self.max_total_bytes > 0 {
            self.prune_to_size(base_path, self.max_total_bytes);
        }
    }

    fn prune_by_age(&self, base_path: &Path, max_age: Duration) {
        let cutoff = SystemTime::now() - max_age;
        for entry in list_matching(base_path) {
            if entry.modified >= cutoff {
                break;
            }
            remove(&entry.path);
        }
    }

    fn prune_by_count(&self, base_path: &Path, max_count: usize) {
        let entries = list_matching(base_path);
        if entries.len() <= max_count {
            return;
        }
        for entry in &entries[..entries.len() - max_count] {
            remove(&entry.path);
        }
    }

    fn prune_to_size(&self, base_path: &Path, max_total_bytes: u64) {
        let entries = list_matching(base_path);
        let mut total: u64 = entries.iter().map(|e| e.size).sum();

        for entry in &entries {
            if total <= max_total_bytes {
                return;
            }
            if remove(&entry.path) {
                total -= entry.size;
            }
        }
    }
}

struct MatchedFile {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Regular files in the destination directory sharing the destination's
/// base name, sorted by modification time ascending
fn list_matching(base_path: &Path) -> Vec<MatchedFile> {
    let dir = match base_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base_name = base_name_of(base_path);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(dir = %dir.display(), error = %err, "failed to list files for pruning");
            return Vec::new();
        }
    };

    let mut matched = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !file_name.starts_with(&base_name) {
            continue;
        }
        // metadata() here does not follow symlinks, so the `_current`
        // link never qualifies as a regular file.
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        matched.push(MatchedFile {
            path: entry.path(),
            modified,
            size: metadata.len(),
        });
    }

    matched.sort_by_key(|file| file.modified);
    matched
}

/// Base name (without extension) of the destination key
fn base_name_of(base_path: &Path) -> String {
    let file_name = base_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name[..dot].to_string(),
        _ => file_name,
    }
}

fn remove(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "pruned");
            true
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to prune");
            false
        }
    }
}

#[cfg(test)]
#[path = "prune_test.rs"]
mod prune_test;
