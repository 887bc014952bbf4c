//! Tests for retention pruning

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::file::config::PruneSettings;
use crate::file::prune::Pruner;

/// Create a file with contents and a modification time `age` in the past
fn aged_file(dir: &Path, name: &str, contents: &[u8], age: Duration) {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    let file = File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

fn settings(count: usize, after_hours: u64, total_size_mb: u64) -> PruneSettings {
    PruneSettings {
        count,
        after_hours,
        total_size_mb,
    }
}

#[test]
fn test_disabled_pruner_is_inert() {
    let pruner = Pruner::from_settings(&settings(0, 0, 0), 0);
    assert!(!pruner.is_enabled());
}

#[test]
fn test_prune_by_count_keeps_newest() {
    let dir = TempDir::new().unwrap();
    for (i, hours) in [5u64, 4, 3, 2, 1].iter().enumerate() {
        aged_file(
            dir.path(),
            &format!("log_200{i}.txt"),
            b"x",
            Duration::from_secs(hours * 3600),
        );
    }

    let pruner = Pruner::from_settings(&settings(2, 0, 0), 0);
    assert!(pruner.is_enabled());
    pruner.prune(&dir.path().join("log.txt"));

    let mut remaining: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["log_2003.txt", "log_2004.txt"]);
}

#[test]
fn test_prune_by_age_removes_only_expired() {
    let dir = TempDir::new().unwrap();
    aged_file(dir.path(), "log_old.txt", b"x", Duration::from_secs(3 * 3600));
    aged_file(dir.path(), "log_older.txt", b"x", Duration::from_secs(5 * 3600));
    aged_file(dir.path(), "log_new.txt", b"x", Duration::from_secs(60));

    let pruner = Pruner::from_settings(&settings(0, 2, 0), 0);
    pruner.prune(&dir.path().join("log.txt"));

    assert!(!dir.path().join("log_old.txt").exists());
    assert!(!dir.path().join("log_older.txt").exists());
    assert!(dir.path().join("log_new.txt").exists());
}

#[test]
fn test_prune_to_size_removes_oldest_first() {
    let dir = TempDir::new().unwrap();
    let chunk = vec![b'x'; 1 << 20]; // 1 MiB per file
    aged_file(dir.path(), "log_1.txt", &chunk, Duration::from_secs(400));
    aged_file(dir.path(), "log_2.txt", &chunk, Duration::from_secs(300));
    aged_file(dir.path(), "log_3.txt", &chunk, Duration::from_secs(200));
    aged_file(dir.path(), "log_4.txt", &chunk, Duration::from_secs(100));

    // Budget of 2 MiB keeps the two newest files
    let pruner = Pruner::from_settings(&settings(0, 0, 2), 0);
    pruner.prune(&dir.path().join("log.txt"));

    assert!(!dir.path().join("log_1.txt").exists());
    assert!(!dir.path().join("log_2.txt").exists());
    assert!(dir.path().join("log_3.txt").exists());
    assert!(dir.path().join("log_4.txt").exists());
}

#[test]
fn test_unrelated_files_and_symlinks_survive() {
    let dir = TempDir::new().unwrap();
    aged_file(dir.path(), "log_a.txt", b"x", Duration::from_secs(7200));
    aged_file(dir.path(), "log_b.txt", b"x", Duration::from_secs(3600));
    aged_file(dir.path(), "other.txt", b"x", Duration::from_secs(7200));
    std::os::unix::fs::symlink("log_b.txt", dir.path().join("log_current.txt")).unwrap();

    let pruner = Pruner::from_settings(&settings(1, 0, 0), 0);
    pruner.prune(&dir.path().join("log.txt"));

    assert!(!dir.path().join("log_a.txt").exists());
    assert!(dir.path().join("log_b.txt").exists());
    assert!(dir.path().join("other.txt").exists());
    assert!(
        dir.path().join("log_current.txt").symlink_metadata().is_ok(),
        "current symlink must never be pruned"
    );
}

#[test]
fn test_policies_apply_in_order() {
    let dir = TempDir::new().unwrap();
    aged_file(dir.path(), "log_1.txt", b"x", Duration::from_secs(10 * 3600));
    aged_file(dir.path(), "log_2.txt", b"x", Duration::from_secs(60));
    aged_file(dir.path(), "log_3.txt", b"x", Duration::from_secs(30));

    // Age removes log_1, then count keeps only the newest of the rest.
    let pruner = Pruner::from_settings(&settings(1, 5, 0), 0);
    pruner.prune(&dir.path().join("log.txt"));

    assert!(!dir.path().join("log_1.txt").exists());
    assert!(!dir.path().join("log_2.txt").exists());
    assert!(dir.path().join("log_3.txt").exists());
}

#[test]
fn test_size_budget_reserves_rotation_headroom() {
    // 10 MiB budget minus a 2 MiB rotation threshold leaves 8 MiB
    let pruner = Pruner::from_settings(&settings(0, 0, 10), 2 << 20);
    let dir = TempDir::new().unwrap();
    let chunk = vec![b'x'; 3 << 20];
    aged_file(dir.path(), "log_1.txt", &chunk, Duration::from_secs(300));
    aged_file(dir.path(), "log_2.txt", &chunk, Duration::from_secs(200));
    aged_file(dir.path(), "log_3.txt", &chunk, Duration::from_secs(100));

    // 9 MiB total > 8 MiB effective budget: the oldest file goes
    pruner.prune(&dir.path().join("log.txt"));
    assert!(!dir.path().join("log_1.txt").exists());
    assert!(dir.path().join("log_2.txt").exists());
    assert!(dir.path().join("log_3.txt").exists());
}

#[test]
fn test_size_budget_smaller_than_rotation_degrades_to_keep_one() {
    let dir = TempDir::new().unwrap();
    aged_file(dir.path(), "log_1.txt", b"x", Duration::from_secs(200));
    aged_file(dir.path(), "log_2.txt", b"x", Duration::from_secs(100));

    // 1 MiB budget cannot hold a 2 MiB rotated file: keep one file only
    let pruner = Pruner::from_settings(&settings(0, 0, 1), 2 << 20);
    pruner.prune(&dir.path().join("log.txt"));

    assert!(!dir.path().join("log_1.txt").exists());
    assert!(dir.path().join("log_2.txt").exists());
}
