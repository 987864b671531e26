//! Integration tests for the logging core: file rotation, retention,
//! ring-buffer queries, and concurrent producers.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tempfile::tempdir;

use voxelscope::{Details, ErrorCategory, ErrorSeverity, LogCore, LogSettings};

fn file_settings(path: &Path, threshold: u64, backups: usize) -> LogSettings {
    LogSettings {
        file_enabled: true,
        console_enabled: false,
        file_path: path.to_path_buf(),
        rotation_threshold: threshold,
        backup_count: backups,
        ..LogSettings::default()
    }
}

fn backup_files(dir: &Path, stem: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with(stem) && n != stem)
        .collect();
    names.sort();
    names
}

#[test]
fn test_rotation_bounds_active_file_size() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("app.log");
    // Tiny threshold so a handful of records forces several rotations.
    let core = LogCore::new(file_settings(&path, 200, 3));

    let payload = "x".repeat(40);
    for i in 0..50 {
        core.log(ErrorSeverity::Info, "rotation", &format!("{} {}", i, payload));
    }
    core.shutdown();

    // One record may land after the file crosses the threshold, never more.
    let active_size = fs::metadata(&path).unwrap().len();
    assert!(
        active_size <= 200 + 200,
        "active file too large: {} bytes",
        active_size
    );
}

#[test]
fn test_retention_keeps_exactly_backup_count_files() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("app.log");
    // A 1-byte threshold rotates before every write after the first, so
    // n records produce exactly n - 1 rotations.
    let core = LogCore::new(file_settings(&path, 1, 3));

    for i in 0..10 {
        core.log(ErrorSeverity::Info, "retention", &format!("record {}", i));
    }
    core.shutdown();

    // 9 rotations, 3 retained: the newest three sequence numbers survive.
    assert_eq!(
        backup_files(dir.path(), "app.log"),
        vec!["app.log.7", "app.log.8", "app.log.9"]
    );
}

#[test]
fn test_fewer_rotations_than_backup_count_keeps_them_all() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("app.log");
    let core = LogCore::new(file_settings(&path, 1, 5));

    for i in 0..3 {
        core.log(ErrorSeverity::Info, "retention", &format!("record {}", i));
    }
    core.shutdown();

    // 2 rotations, retention 5: both backups remain.
    assert_eq!(
        backup_files(dir.path(), "app.log"),
        vec!["app.log.1", "app.log.2"]
    );
}

#[test]
fn test_rotation_resumes_after_prior_run_backups() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("app.log");
    // Backups left behind by an earlier process.
    fs::write(dir.path().join("app.log.1"), "first run, oldest\n").unwrap();
    fs::write(dir.path().join("app.log.2"), "first run, newest\n").unwrap();

    let core = LogCore::new(file_settings(&path, 1, 10));
    for i in 0..3 {
        core.log(ErrorSeverity::Info, "resume", &format!("record {}", i));
    }
    core.shutdown();

    // The new run continues at .3 instead of renaming over .1.
    let backups = backup_files(dir.path(), "app.log");
    assert_eq!(
        backups,
        vec!["app.log.1", "app.log.2", "app.log.3", "app.log.4"]
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("app.log.1")).unwrap(),
        "first run, oldest\n"
    );
}

#[test]
fn test_few_records_produce_no_backups() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("app.log");
    let core = LogCore::new(file_settings(&path, 1024 * 1024, 5));

    core.log(ErrorSeverity::Info, "small", "one");
    core.log(ErrorSeverity::Info, "small", "two");
    core.shutdown();

    assert!(backup_files(dir.path(), "app.log").is_empty());
    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[test]
fn test_query_preserves_append_order_across_severities() {
    let core = LogCore::new(LogSettings {
        file_enabled: false,
        console_enabled: false,
        ..LogSettings::default()
    });
    core.log(ErrorSeverity::Debug, "seq", "first");
    core.log(ErrorSeverity::Error, "seq", "second");
    core.log(ErrorSeverity::Info, "seq", "third");
    core.log(ErrorSeverity::Critical, "seq", "fourth");

    let all: Vec<String> = core
        .query(ErrorSeverity::Debug)
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(all, vec!["first", "second", "third", "fourth"]);

    let severe: Vec<String> = core
        .query(ErrorSeverity::Error)
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(severe, vec!["second", "fourth"]);
}

#[test]
fn test_query_filtered_by_category() {
    let core = LogCore::new(LogSettings {
        file_enabled: false,
        console_enabled: false,
        ..LogSettings::default()
    });
    let hw = voxelscope::ApplicationError::new("tracker fault")
        .with_category(ErrorCategory::Hardware);
    let net = voxelscope::ApplicationError::new("link down")
        .with_category(ErrorCategory::Network);
    core.log_with(ErrorSeverity::Error, "cat", "hw", None, Some(hw));
    core.log_with(ErrorSeverity::Error, "cat", "net", None, Some(net));
    core.log(ErrorSeverity::Error, "cat", "plain");

    let hardware = core.query_filtered(ErrorSeverity::Debug, Some(ErrorCategory::Hardware));
    assert_eq!(hardware.len(), 1);
    assert_eq!(hardware[0].message, "hw");
}

#[test]
fn test_concurrent_producers_lose_no_records() {
    let core = Arc::new(LogCore::new(LogSettings {
        file_enabled: false,
        console_enabled: false,
        buffer_capacity: 10_000,
        ..LogSettings::default()
    }));

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let core = Arc::clone(&core);
            thread::spawn(move || {
                for i in 0..100 {
                    core.log_with(
                        ErrorSeverity::Info,
                        "producer",
                        &format!("t{} m{}", t, i),
                        Some(Details::new().with("thread", t)),
                        None,
                    );
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(core.query(ErrorSeverity::Debug).len(), 800);
}

#[test]
fn test_set_file_path_redirects_subsequent_records() {
    let dir = tempdir().expect("Failed to create temp directory");
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");
    let core = LogCore::new(file_settings(&first, 1024 * 1024, 5));

    core.log(ErrorSeverity::Info, "redirect", "before");
    core.set_file_path(&second);
    core.log(ErrorSeverity::Info, "redirect", "after");
    core.shutdown();

    assert!(fs::read_to_string(&first).unwrap().contains("before"));
    let moved = fs::read_to_string(&second).unwrap();
    assert!(moved.contains("after"));
    assert!(!moved.contains("before"));
}
