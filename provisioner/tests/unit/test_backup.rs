//! Backup engine tests against an in-memory device

mod common;

use std::path::Path;

use common::{FakeDevice, Op, RecordingObserver, REMOTE_HOME, USB_ADDR, WIFI_ADDR};
use rmprov::backup::engine::{BackupEngine, BackupOptions, BACKUP_DIR_PREFIX};
use rmprov::errors::ProvisionError;

const SOURCE: &str = "/data/xochitl/";

fn engine(backups_root: &Path) -> BackupEngine {
    BackupEngine::new(BackupOptions {
        source_dir: SOURCE.to_string(),
        backups_root: backups_root.to_path_buf(),
    })
}

fn device_with_documents() -> FakeDevice {
    let device = FakeDevice::new();
    device.add_file("/data/xochitl/abc.metadata", b"{\"visibleName\": \"Notes\"}");
    device.add_file("/data/xochitl/abc.content", b"{}");
    device.add_file("/data/xochitl/abc/0.rm", b"lines");
    device.add_file("/data/xochitl/abc.thumbnails/0.png", b"png");
    // outside the source, never listed
    device.add_file("/data/other/x", b"x");
    device
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_backup_mirrors_document_tree() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    let observer = RecordingObserver::default();

    let report = engine(root.path())
        .run(&common::resolver(&device), &observer)
        .await
        .unwrap();

    assert_eq!(report.discovered, 4);
    assert_eq!(report.copied, 4);
    assert_eq!(report.failed(), 0);

    let dest = &report.destination;
    assert!(dest.starts_with(root.path()));
    let dir_name = dest.file_name().unwrap().to_string_lossy().into_owned();
    assert!(dir_name.starts_with(BACKUP_DIR_PREFIX));

    assert_eq!(std::fs::read(dest.join("abc/0.rm")).unwrap(), b"lines");
    assert_eq!(std::fs::read(dest.join("abc.thumbnails/0.png")).unwrap(), b"png");
    assert_eq!(
        entries(dest),
        vec!["abc", "abc.content", "abc.metadata", "abc.thumbnails"]
    );

    assert_eq!(observer.progress().last(), Some(&100.0));
    assert!(observer
        .statuses()
        .contains(&"Copying file 1/4: abc.content".to_string()));
    assert_eq!(device.open_sessions(), 0);
}

#[tokio::test]
async fn test_backup_continues_past_failed_file() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    device.fail_get("/data/xochitl/abc.content");

    let report = engine(root.path())
        .run(&common::resolver(&device), &RecordingObserver::default())
        .await
        .unwrap();

    assert_eq!(report.discovered, 4);
    assert_eq!(report.copied, 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].remote_path, "/data/xochitl/abc.content");
    assert!(report.failures[0].reason.contains("connection reset"));

    // files after the failure were still fetched
    assert!(report.destination.join("abc.metadata").exists());
    assert!(report.destination.join("abc/0.rm").exists());
    assert!(!report.destination.join("abc.content").exists());
}

#[tokio::test]
async fn test_backups_never_share_a_directory() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    let engine = engine(root.path());
    let resolver = common::resolver(&device);

    let first = engine
        .run(&resolver, &RecordingObserver::default())
        .await
        .unwrap();
    let second = engine
        .run(&resolver, &RecordingObserver::default())
        .await
        .unwrap();

    assert_ne!(first.destination, second.destination);
    assert!(!second.destination.starts_with(&first.destination));
    assert_eq!(entries(root.path()).len(), 2);
    assert_eq!(entries(&first.destination), entries(&second.destination));
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    device.set_exec_result("find /data/xochitl -type f", 1, "find: Permission denied");

    let err = engine(root.path())
        .run(&common::resolver(&device), &RecordingObserver::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::RemoteExecutionError { .. }));
    // nothing created, nothing fetched, session released
    assert!(entries(root.path()).is_empty());
    assert!(!device.ops().iter().any(|op| matches!(op, Op::Get { .. })));
    assert_eq!(device.open_sessions(), 0);
}

#[tokio::test]
async fn test_partial_listing_is_still_copied() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    device.set_exec_output(
        "find /data/xochitl -type f",
        1,
        "/data/xochitl/abc.content\n/data/xochitl/abc.metadata\n/data/xochitl/abc/0.rm\n",
        "find: /data/xochitl/abc.thumbnails: No such file or directory",
    );

    let report = engine(root.path())
        .run(&common::resolver(&device), &RecordingObserver::default())
        .await
        .unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.copied, 3);
    assert_eq!(report.failed(), 0);
    assert_eq!(
        entries(&report.destination),
        vec!["abc", "abc.content", "abc.metadata"]
    );
    assert_eq!(device.open_sessions(), 0);
}

#[tokio::test]
async fn test_home_relative_source_dir() {
    let root = tempfile::tempdir().unwrap();
    let device = FakeDevice::new();
    let documents = format!("{REMOTE_HOME}/.local/share/remarkable/xochitl");
    device.add_file(&format!("{documents}/abc.metadata"), b"{}");
    device.add_file(&format!("{documents}/abc/0.rm"), b"lines");

    let report = BackupEngine::new(BackupOptions {
        source_dir: "~/.local/share/remarkable/xochitl/".to_string(),
        backups_root: root.path().to_path_buf(),
    })
    .run(&common::resolver(&device), &RecordingObserver::default())
    .await
    .unwrap();

    assert!(device
        .execs()
        .contains(&format!("find {documents} -type f")));
    assert_eq!(report.discovered, 2);
    assert_eq!(report.copied, 2);
    assert_eq!(std::fs::read(report.destination.join("abc/0.rm")).unwrap(), b"lines");
}

#[tokio::test]
async fn test_missing_source_dir_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    device.set_exec_result(
        "cd /data/xochitl/ && pwd -P",
        2,
        "sh: cd: can't cd to /data/xochitl/",
    );

    let err = engine(root.path())
        .run(&common::resolver(&device), &RecordingObserver::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::RemoteExecutionError { .. }));
    assert!(entries(root.path()).is_empty());
    assert!(!device.execs().iter().any(|c| c.starts_with("find ")));
    assert_eq!(device.open_sessions(), 0);
}

#[tokio::test]
async fn test_connection_failure_creates_nothing() {
    let root = tempfile::tempdir().unwrap();
    let device = device_with_documents();
    device.set_unreachable(WIFI_ADDR);
    device.set_unreachable(USB_ADDR);
    let observer = RecordingObserver::default();

    let err = engine(root.path())
        .run(&common::resolver(&device), &observer)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::ConnectionError { .. }));
    assert!(entries(root.path()).is_empty());
    assert!(observer
        .statuses()
        .last()
        .unwrap()
        .starts_with("Backup failed: "));
}

#[tokio::test]
async fn test_empty_document_store() {
    let root = tempfile::tempdir().unwrap();
    let device = FakeDevice::new();

    let report = engine(root.path())
        .run(&common::resolver(&device), &RecordingObserver::default())
        .await
        .unwrap();

    assert_eq!(report.discovered, 0);
    assert_eq!(report.copied, 0);
    assert!(report.destination.is_dir());
}
