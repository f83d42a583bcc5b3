use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use assetdag::build::last_run::LAST_RUN_FILE_PATH;
use assetdag::build::{FileLastRunStore, LastRunStore, MemoryLastRunStore};
use assetdag::fs::mock::MockFileSystem;
use assetdag::fs::{FileSystem, RealFileSystem};
use chrono::{TimeZone, Utc};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn memory_store_round_trips_and_prunes() -> TestResult {
    let mut store = MemoryLastRunStore::new();
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    assert_eq!(store.load("styles"), None);
    store.save_all(&["styles".to_string(), "scripts".to_string()], at)?;
    assert_eq!(store.load("styles"), Some(at));
    assert_eq!(store.load("scripts"), Some(at));

    store.prune(&["styles"])?;
    assert_eq!(store.load("styles"), Some(at));
    assert_eq!(store.load("scripts"), None);
    Ok(())
}

#[test]
fn file_store_writes_json_under_project_root() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let root = Path::new("/proj");
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let mut store = FileLastRunStore::open(root, fs.clone());
    assert_eq!(store.path(), root.join(LAST_RUN_FILE_PATH));
    store.save("templates", at)?;

    let raw = fs.contents(root.join(LAST_RUN_FILE_PATH)).expect("file written");
    let json: serde_json::Value = serde_json::from_slice(&raw)?;
    assert!(json.get("templates").is_some());

    let reopened = FileLastRunStore::open(root, fs);
    assert_eq!(reopened.load("templates"), Some(at));
    Ok(())
}

#[test]
fn corrupt_file_is_treated_as_empty() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let root = Path::new("/proj");
    fs.add_file(root.join(LAST_RUN_FILE_PATH), "{ not json");

    let mut store = FileLastRunStore::open(root, fs.clone());
    assert_eq!(store.load("templates"), None);

    let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
    store.save("templates", at)?;
    assert_eq!(FileLastRunStore::open(root, fs).load("templates"), Some(at));
    Ok(())
}

#[test]
fn pruning_persists() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let root = Path::new("/proj");
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let mut store = FileLastRunStore::open(root, fs.clone());
    store.save_all(&["a".to_string(), "b".to_string()], at)?;
    store.prune(&["b"])?;

    let reopened = FileLastRunStore::open(root, fs);
    assert_eq!(reopened.load("a"), None);
    assert_eq!(reopened.load("b"), Some(at));
    Ok(())
}

#[test]
fn failed_write_is_reported() {
    let fs = Arc::new(MockFileSystem::new());
    let root = Path::new("/proj");
    fs.fail_writes_to(root.join(LAST_RUN_FILE_PATH));

    let mut store = FileLastRunStore::open(root, fs);
    assert!(store.save("a", Utc::now()).is_err());
}

#[test]
fn file_store_on_disk_survives_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let at = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();

    let mut store = FileLastRunStore::open(dir.path(), fs.clone());
    store.save("images", at)?;
    assert!(dir.path().join(".assetdag").is_dir());

    let reopened = FileLastRunStore::open(dir.path(), fs);
    assert_eq!(reopened.load("images"), Some(at));
    Ok(())
}
