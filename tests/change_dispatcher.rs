mod common;
use crate::common::{FakeProcessor, graph, init_tracing, site_fs, site_graph, task, with_timeout};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use assetdag::fs::FileSystem;
use assetdag::fs::RealFileSystem;
use assetdag::fs::mock::MockFileSystem;
use assetdag::types::AssetClass;
use assetdag::watch::{
    ChangeBatch, ChangeDispatcher, ChangeEvent, ChangeFilter, ChangeKind, RawChange,
    batch_channel, classify_event, coalesce, run_debounce_loop,
};
use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn coalescing_follows_the_file_lifecycle() {
    use ChangeKind::*;
    assert_eq!(coalesce(Deleted, Created), Some(Modified));
    assert_eq!(coalesce(Created, Modified), Some(Created));
    assert_eq!(coalesce(Modified, Deleted), Some(Deleted));
    assert_eq!(coalesce(Created, Deleted), None);
    assert_eq!(coalesce(Modified, Modified), Some(Modified));
}

#[test]
fn batch_keeps_one_event_per_path() {
    let mut batch = ChangeBatch::new();
    batch.push(ChangeEvent::new("src/a.css", ChangeKind::Created));
    batch.push(ChangeEvent::new("src/a.css", ChangeKind::Modified));
    batch.push(ChangeEvent::new("src/tmp.css", ChangeKind::Created));
    batch.push(ChangeEvent::new("src/tmp.css", ChangeKind::Deleted));
    batch.push(ChangeEvent::new("src/b.js", ChangeKind::Modified));

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.kind_of("src/a.css"), Some(ChangeKind::Created));
    assert_eq!(batch.kind_of("src/tmp.css"), None);
    assert_eq!(batch.paths(), vec![PathBuf::from("src/a.css"), PathBuf::from("src/b.js")]);

    let later: ChangeBatch = [ChangeEvent::new("src/b.js", ChangeKind::Deleted)]
        .into_iter()
        .collect();
    batch.merge(later);
    assert_eq!(batch.kind_of("src/b.js"), Some(ChangeKind::Deleted));
}

#[test]
fn notify_events_are_classified() {
    let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/p/a.css".into());
    assert_eq!(
        classify_event(&created),
        vec![RawChange::new("/p/a.css", ChangeKind::Created)]
    );

    let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/p/a.css".into());
    assert_eq!(classify_event(&removed)[0].kind, ChangeKind::Deleted);

    let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path("/p/old.css".into())
        .add_path("/p/new.css".into());
    assert_eq!(
        classify_event(&renamed),
        vec![
            RawChange::new("/p/old.css", ChangeKind::Deleted),
            RawChange::new("/p/new.css", ChangeKind::Created),
        ]
    );

    let written = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/p/a.css".into());
    assert_eq!(classify_event(&written)[0].kind, ChangeKind::Modified);

    let read = Event::new(EventKind::Access(AccessKind::Any)).add_path("/p/a.css".into());
    assert!(classify_event(&read).is_empty());
}

#[test]
fn filter_drops_paths_no_task_matches() {
    let p = FakeProcessor::new();
    let fs: Arc<dyn FileSystem> = Arc::new(site_fs());
    let mut filter = ChangeFilter::new("/proj", Arc::new(site_graph(&p)), fs);

    let kept = filter
        .accept(RawChange::new("/proj/src/assets/sass/main.css", ChangeKind::Modified))
        .expect("style change is kept");
    assert_eq!(kept.path, PathBuf::from("src/assets/sass/main.css"));
    assert_eq!(kept.kind, ChangeKind::Modified);

    assert!(filter.accept(RawChange::new("/proj/README.md", ChangeKind::Modified)).is_none());
    assert!(filter.accept(RawChange::new("/elsewhere/a.css", ChangeKind::Modified)).is_none());
}

#[test]
fn content_hash_drops_saves_without_changes() {
    let p = FakeProcessor::new();
    let g = graph(vec![
        task("styles", AssetClass::Style, &["src/css/**/*.css"], "public/site.css", &[], p.arc())
            .use_hash(true),
        task("scripts", AssetClass::Script, &["src/js/**/*.js"], "public/app.js", &[], p.arc()),
    ]);
    let mock = MockFileSystem::new();
    mock.add_file("/proj/src/css/main.css", "body {}");
    mock.add_file("/proj/src/js/app.js", "let a = 1;");
    let mut filter = ChangeFilter::new("/proj", Arc::new(g), Arc::new(mock.clone()));
    filter.seed_hashes();

    let touch_css = || RawChange::new("/proj/src/css/main.css", ChangeKind::Modified);
    assert!(filter.accept(touch_css()).is_none(), "identical contents are ignored");

    mock.add_file("/proj/src/css/main.css", "body { color: red }");
    assert!(filter.accept(touch_css()).is_some());
    assert!(filter.accept(touch_css()).is_none());

    // Tasks without content hashing always see modifications.
    let touch_js = RawChange::new("/proj/src/js/app.js", ChangeKind::Modified);
    assert!(filter.accept(touch_js.clone()).is_some());
    assert!(filter.accept(touch_js).is_some());

    // Deletions always pass and reset the cache.
    assert!(filter
        .accept(RawChange::new("/proj/src/css/main.css", ChangeKind::Deleted))
        .is_some());
    assert!(filter.accept(touch_css()).is_some());
}

#[tokio::test]
async fn undelivered_batches_merge_in_the_mailbox() {
    let (sender, mut receiver) = batch_channel();

    sender.deliver([ChangeEvent::new("src/a.css", ChangeKind::Modified)].into_iter().collect());
    sender.deliver([ChangeEvent::new("src/b.js", ChangeKind::Created)].into_iter().collect());
    sender.deliver(ChangeBatch::new());

    let batch = with_timeout(receiver.recv()).await.expect("a batch is pending");
    assert_eq!(batch.len(), 2);
    assert!(receiver.try_recv().is_none());

    drop(sender);
    assert!(with_timeout(receiver.recv()).await.is_none());
}

#[tokio::test]
async fn debounce_loop_coalesces_a_burst_into_one_batch() -> TestResult {
    init_tracing();
    let p = FakeProcessor::new();
    let filter = ChangeFilter::new("/proj", Arc::new(site_graph(&p)), Arc::new(site_fs()));
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let (sender, mut receiver) = batch_channel();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_debounce_loop(
        raw_rx,
        sender,
        filter,
        Duration::from_millis(50),
        cancel.clone(),
    ));

    raw_tx.send(RawChange::new("/proj/src/assets/sass/main.css", ChangeKind::Modified))?;
    raw_tx.send(RawChange::new("/proj/src/assets/js/tmp.js", ChangeKind::Created))?;
    raw_tx.send(RawChange::new("/proj/src/assets/js/tmp.js", ChangeKind::Deleted))?;
    raw_tx.send(RawChange::new("/proj/notes.txt", ChangeKind::Modified))?;
    raw_tx.send(RawChange::new("/proj/src/assets/sass/main.css", ChangeKind::Modified))?;

    let batch = with_timeout(receiver.recv()).await.expect("batch delivered");
    assert_eq!(batch.paths(), vec![PathBuf::from("src/assets/sass/main.css")]);
    assert_eq!(batch.kind_of("src/assets/sass/main.css"), Some(ChangeKind::Modified));

    cancel.cancel();
    with_timeout(handle).await?;
    Ok(())
}

#[tokio::test]
async fn windows_closing_while_busy_are_merged_for_the_next_pickup() {
    let p = FakeProcessor::new();
    let filter = ChangeFilter::new("/proj", Arc::new(site_graph(&p)), Arc::new(site_fs()));
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let (sender, mut receiver) = batch_channel();
    let cancel = CancellationToken::new();
    tokio::spawn(run_debounce_loop(
        raw_rx,
        sender,
        filter,
        Duration::from_millis(20),
        cancel.clone(),
    ));

    // Two separate windows close while nobody is receiving.
    raw_tx
        .send(RawChange::new("/proj/src/assets/sass/main.css", ChangeKind::Modified))
        .expect("loop alive");
    tokio::time::sleep(Duration::from_millis(80)).await;
    raw_tx
        .send(RawChange::new("/proj/src/templates/index.html", ChangeKind::Modified))
        .expect("loop alive");
    tokio::time::sleep(Duration::from_millis(80)).await;

    let batch = with_timeout(receiver.recv()).await.expect("merged batch");
    assert_eq!(
        batch.paths(),
        vec![
            PathBuf::from("src/assets/sass/main.css"),
            PathBuf::from("src/templates/index.html"),
        ]
    );
    assert!(receiver.try_recv().is_none());
    cancel.cancel();
}

#[tokio::test]
async fn missing_watch_root_is_a_watch_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = FakeProcessor::new();
    let g = graph(vec![task(
        "styles",
        AssetClass::Style,
        &["missing/**/*.css"],
        "public/site.css",
        &[],
        p.arc(),
    )]);

    let err = ChangeDispatcher::spawn(
        dir.path(),
        Arc::new(g),
        Arc::new(RealFileSystem),
        Duration::from_millis(20),
        CancellationToken::new(),
    )
    .unwrap_err();
    assert!(err.is_watch(), "unexpected error: {err}");
}

#[tokio::test]
async fn live_subscription_reports_relative_paths() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("src/css")).expect("mkdir");

    let p = FakeProcessor::new();
    let g = graph(vec![task(
        "styles",
        AssetClass::Style,
        &["src/css/**/*.css"],
        "public/site.css",
        &[],
        p.arc(),
    )]);

    let (dispatcher, mut changes) = ChangeDispatcher::spawn(
        dir.path(),
        Arc::new(g),
        Arc::new(RealFileSystem),
        Duration::from_millis(30),
        CancellationToken::new(),
    )
    .expect("dispatcher starts");
    assert_eq!(dispatcher.roots().len(), 1);

    std::fs::write(dir.path().join("src/css/notes.txt"), "ignored").expect("write");
    std::fs::write(dir.path().join("src/css/site.css"), "body {}").expect("write");

    let batch = with_timeout(changes.recv()).await.expect("batch delivered");
    assert!(batch.get(Path::new("src/css/site.css")).is_some(), "{batch:?}");
    assert!(batch.get(Path::new("src/css/notes.txt")).is_none());

    with_timeout(dispatcher.stop()).await;
}
