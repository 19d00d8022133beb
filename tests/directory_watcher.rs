//! End-to-end scenarios for the directory watcher engines.
//!
//! Timings assume the default 200 ms debounce; every scenario waits a
//! 700 ms settle window before asserting on the drained event stream.

use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use vigil::{
    DirectoryWatcher, FileEvent, FileEventKind, FileKind, LifecycleState, WatchConfig,
    WatcherError, WatcherEvent,
};

const SETTLE: Duration = Duration::from_millis(700);

async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

/// Drain every buffered file event, discarding errors.
fn drain(events: &mut mpsc::Receiver<WatcherEvent>) -> Vec<(FileEventKind, FileEvent)> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let (Some(kind), Some(file)) = (event.kind(), event.file_event()) {
            out.push((kind, file.clone()));
        }
    }
    out
}

#[tokio::test]
async fn test_add_one_file() {
    let root = TempDir::new().unwrap();
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(root.path().join("hello.txt"), b"Hello").unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Added);
    assert_eq!(event.path, root.path().join("hello.txt"));
    assert_eq!(event.stat.kind, FileKind::File);
    assert_eq!(event.stat.size, 5);

    watcher.close().await;
}

#[tokio::test]
async fn test_add_one_directory() {
    let root = TempDir::new().unwrap();
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::create_dir(root.path().join("hello")).unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Added);
    assert_eq!(event.stat.kind, FileKind::Directory);
    assert_eq!(event.stat.size, 0);

    watcher.close().await;
}

#[tokio::test]
async fn test_remove_file_carries_previous_metadata() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    std::fs::write(&file, b"Hello").unwrap();

    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::remove_file(&file).unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Removed);
    assert_eq!(event.stat.kind, FileKind::File);
    assert_eq!(event.stat.size, 5);

    watcher.close().await;
}

#[tokio::test]
async fn test_change_file() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    std::fs::write(&file, b"Hello").unwrap();

    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(&file, b"Hello, World!").unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Changed);
    assert_eq!(event.stat.size, 13);

    watcher.close().await;
}

#[tokio::test]
async fn test_add_then_change_coalesces_to_one_add() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(&file, b"Hello").unwrap();
    std::fs::write(&file, b"Hello, World!").unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Added);
    assert_eq!(event.stat.size, 13);

    watcher.close().await;
}

#[tokio::test]
async fn test_add_then_remove_produces_nothing() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(&file, b"Hello").unwrap();
    std::fs::remove_file(&file).unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert!(batch.is_empty(), "expected no events, got {batch:?}");

    watcher.close().await;
}

#[tokio::test]
async fn test_remove_then_readd_surfaces_as_change() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    std::fs::write(&file, b"Hello").unwrap();

    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::remove_file(&file).unwrap();
    std::fs::write(&file, b"Hello").unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Changed);
    assert_eq!(event.stat.size, 5);

    watcher.close().await;
}

#[tokio::test]
async fn test_change_then_remove_native_carries_latest_metadata() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    std::fs::write(&file, b"Hello").unwrap();

    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(&file, b"Hello, World!").unwrap();
    // Let the modify notification reconcile before deleting; both events
    // still land inside one debounce window.
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::remove_file(&file).unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Removed);
    assert_eq!(event.stat.size, 13);

    watcher.close().await;
}

#[tokio::test]
async fn test_change_then_remove_polling_carries_last_sample() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    std::fs::write(&file, b"Hello").unwrap();

    let config = WatchConfig::polling().with_poll_interval(Duration::from_millis(400));
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), config).await.unwrap();

    // Both mutations land inside one polling interval, so the change is
    // never sampled and the remove carries the earlier metadata.
    std::fs::write(&file, b"Hello, World!").unwrap();
    std::fs::remove_file(&file).unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;

    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected exactly one event, got {batch:?}");
    let (kind, event) = &batch[0];
    assert_eq!(*kind, FileEventKind::Removed);
    assert_eq!(event.stat.size, 5);

    watcher.close().await;
}

#[tokio::test]
async fn test_polling_add_change_remove() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("hello.txt");
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::polling())
        .await
        .unwrap();

    std::fs::write(&file, b"Hello").unwrap();
    settle().await;
    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected one add, got {batch:?}");
    assert_eq!(batch[0].0, FileEventKind::Added);
    assert_eq!(batch[0].1.stat.size, 5);

    std::fs::write(&file, b"Hello, World!").unwrap();
    settle().await;
    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected one change, got {batch:?}");
    assert_eq!(batch[0].0, FileEventKind::Changed);
    assert_eq!(batch[0].1.stat.size, 13);

    std::fs::remove_file(&file).unwrap();
    settle().await;
    let batch = drain(&mut events);
    assert_eq!(batch.len(), 1, "expected one remove, got {batch:?}");
    assert_eq!(batch[0].0, FileEventKind::Removed);
    assert_eq!(batch[0].1.stat.size, 13);

    watcher.close().await;
}

#[tokio::test]
async fn test_parent_and_child_directories_are_isolated() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("watched");
    std::fs::create_dir(&root).unwrap();
    let child = root.join("child");
    std::fs::create_dir(&child).unwrap();

    let (watcher, mut events) = DirectoryWatcher::open(&root, WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(outer.path().join("sibling.txt"), b"outside").unwrap();
    std::fs::write(child.join("inner.txt"), b"below").unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert!(batch.is_empty(), "expected no events, got {batch:?}");

    watcher.close().await;
}

#[tokio::test]
async fn test_open_nonexistent_target_rejects_with_enoent() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("does-not-exist");

    let err = DirectoryWatcher::open(&missing, WatchConfig::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("ENOENT"));

    let err = DirectoryWatcher::open(&missing, WatchConfig::polling())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("ENOENT"));
}

#[tokio::test]
async fn test_open_file_target_rejects_with_enotdir() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("plain.txt");
    std::fs::write(&file, b"not a dir").unwrap();

    let err = DirectoryWatcher::open(&file, WatchConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WatcherError::NotADirectory(_)));
    assert_eq!(err.code(), Some("ENOTDIR"));
}

#[tokio::test]
async fn test_close_suppresses_further_events() {
    let root = TempDir::new().unwrap();
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    watcher.close().await;
    watcher.close().await;
    assert_eq!(watcher.state().await, LifecycleState::Disposed);

    std::fs::write(root.path().join("late.txt"), b"too late").unwrap();
    settle().await;

    let batch = drain(&mut events);
    assert!(batch.is_empty(), "expected no events after close, got {batch:?}");
}

#[tokio::test]
async fn test_close_discards_pending_debounced_events() {
    let root = TempDir::new().unwrap();
    let (watcher, mut events) = DirectoryWatcher::open(root.path(), WatchConfig::new())
        .await
        .unwrap();

    std::fs::write(root.path().join("hello.txt"), b"Hello").unwrap();
    // Close inside the debounce window: the queued add must be dropped.
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.close().await;
    settle().await;

    let batch = drain(&mut events);
    assert!(batch.is_empty(), "expected no events, got {batch:?}");
}
