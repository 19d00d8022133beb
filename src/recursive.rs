//! Recursive, glob-filtered composition of directory watchers.
//!
//! A `GlobWatcher` presents one event stream over every file matching an
//! include/exclude set. It derives watch roots from the include patterns,
//! opens a `DirectoryWatcher` per directory in the matched subtree, and
//! reacts to their events by spawning or tearing down sub-watchers and by
//! re-emitting filtered file events.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::config::GlobWatchConfig;
use crate::error::Result;
use crate::event::{FileEvent, FileKind, FileMeta, WatcherEvent};
use crate::glob::GlobFilter;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::watcher::{DirectoryWatcher, EVENT_CHANNEL_CAPACITY};

/// Unified watcher over all files matching an include/exclude set.
///
/// Constructed with [`GlobWatcher::open`]; the returned receiver carries
/// the filtered event stream. The initial file set is discovered silently:
/// consumers learn the baseline from [`GlobWatcher::stats`] after `open`
/// resolves, not from `add` events.
pub struct GlobWatcher {
    shared: Arc<GlobShared>,
}

impl std::fmt::Debug for GlobWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobWatcher").finish()
    }
}

impl GlobWatcher {
    /// Compile the patterns, open a watcher per base directory, and
    /// recursively descend into the matched subtree.
    pub async fn open(config: GlobWatchConfig) -> Result<(Self, mpsc::Receiver<WatcherEvent>)> {
        let filter = GlobFilter::new(&config.includes, &config.excludes, &config.cwd)?;
        let bases: Vec<PathBuf> = filter.base_directories().to_vec();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(GlobShared {
            config,
            filter,
            lifecycle: Lifecycle::new(),
            watchers: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            event_tx,
            tickets: AtomicU64::new(0),
            close_lock: Mutex::new(()),
        });

        for base in bases {
            if let Err(err) = Arc::clone(&shared).add_directory(base).await {
                shared.close().await;
                return Err(err);
            }
        }

        shared.lifecycle.make_alive().await;
        Ok((Self { shared }, event_rx))
    }

    /// The configuration this watcher was opened with.
    pub fn config(&self) -> &GlobWatchConfig {
        &self.shared.config
    }

    /// The compiled include/exclude predicates.
    pub fn filter(&self) -> &GlobFilter {
        &self.shared.filter
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.shared.lifecycle.get().await
    }

    /// Snapshot of the last-emitted metadata for every admitted file.
    pub async fn stats(&self) -> HashMap<PathBuf, FileMeta> {
        self.shared.files.read().await.clone()
    }

    /// Close this watcher and every child directory watcher. Idempotent;
    /// resolves after all child closes have settled.
    pub async fn close(&self) {
        self.shared.close().await;
    }
}

struct GlobShared {
    config: GlobWatchConfig,
    filter: GlobFilter,
    lifecycle: Lifecycle,
    watchers: RwLock<HashMap<PathBuf, WatcherSlot>>,
    files: RwLock<HashMap<PathBuf, FileMeta>>,
    event_tx: mpsc::Sender<WatcherEvent>,
    tickets: AtomicU64,
    close_lock: Mutex<()>,
}

enum WatcherSlot {
    /// Registered before the child watcher finishes opening so concurrent
    /// callers deduplicate. The ticket identifies this particular attempt.
    Pending(u64),
    Ready(ChildWatcher),
}

struct ChildWatcher {
    watcher: DirectoryWatcher,
    forwarder: JoinHandle<()>,
}

impl GlobShared {
    /// Recursive driver: open a child watcher for `dir` and descend into
    /// its subdirectories. Initialization failures propagate to the
    /// caller, which decides between rejecting ready (during open) and
    /// surfacing on the error stream (at runtime).
    fn add_directory(
        self: Arc<Self>,
        dir: PathBuf,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            if self.lifecycle.is_disposed().await {
                return Ok(());
            }
            if self.filter.should_skip(&dir) {
                debug!("skipping excluded subtree {}", dir.display());
                return Ok(());
            }

            let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
            {
                let mut watchers = self.watchers.write().await;
                if watchers.contains_key(&dir) {
                    return Ok(());
                }
                watchers.insert(dir.clone(), WatcherSlot::Pending(ticket));
            }

            let (watcher, events) =
                match DirectoryWatcher::open(&dir, self.config.watch.clone()).await {
                    Ok(opened) => opened,
                    Err(err) => {
                        self.release_pending(&dir, ticket).await;
                        return Err(err);
                    }
                };

            if self.lifecycle.is_disposed().await {
                self.release_pending(&dir, ticket).await;
                watcher.close().await;
                return Ok(());
            }

            let snapshot = watcher.stats().await;
            {
                let mut watchers = self.watchers.write().await;
                let still_ours =
                    matches!(watchers.get(&dir), Some(WatcherSlot::Pending(t)) if *t == ticket);
                if !still_ours {
                    // The slot was torn down while the child was opening.
                    drop(watchers);
                    watcher.close().await;
                    return Ok(());
                }
                let forwarder = tokio::spawn(forward_child_events(Arc::clone(&self), events));
                watchers.insert(
                    dir.clone(),
                    WatcherSlot::Ready(ChildWatcher { watcher, forwarder }),
                );
            }

            for (path, meta) in snapshot {
                match meta.kind {
                    FileKind::Directory => Arc::clone(&self).add_directory(path).await?,
                    FileKind::File => self.add_file(path, meta).await,
                    FileKind::Other => {}
                }
            }
            Ok(())
        })
    }

    async fn release_pending(&self, dir: &Path, ticket: u64) {
        let mut watchers = self.watchers.write().await;
        if matches!(watchers.get(dir), Some(WatcherSlot::Pending(t)) if *t == ticket) {
            watchers.remove(dir);
        }
    }

    /// Admit a file: record it and, once alive, announce it. A file that
    /// does not match at admission time is never announced and never
    /// produces change or remove later.
    async fn add_file(&self, path: PathBuf, meta: FileMeta) {
        if !self.filter.is_match(&path) {
            return;
        }
        {
            let mut files = self.files.write().await;
            if files.contains_key(&path) {
                return;
            }
            files.insert(path.clone(), meta);
        }
        self.emit(WatcherEvent::Added(FileEvent::new(path, meta))).await;
    }

    async fn remove_file(&self, path: &Path) {
        let Some(previous) = self.files.write().await.remove(path) else {
            return;
        };
        self.emit(WatcherEvent::Removed(FileEvent::new(
            path.to_path_buf(),
            previous,
        )))
        .await;
    }

    async fn change_file(&self, path: PathBuf, meta: FileMeta) {
        {
            let mut files = self.files.write().await;
            let Some(slot) = files.get_mut(&path) else {
                return;
            };
            *slot = meta;
        }
        self.emit(WatcherEvent::Changed(FileEvent::new(path, meta))).await;
    }

    /// Tear down the watcher for a removed directory: unregister it,
    /// retract every admitted entry from its snapshot, then close it and
    /// detach its forwarder.
    fn remove_directory(self: Arc<Self>, dir: &Path) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let dir = dir.to_path_buf();
        Box::pin(async move {
            let slot = self.watchers.write().await.remove(&dir);
            let child = match slot {
                Some(WatcherSlot::Ready(child)) => child,
                // A pending open notices its missing slot and closes itself.
                _ => return,
            };

            let snapshot = child.watcher.stats().await;
            for (path, meta) in snapshot {
                match meta.kind {
                    FileKind::Directory => Arc::clone(&self).remove_directory(&path).await,
                    FileKind::File => self.remove_file(&path).await,
                    FileKind::Other => {}
                }
            }

            // The child prunes its map on reconcile but emits on its
            // debounce flush; retract admitted entries it already forgot.
            let orphaned_files: Vec<PathBuf> = self
                .files
                .read()
                .await
                .keys()
                .filter(|path| path.parent() == Some(dir.as_path()))
                .cloned()
                .collect();
            for path in orphaned_files {
                self.remove_file(&path).await;
            }
            let orphaned_dirs: Vec<PathBuf> = self
                .watchers
                .read()
                .await
                .keys()
                .filter(|path| path.parent() == Some(dir.as_path()))
                .cloned()
                .collect();
            for path in orphaned_dirs {
                Arc::clone(&self).remove_directory(&path).await;
            }

            child.forwarder.abort();
            child.watcher.close().await;
        })
    }

    async fn emit(&self, event: WatcherEvent) {
        if !self.lifecycle.is_alive().await {
            return;
        }
        if self.event_tx.send(event).await.is_err() {
            debug!("event receiver dropped for glob watcher");
        }
    }

    async fn close(&self) {
        let _guard = self.close_lock.lock().await;
        if !self.lifecycle.dispose().await {
            return;
        }

        let slots: Vec<WatcherSlot> = {
            let mut watchers = self.watchers.write().await;
            watchers.drain().map(|(_, slot)| slot).collect()
        };
        self.files.write().await.clear();

        let mut closes = JoinSet::new();
        for slot in slots {
            if let WatcherSlot::Ready(child) = slot {
                child.forwarder.abort();
                closes.spawn(async move {
                    child.watcher.close().await;
                });
            }
        }
        while closes.join_next().await.is_some() {}
        debug!("closed glob watcher");
    }
}

/// Consume one child watcher's events and translate them into recursive
/// state transitions.
async fn forward_child_events(shared: Arc<GlobShared>, mut events: mpsc::Receiver<WatcherEvent>) {
    while let Some(event) = events.recv().await {
        if shared.lifecycle.is_disposed().await {
            break;
        }
        match event {
            WatcherEvent::Added(event) => match event.stat.kind {
                FileKind::Directory => {
                    if let Err(err) = Arc::clone(&shared).add_directory(event.path.clone()).await {
                        warn!(
                            "failed to descend into {}: {err}",
                            event.path.display()
                        );
                        shared.emit(WatcherEvent::Error(err)).await;
                    }
                }
                FileKind::File => shared.add_file(event.path, event.stat).await,
                FileKind::Other => {}
            },
            WatcherEvent::Removed(event) => match event.stat.kind {
                FileKind::Directory => Arc::clone(&shared).remove_directory(&event.path).await,
                FileKind::File => shared.remove_file(&event.path).await,
                FileKind::Other => {}
            },
            WatcherEvent::Changed(event) => {
                if event.stat.kind == FileKind::File {
                    shared.change_file(event.path, event.stat).await;
                }
            }
            WatcherEvent::Error(err) => shared.emit(WatcherEvent::Error(err)).await,
        }
    }
}
