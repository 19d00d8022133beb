//! Directory watcher implementation.
//!
//! A `DirectoryWatcher` observes one directory's immediate children and
//! emits add/remove/change events per child. Two engines implement the
//! same observable contract: the native engine reconciles coarse OS
//! notifications through a debounced pending queue, and the polling
//! engine (see `polling`) samples metadata on a fixed interval.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{WatchConfig, WatchMode};
use crate::error::Result;
use crate::event::{FileEvent, FileEventKind, FileKind, FileMeta, WatcherEvent};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::pending::PendingQueue;
use crate::poll::PollHandle;
use crate::polling;
use crate::scan;

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Watches one directory's immediate children.
///
/// Constructed with [`DirectoryWatcher::open`]; the returned receiver
/// carries the event stream. `open` resolving successfully is the ready
/// signal: the initial scan has completed silently and the watcher is
/// alive.
pub struct DirectoryWatcher {
    inner: Arc<DirectoryInner>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.inner.path)
            .finish()
    }
}

impl DirectoryWatcher {
    /// Open a watcher on `path`.
    ///
    /// Fails with [`crate::WatcherError::NotFound`] when the target does
    /// not exist and [`crate::WatcherError::NotADirectory`] when it is not
    /// a directory. A failed open tears down everything it started.
    pub async fn open(
        path: impl AsRef<Path>,
        config: WatchConfig,
    ) -> Result<(Self, mpsc::Receiver<WatcherEvent>)> {
        let path = std::path::absolute(path.as_ref())?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let inner = match config.mode {
            WatchMode::Native => start_native(path, config, event_tx).await?,
            WatchMode::Polling => polling::start(path, config, event_tx).await?,
        };

        Ok((Self { inner }, event_rx))
    }

    /// The watched directory, resolved to an absolute path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.inner.lifecycle.get().await
    }

    /// Snapshot of the last-known metadata for every child.
    pub async fn stats(&self) -> HashMap<PathBuf, FileMeta> {
        self.inner.children.read().await.clone()
    }

    /// Stop observing, discard pending work, and clear the child map.
    /// Idempotent; resolves once all in-flight work has settled.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

/// Shared state behind every `DirectoryWatcher` handle and its tasks.
pub(crate) struct DirectoryInner {
    pub(crate) path: PathBuf,
    pub(crate) config: WatchConfig,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) children: RwLock<HashMap<PathBuf, FileMeta>>,
    event_tx: mpsc::Sender<WatcherEvent>,
    engine: Engine,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
    close_lock: Mutex<()>,
}

pub(crate) enum Engine {
    Native {
        os_watcher: StdMutex<Option<RecommendedWatcher>>,
        pending: StdMutex<PendingQueue>,
        flush_timer: StdMutex<Option<JoinHandle<()>>>,
    },
    Polling {
        pollers: Mutex<HashMap<PathBuf, PollHandle>>,
    },
}

impl DirectoryInner {
    pub(crate) fn new(
        path: PathBuf,
        config: WatchConfig,
        children: HashMap<PathBuf, FileMeta>,
        event_tx: mpsc::Sender<WatcherEvent>,
        engine: Engine,
    ) -> Arc<Self> {
        Arc::new(Self {
            path,
            config,
            lifecycle: Lifecycle::new(),
            children: RwLock::new(children),
            event_tx,
            engine,
            tasks: Mutex::new(Vec::new()),
            close_lock: Mutex::new(()),
        })
    }

    pub(crate) fn pollers(&self) -> Option<&Mutex<HashMap<PathBuf, PollHandle>>> {
        match &self.engine {
            Engine::Polling { pollers } => Some(pollers),
            Engine::Native { .. } => None,
        }
    }

    /// Emit an event to the consumer. Suppressed unless alive.
    pub(crate) async fn emit(&self, event: WatcherEvent) {
        if !self.lifecycle.is_alive().await {
            return;
        }
        if self.event_tx.send(event).await.is_err() {
            debug!("event receiver dropped for {}", self.path.display());
        }
    }

    pub(crate) async fn close(&self) {
        let _guard = self.close_lock.lock().await;
        if !self.lifecycle.dispose().await {
            return;
        }

        match &self.engine {
            Engine::Native {
                os_watcher,
                pending,
                flush_timer,
            } => {
                if let Some(mut watcher) = os_watcher.lock().unwrap().take() {
                    let _ = watcher.unwatch(&self.path);
                }
                if let Some(timer) = flush_timer.lock().unwrap().take() {
                    timer.abort();
                }
                pending.lock().unwrap().clear();
            }
            Engine::Polling { pollers } => {
                // Dropping the handles uninstalls the pollers.
                pollers.lock().await.clear();
            }
        }

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        self.children.write().await.clear();
        debug!("closed watcher for {}", self.path.display());
    }
}

async fn start_native(
    path: PathBuf,
    config: WatchConfig,
    event_tx: mpsc::Sender<WatcherEvent>,
) -> Result<Arc<DirectoryInner>> {
    scan::ensure_directory(&path).await?;

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    let mut os_watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            // Runs on notify's thread; hand off to the reconcile task.
            let _ = raw_tx.send(result);
        })?;
    os_watcher.watch(&path, RecursiveMode::NonRecursive)?;

    let children = scan::scan_children(&path).await?;

    // Notifications that raced the initial scan are already reflected in
    // the snapshot; drop them instead of reconciling twice.
    while raw_rx.try_recv().is_ok() {}

    let inner = DirectoryInner::new(
        path,
        config,
        children,
        event_tx,
        Engine::Native {
            os_watcher: StdMutex::new(Some(os_watcher)),
            pending: StdMutex::new(PendingQueue::new()),
            flush_timer: StdMutex::new(None),
        },
    );
    inner.lifecycle.make_alive().await;

    let pump = tokio::spawn(native_pump(Arc::clone(&inner), raw_rx));
    inner.tasks.lock().await.push(pump);

    debug!("watching {} with the native engine", inner.path.display());
    Ok(inner)
}

/// Consume raw OS notifications and reconcile each hinted child.
async fn native_pump(
    inner: Arc<DirectoryInner>,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
) {
    while let Some(result) = raw_rx.recv().await {
        match inner.lifecycle.get().await {
            LifecycleState::Disposed => break,
            LifecycleState::Initializing => continue,
            LifecycleState::Alive => {}
        }
        match result {
            Ok(event) => {
                for path in event.paths {
                    // The hint is advisory; only immediate children matter,
                    // and the current metadata decides what actually happened.
                    if path.parent() == Some(inner.path.as_path()) {
                        reconcile(&inner, path).await;
                    }
                }
            }
            Err(err) => inner.emit(WatcherEvent::Error(err.into())).await,
        }
    }
}

/// Compare a child's current metadata to the recorded one and queue the
/// resulting event.
async fn reconcile(inner: &Arc<DirectoryInner>, path: PathBuf) {
    let current = scan::stat_or_absent(&path).await;
    if inner.lifecycle.is_disposed().await {
        return;
    }

    let previous = inner.children.read().await.get(&path).copied();
    match (previous, current) {
        (None, Some(meta)) => {
            inner.children.write().await.insert(path.clone(), meta);
            enqueue(inner, path, FileEventKind::Added, meta);
        }
        (Some(_), Some(meta)) => {
            inner.children.write().await.insert(path.clone(), meta);
            // Directory mtime churn is not a user-visible change.
            if meta.kind != FileKind::Directory {
                enqueue(inner, path, FileEventKind::Changed, meta);
            }
        }
        (Some(previous), None) => {
            inner.children.write().await.remove(&path);
            enqueue(inner, path, FileEventKind::Removed, previous);
        }
        (None, None) => {}
    }
}

/// Queue an event and re-arm the trailing debounce timer.
fn enqueue(inner: &Arc<DirectoryInner>, path: PathBuf, kind: FileEventKind, stat: FileMeta) {
    let Engine::Native {
        pending,
        flush_timer,
        ..
    } = &inner.engine
    else {
        return;
    };

    pending.lock().unwrap().push(path, kind, stat);

    let mut timer = flush_timer.lock().unwrap();
    if let Some(previous) = timer.take() {
        previous.abort();
    }
    let delay = inner.config.debounce_delay;
    let inner = Arc::clone(inner);
    *timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        flush(&inner).await;
    }));
}

/// Emit the queued batch. The queue is cleared before emission starts.
async fn flush(inner: &Arc<DirectoryInner>) {
    if !inner.lifecycle.is_alive().await {
        return;
    }
    let Engine::Native { pending, .. } = &inner.engine else {
        return;
    };

    let batch = pending.lock().unwrap().drain();
    for (path, event) in batch {
        inner
            .emit(WatcherEvent::file(event.kind, FileEvent::new(path, event.stat)))
            .await;
    }
}
