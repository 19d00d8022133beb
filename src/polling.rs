//! Polling engine: fixed-interval metadata sampling.
//!
//! A poller on the directory itself detects membership changes through
//! the directory mtime; each child carries its own poller for content
//! changes. All samples funnel into one worker task, which serializes
//! reconciliation passes so interleaved scans cannot produce duplicate
//! adds or removes.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::WatchConfig;
use crate::error::{Result, WatcherError};
use crate::event::{FileEvent, FileEventKind, FileKind, FileMeta, WatcherEvent};
use crate::poll::{self, PollSample};
use crate::scan;
use crate::watcher::{DirectoryInner, Engine, EVENT_CHANNEL_CAPACITY};

pub(crate) async fn start(
    path: PathBuf,
    config: WatchConfig,
    event_tx: mpsc::Sender<WatcherEvent>,
) -> Result<Arc<DirectoryInner>> {
    let root_meta = scan::ensure_directory(&path).await?;
    let children = scan::scan_children(&path).await?;

    let (sample_tx, sample_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let inner = DirectoryInner::new(
        path.clone(),
        config,
        children,
        event_tx,
        Engine::Polling {
            pollers: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        },
    );

    {
        let pollers = inner.pollers().expect("polling engine");
        let mut pollers = pollers.lock().await;
        pollers.insert(
            path.clone(),
            poll::poll_path(
                path.clone(),
                inner.config.poll_interval,
                root_meta,
                sample_tx.clone(),
            ),
        );
        for (child, meta) in inner.children.read().await.iter() {
            pollers.insert(
                child.clone(),
                poll::poll_path(
                    child.clone(),
                    inner.config.poll_interval,
                    *meta,
                    sample_tx.clone(),
                ),
            );
        }
    }

    inner.lifecycle.make_alive().await;

    let worker = tokio::spawn(poll_worker(
        Arc::clone(&inner),
        sample_rx,
        sample_tx,
        root_meta.mtime,
    ));
    inner.tasks.lock().await.push(worker);

    debug!("watching {} with the polling engine", inner.path.display());
    Ok(inner)
}

/// Single worker draining poller samples; reconciliation passes run
/// strictly one at a time.
async fn poll_worker(
    inner: Arc<DirectoryInner>,
    mut samples: mpsc::Receiver<PollSample>,
    sample_tx: mpsc::Sender<PollSample>,
    mut last_root_mtime: SystemTime,
) {
    while let Some(sample) = samples.recv().await {
        if inner.lifecycle.is_disposed().await {
            break;
        }
        if sample.path == inner.path {
            if sample.current.is_absent() {
                // Directory vanished; reconcile against the empty listing.
            } else if sample.current.mtime <= last_root_mtime {
                // Not newer than the last observation; no-op.
                continue;
            } else {
                last_root_mtime = sample.current.mtime;
            }
            reconcile_root(&inner, &sample_tx).await;
        } else {
            reconcile_child(&inner, sample).await;
        }
    }
}

/// Re-read the child name set and reconcile it against the recorded map.
async fn reconcile_root(inner: &Arc<DirectoryInner>, sample_tx: &mpsc::Sender<PollSample>) {
    let names = match scan::list_children(&inner.path).await {
        Ok(names) => names,
        Err(WatcherError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            inner.emit(WatcherEvent::Error(err)).await;
            return;
        }
    };
    if inner.lifecycle.is_disposed().await {
        return;
    }

    let known: HashSet<PathBuf> = inner.children.read().await.keys().cloned().collect();

    for child in &names {
        if known.contains(child) {
            continue;
        }
        let Some(meta) = scan::stat_or_absent(child).await else {
            // Raced away between listing and stat.
            continue;
        };
        if inner.lifecycle.is_disposed().await {
            return;
        }
        inner.children.write().await.insert(child.clone(), meta);
        if let Some(pollers) = inner.pollers() {
            pollers.lock().await.insert(
                child.clone(),
                poll::poll_path(
                    child.clone(),
                    inner.config.poll_interval,
                    meta,
                    sample_tx.clone(),
                ),
            );
        }
        inner
            .emit(WatcherEvent::file(
                FileEventKind::Added,
                FileEvent::new(child.clone(), meta),
            ))
            .await;
    }

    let name_set: HashSet<&PathBuf> = names.iter().collect();
    let removed: Vec<(PathBuf, FileMeta)> = inner
        .children
        .read()
        .await
        .iter()
        .filter(|(path, _)| !name_set.contains(path))
        .map(|(path, meta)| (path.clone(), *meta))
        .collect();

    for (path, previous) in removed {
        inner.children.write().await.remove(&path);
        if let Some(pollers) = inner.pollers() {
            pollers.lock().await.remove(&path);
        }
        inner
            .emit(WatcherEvent::file(
                FileEventKind::Removed,
                FileEvent::new(path, previous),
            ))
            .await;
    }
}

/// A child sample: non-directories whose metadata moved emit `change`.
async fn reconcile_child(inner: &Arc<DirectoryInner>, sample: PollSample) {
    if sample.current.is_absent() {
        // Removal is owned by the root reconciliation, which also carries
        // the correct previous metadata.
        return;
    }
    if !inner.children.read().await.contains_key(&sample.path) {
        return;
    }

    inner
        .children
        .write()
        .await
        .insert(sample.path.clone(), sample.current);

    // Directory mtime churn is not a user-visible change.
    if sample.current.kind == FileKind::Directory {
        return;
    }

    inner
        .emit(WatcherEvent::file(
            FileEventKind::Changed,
            FileEvent::new(sample.path, sample.current),
        ))
        .await;
}
