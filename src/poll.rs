//! Fixed-interval metadata polling primitive.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::FileMeta;
use crate::scan;

/// One (previous, current) observation from a poller. A current snapshot
/// equal to `FileMeta::ABSENT` means the path disappeared.
#[derive(Debug, Clone)]
pub(crate) struct PollSample {
    pub path: PathBuf,
    pub previous: FileMeta,
    pub current: FileMeta,
}

/// Handle to an installed per-path poller. Dropping the handle uninstalls
/// the poller.
#[derive(Debug)]
pub(crate) struct PollHandle {
    task: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Install a poller that re-stats `path` every `interval` and reports a
/// sample whenever the metadata differs from the previous observation.
pub(crate) fn poll_path(
    path: PathBuf,
    interval: Duration,
    initial: FileMeta,
    samples: mpsc::Sender<PollSample>,
) -> PollHandle {
    let task = tokio::spawn(async move {
        let mut previous = initial;
        loop {
            tokio::time::sleep(interval).await;
            let current = scan::stat_or_absent(&path)
                .await
                .unwrap_or(FileMeta::ABSENT);
            if current == previous {
                continue;
            }
            let sample = PollSample {
                path: path.clone(),
                previous,
                current,
            };
            if samples.send(sample).await.is_err() {
                // Receiver gone; the watcher was closed.
                break;
            }
            previous = current;
        }
    });
    PollHandle { task }
}
