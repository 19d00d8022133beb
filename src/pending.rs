//! Per-path pending event slots and the coalescing merge rules.
//!
//! Events are never emitted inline by the native engine. Each reconciled
//! change lands in the slot for its path, merging with whatever is already
//! queued there, and the whole queue is flushed as one batch when the
//! debounce timer fires. The merge rules keep the emitted stream causal:
//! a file that was added and removed inside one window was never announced
//! and produces nothing, an added-then-changed file is announced once with
//! its final metadata, and a removed-then-recreated file surfaces as a
//! change because the consumer already knew the path.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::event::{FileEventKind, FileMeta};

/// One queued, not-yet-emitted event for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingEvent {
    pub kind: FileEventKind,
    pub stat: FileMeta,
}

/// The pending slots for one directory watcher.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    slots: HashMap<PathBuf, PendingEvent>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for `path`, merging with any pending entry.
    pub fn push(&mut self, path: PathBuf, kind: FileEventKind, stat: FileMeta) {
        use FileEventKind::{Added, Changed, Removed};

        let Some(previous) = self.slots.get(&path).copied() else {
            self.slots.insert(path, PendingEvent { kind, stat });
            return;
        };

        let merged = match (previous.kind, kind) {
            // Never announced, so nothing to retract.
            (Added, Removed) => None,
            // Announce once, with the final metadata.
            (Added, _) => Some(PendingEvent { kind: Added, stat }),
            (Changed, Removed) => Some(PendingEvent {
                kind: Removed,
                stat,
            }),
            (Changed, _) => Some(PendingEvent {
                kind: Changed,
                stat,
            }),
            (Removed, Removed) => Some(PendingEvent {
                kind: Removed,
                stat,
            }),
            // Reappeared; the consumer already knows the path.
            (Removed, _) => Some(PendingEvent {
                kind: Changed,
                stat,
            }),
        };

        match merged {
            Some(event) => {
                self.slots.insert(path, event);
            }
            None => {
                self.slots.remove(&path);
            }
        }
    }

    /// Take the queued batch, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<(PathBuf, PendingEvent)> {
        self.slots.drain().collect()
    }

    /// Discard all pending work. Used on close.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
