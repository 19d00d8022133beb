//! File events and metadata snapshots emitted by watchers.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WatcherError;

/// Kind of filesystem entry a metadata snapshot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Regular file.
    File,

    /// Directory.
    Directory,

    /// Anything else (socket, fifo, device, symlink target of unknown kind).
    Other,
}

/// An immutable metadata snapshot for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Entry kind.
    pub kind: FileKind,

    /// Size in bytes. Directories report zero; their on-disk size is
    /// filesystem noise, not content.
    pub size: u64,

    /// Last modification time.
    pub mtime: SystemTime,

    /// Device id, zero only in the absent sentinel.
    pub device: u64,

    /// Inode number, zero only in the absent sentinel.
    pub inode: u64,
}

impl FileMeta {
    /// Sentinel for a path that no longer exists. Platform pollers report a
    /// zeroed record on deletion; both ids being zero marks absence.
    pub const ABSENT: FileMeta = FileMeta {
        kind: FileKind::Other,
        size: 0,
        mtime: SystemTime::UNIX_EPOCH,
        device: 0,
        inode: 0,
    };

    /// Whether this snapshot is the absent sentinel.
    pub fn is_absent(&self) -> bool {
        self.device == 0 && self.inode == 0
    }

    /// Build a snapshot from filesystem metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let kind = if metadata.is_dir() {
            FileKind::Directory
        } else if metadata.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        let (device, inode) = device_inode(metadata);

        Self {
            kind,
            size: if kind == FileKind::Directory {
                0
            } else {
                metadata.len()
            },
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            device,
            inode,
        }
    }
}

#[cfg(unix)]
fn device_inode(metadata: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

/// Live entries must never collide with the absent sentinel.
#[cfg(not(unix))]
fn device_inode(_metadata: &std::fs::Metadata) -> (u64, u64) {
    (1, 1)
}

/// Kind of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// A child appeared.
    Added,

    /// A child disappeared. The event carries the last known metadata.
    Removed,

    /// A child's contents or metadata changed.
    Changed,
}

/// A file system event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    /// Path to the affected file or directory.
    pub path: PathBuf,

    /// Metadata snapshot carried by the event. For removals this is the
    /// last metadata observed before the path disappeared.
    pub stat: FileMeta,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new file event stamped with the current time.
    pub fn new(path: impl Into<PathBuf>, stat: FileMeta) -> Self {
        Self {
            path: path.into(),
            stat,
            timestamp: Utc::now(),
        }
    }
}

/// Message delivered on a watcher's event channel.
#[derive(Debug)]
pub enum WatcherEvent {
    /// A child appeared.
    Added(FileEvent),

    /// A child disappeared.
    Removed(FileEvent),

    /// A child changed.
    Changed(FileEvent),

    /// A runtime observation error. The watcher stays alive.
    Error(WatcherError),
}

impl WatcherEvent {
    /// Wrap a file event under the given label.
    pub fn file(kind: FileEventKind, event: FileEvent) -> Self {
        match kind {
            FileEventKind::Added => Self::Added(event),
            FileEventKind::Removed => Self::Removed(event),
            FileEventKind::Changed => Self::Changed(event),
        }
    }

    /// The file-event label, if this is not an error.
    pub fn kind(&self) -> Option<FileEventKind> {
        match self {
            Self::Added(_) => Some(FileEventKind::Added),
            Self::Removed(_) => Some(FileEventKind::Removed),
            Self::Changed(_) => Some(FileEventKind::Changed),
            Self::Error(_) => None,
        }
    }

    /// The carried file event, if this is not an error.
    pub fn file_event(&self) -> Option<&FileEvent> {
        match self {
            Self::Added(event) | Self::Removed(event) | Self::Changed(event) => Some(event),
            Self::Error(_) => None,
        }
    }
}
