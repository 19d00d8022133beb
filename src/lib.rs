//! # Vigil
//!
//! Glob-filtered filesystem watching with interchangeable engines.
//!
//! The crate turns coarse OS-level directory notifications (or periodic
//! metadata samples) into a deterministic stream of per-file
//! add/remove/change events, and composes per-directory watchers into a
//! recursive view filtered by include/exclude glob patterns.
//!
//! ## Features
//!
//! - **Two engines, one contract**: native OS change notifications or
//!   fixed-interval polling, selected by configuration
//! - **Debounced coalescing**: rapid sequences on one path collapse into
//!   a single correct event (add+remove vanishes, add+change stays add,
//!   remove+add surfaces as change)
//! - **Recursive glob watching**: sub-watchers spawn and tear down as
//!   directories come and go, pruned by exclude patterns
//! - **Lifecycle guarantees**: silent initial discovery, idempotent
//!   close, no events after close completes
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        GlobWatcher                            │
//! ├───────────────────────────────────────────────────────────────┤
//! │  GlobFilter ──► DirectoryWatcher (per directory) ──► events   │
//! │      │                  │                                     │
//! │      ▼                  ▼                                     │
//! │  base dirs      native: notify + PendingQueue                 │
//! │                 polling: per-path pollers + worker            │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod glob;
pub mod lifecycle;
mod pending;
mod poll;
mod polling;
pub mod recursive;
mod scan;
pub mod watcher;

pub use config::{GlobWatchConfig, WatchConfig, WatchMode};
pub use error::{Result, WatcherError};
pub use event::{FileEvent, FileEventKind, FileKind, FileMeta, WatcherEvent};
pub use glob::GlobFilter;
pub use lifecycle::LifecycleState;
pub use recursive::GlobWatcher;
pub use watcher::DirectoryWatcher;
