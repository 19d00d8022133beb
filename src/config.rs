//! Configuration types for directory and glob watching.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default sampling interval for the polling engine.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default delay before a batch of pending events is flushed.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(200);

/// Which engine observes the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// OS change notifications, reconciled and debounced.
    Native,

    /// Fixed-interval metadata sampling.
    Polling,
}

impl Default for WatchMode {
    fn default() -> Self {
        Self::Native
    }
}

/// Configuration for a single directory watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Engine selection.
    pub mode: WatchMode,

    /// Sampling interval for the polling engine.
    pub poll_interval: Duration,

    /// Debounce delay for the native engine's pending queue.
    pub debounce_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
        }
    }
}

impl WatchConfig {
    /// Create a config using the native engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config using the polling engine.
    pub fn polling() -> Self {
        Self::default().with_mode(WatchMode::Polling)
    }

    /// Set the engine.
    pub fn with_mode(mut self, mode: WatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the debounce delay.
    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }
}

/// Configuration for a recursive glob watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobWatchConfig {
    /// Include patterns (POSIX glob syntax).
    pub includes: Vec<String>,

    /// Exclude patterns (POSIX glob syntax, without the `!` prefix).
    pub excludes: Vec<String>,

    /// Working directory relative patterns resolve against.
    pub cwd: PathBuf,

    /// Per-directory watcher configuration.
    pub watch: WatchConfig,
}

impl GlobWatchConfig {
    /// Create an empty config rooted at `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
            cwd: cwd.into(),
            watch: WatchConfig::default(),
        }
    }

    /// Build a config from a mixed pattern list where excludes carry a
    /// leading `!`, as accepted at the public API.
    pub fn from_patterns<I, S>(cwd: impl Into<PathBuf>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::new(cwd);
        for pattern in patterns {
            let pattern = pattern.into();
            match pattern.strip_prefix('!') {
                Some(exclude) => config.excludes.push(exclude.to_string()),
                None => config.includes.push(pattern),
            }
        }
        config
    }

    /// Add an include pattern.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    /// Set the per-directory watcher configuration.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.mode, WatchMode::Native);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.debounce_delay, DEFAULT_DEBOUNCE_DELAY);

        assert_eq!(WatchConfig::polling().mode, WatchMode::Polling);
    }

    #[test]
    fn test_from_patterns_splits_excludes() {
        let config =
            GlobWatchConfig::from_patterns("/work", ["**/*.rs", "!**/target/**", "src/*.toml"]);

        assert_eq!(config.includes, vec!["**/*.rs", "src/*.toml"]);
        assert_eq!(config.excludes, vec!["**/target/**"]);
        assert_eq!(config.cwd, PathBuf::from("/work"));
    }
}
