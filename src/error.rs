//! Error types for watcher operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur while constructing or running a watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The target directory does not exist.
    #[error("directory not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The target path exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A glob pattern failed to compile.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatcherError {
    /// Portable error code for the platform-independent failure cases.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotFound(_) => Some("ENOENT"),
            Self::NotADirectory(_) => Some("ENOTDIR"),
            Self::Io(err) if err.kind() == std::io::ErrorKind::NotFound => Some("ENOENT"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_codes() {
        assert_eq!(WatcherError::NotFound("/x".into()).code(), Some("ENOENT"));
        assert_eq!(WatcherError::NotADirectory("/x".into()).code(), Some("ENOTDIR"));
        let io = WatcherError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(io.code(), None);
    }

    #[test]
    fn test_display_includes_path() {
        let err = WatcherError::NotFound(PathBuf::from("/missing/dir"));
        assert!(err.to_string().contains("/missing/dir"));
    }
}
