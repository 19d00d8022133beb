//! Filesystem primitives shared by both watcher engines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::error::{Result, WatcherError};
use crate::event::{FileKind, FileMeta};

/// Stat a path. `Ok(None)` means the path does not exist; other failures
/// are surfaced to the caller.
pub(crate) async fn stat(path: &Path) -> Result<Option<FileMeta>> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(Some(FileMeta::from_metadata(&metadata))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Stat with the absence policy: not-found is absence, and any other
/// failure is logged and reported as absence as well.
pub(crate) async fn stat_or_absent(path: &Path) -> Option<FileMeta> {
    match stat(path).await {
        Ok(meta) => meta,
        Err(err) => {
            warn!("stat failed for {}: {err}", path.display());
            None
        }
    }
}

/// List the immediate children of a directory.
pub(crate) async fn list_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        children.push(entry.path());
    }
    Ok(children)
}

/// Stat every immediate child and collect the initial snapshot. Children
/// that vanish between listing and stat are skipped.
pub(crate) async fn scan_children(dir: &Path) -> Result<HashMap<PathBuf, FileMeta>> {
    let mut children = HashMap::new();
    for child in list_children(dir).await? {
        if let Some(meta) = stat_or_absent(&child).await {
            children.insert(child, meta);
        }
    }
    Ok(children)
}

/// Validate that the target exists and is a directory.
pub(crate) async fn ensure_directory(path: &Path) -> Result<FileMeta> {
    match stat(path).await? {
        None => Err(WatcherError::NotFound(path.to_path_buf())),
        Some(meta) if meta.kind != FileKind::Directory => {
            Err(WatcherError::NotADirectory(path.to_path_buf()))
        }
        Some(meta) => Ok(meta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stat_not_found_is_absence() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        assert!(stat(&missing).await.unwrap().is_none());
        assert!(stat_or_absent(&missing).await.is_none());
    }

    #[tokio::test]
    async fn test_scan_children_collects_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let children = scan_children(dir.path()).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[&dir.path().join("a.txt")].kind, FileKind::File);
        assert_eq!(children[&dir.path().join("a.txt")].size, 5);
        assert_eq!(children[&dir.path().join("sub")].kind, FileKind::Directory);
    }

    #[tokio::test]
    async fn test_ensure_directory_rejects_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_directory(&file).await.unwrap_err();
        assert!(matches!(err, WatcherError::NotADirectory(_)));

        let err = ensure_directory(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, WatcherError::NotFound(_)));
    }
}
