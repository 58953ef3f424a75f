//! Shared scratch directory and its working-directory marker files
//!
//! Agent processes drop `claude-*-cwd` marker files into the scratch root.
//! Several processes share the root, so a send snapshots the markers before
//! spawning and only deletes markers that appeared afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MARKER_PREFIX: &str = "claude-";
const MARKER_SUFFIX: &str = "-cwd";

const DELETE_ATTEMPTS: u32 = 3;
const DELETE_BACKOFF: Duration = Duration::from_millis(200);

/// Whether a file name is a working-directory marker
pub fn is_marker(name: &str) -> bool {
    name.len() > MARKER_PREFIX.len() + MARKER_SUFFIX.len()
        && name.starts_with(MARKER_PREFIX)
        && name.ends_with(MARKER_SUFFIX)
}

/// Create the scratch root if needed and return it
pub async fn prepare(root: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(root).await?;
    Ok(root.to_path_buf())
}

/// Names of marker files currently present in `dir`
///
/// An unreadable or missing directory yields an empty set.
pub async fn snapshot_markers(dir: &Path) -> HashSet<String> {
    let mut markers = HashSet::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Scratch dir not readable");
            return markers;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if let Some(name) = entry.file_name().to_str() {
                    if is_marker(name) {
                        markers.insert(name.to_string());
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Stopped scanning scratch dir");
                break;
            }
        }
    }

    markers
}

/// Delete marker files not present in `preserved`
///
/// Returns the number of files removed.
pub async fn cleanup_markers(dir: &Path, preserved: &HashSet<String>) -> usize {
    let current = snapshot_markers(dir).await;
    let mut removed = 0;

    for name in current.difference(preserved) {
        if delete_with_retry(&dir.join(name)).await {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "Cleaned up scratch markers");
    }
    removed
}

/// Remove a file, retrying with exponential backoff to ride out transient locks
async fn delete_with_retry(path: &Path) -> bool {
    for attempt in 0..DELETE_ATTEMPTS {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) => {
                if attempt + 1 == DELETE_ATTEMPTS {
                    tracing::warn!(
                        path = %path.display(),
                        attempts = DELETE_ATTEMPTS,
                        error = %e,
                        "Failed to delete scratch marker"
                    );
                } else {
                    tokio::time::sleep(DELETE_BACKOFF * 2u32.pow(attempt)).await;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_marker() {
        assert!(is_marker("claude-a1b2-cwd"));
        assert!(!is_marker("claude--cwd"));
        assert!(!is_marker("claude-a1b2-cwd.bak"));
        assert!(!is_marker("other-a1b2-cwd"));
    }

    #[tokio::test]
    async fn test_prepare_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("scratch");

        let prepared = prepare(&root).await.unwrap();
        assert_eq!(prepared, root);
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_snapshot_ignores_other_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("claude-1-cwd"), "/a").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let markers = snapshot_markers(tmp.path()).await;
        assert_eq!(markers.len(), 1);
        assert!(markers.contains("claude-1-cwd"));
    }

    #[tokio::test]
    async fn test_snapshot_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let markers = snapshot_markers(&tmp.path().join("missing")).await;
        assert!(markers.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_preserves_pre_existing_markers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("claude-sibling-cwd"), "/a").unwrap();

        let preserved = snapshot_markers(tmp.path()).await;

        // Markers written while "our" process ran
        std::fs::write(tmp.path().join("claude-ours-cwd"), "/b").unwrap();
        std::fs::write(tmp.path().join("unrelated.log"), "x").unwrap();

        let removed = cleanup_markers(tmp.path(), &preserved).await;

        assert_eq!(removed, 1);
        assert!(tmp.path().join("claude-sibling-cwd").exists());
        assert!(!tmp.path().join("claude-ours-cwd").exists());
        assert!(tmp.path().join("unrelated.log").exists());
    }
}
