//! Disk-backed storage for the artifacts a job delivered.
//!
//! Artifacts are written to a temp directory as they are delivered and
//! served lazily from disk afterwards, so a finished split of a large
//! document does not stay in memory.
//!
//! Metadata (names, paths, sizes) lives behind a short synchronous lock;
//! file I/O happens outside it with `tokio::fs`. The directory is removed
//! when the store is dropped, which happens when its job is swept.

use async_trait::async_trait;
use aurora_pdf_core::{Artifact, Error, OutputSink, Result};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;
use tracing::debug;

/// One delivered artifact, as recorded on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub filename: String,
    pub media_type: &'static str,
    pub size: usize,
    pub path: PathBuf,
}

/// Output sink that keeps every artifact of one job in its own temp directory.
#[derive(Debug)]
pub struct ArtifactStore {
    /// Temp directory - auto-cleaned on drop
    dir: TempDir,
    entries: Mutex<Vec<StoredArtifact>>,
}

impl ArtifactStore {
    /// Create a store with a fresh temp directory.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        debug!("Created artifact store at {}", dir.path().display());
        Ok(Self {
            dir,
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Artifacts in delivery order.
    pub fn entries(&self) -> Vec<StoredArtifact> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The `n`th delivered artifact, 1-based.
    pub fn get(&self, n: usize) -> Option<StoredArtifact> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        n.checked_sub(1).and_then(|i| entries.get(i)).cloned()
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Path for the next artifact. The sequence prefix keeps repeated
    /// filenames from overwriting each other.
    fn next_path(&self, filename: &str) -> PathBuf {
        let n = self.len() + 1;
        self.dir.path().join(format!("{n:04}_{filename}"))
    }
}

#[async_trait]
impl OutputSink for ArtifactStore {
    async fn deliver(&self, artifact: &Artifact) -> Result<()> {
        let path = self.next_path(&artifact.filename);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| Error::Delivery {
                filename: artifact.filename.clone(),
                reason: e.to_string(),
            })?;

        debug!("Stored {} ({} bytes)", artifact.filename, artifact.len());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredArtifact {
                filename: artifact.filename.clone(),
                media_type: artifact.media_type(),
                size: artifact.len(),
                path,
            });
        Ok(())
    }

    fn keeps_artifacts(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_and_read_back() {
        let store = ArtifactStore::new().unwrap();
        store.deliver(&Artifact::new("a_part_1.pdf", b"one".to_vec())).await.unwrap();
        store.deliver(&Artifact::new("a_part_2.pdf", b"two".to_vec())).await.unwrap();

        assert_eq!(store.len(), 2);
        let second = store.get(2).unwrap();
        assert_eq!(second.filename, "a_part_2.pdf");
        assert_eq!(second.size, 3);
        assert_eq!(tokio::fs::read(&second.path).await.unwrap(), b"two");

        assert!(store.get(0).is_none());
        assert!(store.get(3).is_none());
    }

    #[tokio::test]
    async fn test_same_filename_kept_apart() {
        let store = ArtifactStore::new().unwrap();
        store.deliver(&Artifact::new("x.pdf", b"first".to_vec())).await.unwrap();
        store.deliver(&Artifact::new("x.pdf", b"second".to_vec())).await.unwrap();

        let entries = store.entries();
        assert_ne!(entries[0].path, entries[1].path);
        assert_eq!(tokio::fs::read(&entries[0].path).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_directory_removed_on_drop() {
        let store = ArtifactStore::new().unwrap();
        store.deliver(&Artifact::new("x.pdf", b"data".to_vec())).await.unwrap();
        let path = store.get(1).unwrap().path;
        assert!(path.exists());

        drop(store);
        assert!(!path.exists());
    }
}
