//! Local artifact directory.

use crate::error::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory where every generated or rendered video is written.
///
/// Files are named `<uuid>.mp4` and are never removed by the service.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Returns a fresh, collision-free path for a new video.
    pub fn allocate(&self) -> PathBuf {
        self.root.join(format!("{}.mp4", Uuid::new_v4()))
    }

    /// Ensures the directory exists and then allocates a path in it.
    pub async fn allocate_in_dir(&self) -> Result<PathBuf> {
        self.ensure_dir().await?;
        Ok(self.allocate())
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new("videos")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_is_unique() {
        let store = ArtifactStore::new("videos");
        let paths: HashSet<PathBuf> = (0..100).map(|_| store.allocate()).collect();
        assert_eq!(paths.len(), 100);
        for path in &paths {
            assert!(path.starts_with("videos"));
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
        }
    }

    #[tokio::test]
    async fn test_allocate_in_dir_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("nested").join("videos"));
        let path = store.allocate_in_dir().await.unwrap();
        assert!(store.root().is_dir());
        assert!(!path.exists());
    }
}
