use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Where materialized assets live. The cache is the store itself: presence of a
/// name means the asset was fully written by an earlier materialization.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn contains(&self, name: &str) -> io::Result<bool>;
    async fn put(&self, name: &str, data: &[u8]) -> io::Result<()>;
}

/// Flat directory of `<fingerprint>.webp` files.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open `root`, creating it (and parents) if needed.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn path_for(&self, name: &str) -> PathBuf { self.root.join(name) }

    fn partial_path_for(&self, name: &str) -> PathBuf { self.root.join(format!("{name}.part")) }
}

#[async_trait]
impl AssetStore for DirStore {
    async fn contains(&self, name: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.path_for(name)).await
    }

    /// Writes to `<name>.part` and renames it into place, so an interrupted write
    /// never shows up as a cached entry.
    async fn put(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let partial = self.partial_path_for(name);
        let written = match tokio::fs::write(&partial, data).await {
            Ok(()) => tokio::fs::rename(&partial, self.path_for(name)).await,
            Err(e) => Err(e),
        };
        if written.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        written
    }
}
