use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::auth::Credential;
use crate::client::AssetSource;
use crate::compress::{compress_image, CompressedImage};
use crate::config::CompressionConfig;
use crate::error::AssetError;
use crate::storage::AssetStore;

pub const ASSET_EXTENSION: &str = "webp";

/// Hex MD5 of the URL string. Depends only on the URL, never on the bytes behind it.
pub fn fingerprint(url: &str) -> String {
    hex::encode(Md5::digest(url.as_bytes()))
}

/// Cache file name for an image URL: `<fingerprint>.webp`.
pub fn cache_file_name(url: &str) -> String {
    format!("{}.{}", fingerprint(url), ASSET_EXTENSION)
}

/// Size figures of a fresh materialization, for logs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionStats {
    pub original_bytes: usize,
    pub compressed_bytes: usize,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub attempts: u32,
}

impl CompressionStats {
    fn from_image(original_bytes: usize, img: &CompressedImage) -> Self {
        Self {
            original_bytes,
            compressed_bytes: img.data.len(),
            width: img.width,
            height: img.height,
            quality: img.quality,
            attempts: img.attempts,
        }
    }

    /// Percentage saved relative to the download; 0 for an empty download.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_bytes as f64 / self.original_bytes as f64) * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOrigin {
    /// Already on disk from an earlier run; nothing was fetched.
    Cache,
    Fetched(CompressionStats),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub file_name: String,
    /// Web-relative path to substitute into the record.
    pub public_path: String,
    pub origin: AssetOrigin,
}

/// Result of materializing one reference. Failures are values, not interruptions.
#[derive(Debug)]
pub enum AssetOutcome {
    Materialized(LocalAsset),
    Failed { url: String, reason: AssetError },
}

impl AssetOutcome {
    pub fn public_path(&self) -> Option<&str> {
        match self {
            AssetOutcome::Materialized(a) => Some(&a.public_path),
            AssetOutcome::Failed { .. } => None,
        }
    }
}

/// Turns remote image references into size-bounded local WebP files.
pub struct AssetMaterializer<S, T> {
    source: S,
    store: T,
    compression: CompressionConfig,
    public_prefix: String,
}

impl<S: AssetSource, T: AssetStore> AssetMaterializer<S, T> {
    pub fn new(source: S, store: T, compression: CompressionConfig, public_prefix: impl Into<String>) -> Self {
        Self { source, store, compression, public_prefix: public_prefix.into() }
    }

    pub fn store(&self) -> &T { &self.store }

    fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), file_name)
    }

    /// Cache lookup, then fetch + compress + persist on a miss.
    pub async fn materialize(&self, url: &str, token: &Credential) -> AssetOutcome {
        match self.try_materialize(url, token).await {
            Ok(asset) => AssetOutcome::Materialized(asset),
            Err(reason) => {
                warn!(%url, error = %reason, "failed to materialize image");
                AssetOutcome::Failed { url: url.to_string(), reason }
            }
        }
    }

    async fn try_materialize(&self, url: &str, token: &Credential) -> Result<LocalAsset, AssetError> {
        let file_name = cache_file_name(url);
        let public_path = self.public_path(&file_name);

        if self.store.contains(&file_name).await? {
            debug!(file = %file_name, "image already cached");
            return Ok(LocalAsset { file_name, public_path, origin: AssetOrigin::Cache });
        }

        let raw = self.source.fetch_asset(url, token).await?;
        let original_bytes = raw.len();
        let cfg = self.compression.clone();
        let compressed = tokio::task::spawn_blocking(move || compress_image(&raw, &cfg))
            .await
            .map_err(|e| AssetError::Task(e.to_string()))??;

        self.store.put(&file_name, &compressed.data).await?;

        let stats = CompressionStats::from_image(original_bytes, &compressed);
        info!(
            file = %file_name,
            original_kb = %format!("{:.1}", stats.original_bytes as f64 / 1024.0),
            compressed_kb = %format!("{:.1}", stats.compressed_bytes as f64 / 1024.0),
            saved_pct = %format!("{:.1}", stats.reduction_percent()),
            quality = stats.quality,
            width = stats.width,
            height = stats.height,
            "downloaded and compressed image"
        );
        Ok(LocalAsset { file_name, public_path, origin: AssetOrigin::Fetched(stats) })
    }
}
