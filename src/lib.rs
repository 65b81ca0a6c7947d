pub mod auth;
pub mod client;
pub mod compress;
pub mod config;
pub mod dataset;
pub mod error;
pub mod materializer;
pub mod records;
pub mod storage;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::auth::Credential;
    pub use crate::client::{AssetSource, BitableClient};
    pub use crate::compress::{compress_image, CompressedImage};
    pub use crate::config::{CompressionConfig, CoverPolicy, SyncConfig};
    pub use crate::dataset::RewriteSummary;
    pub use crate::error::AssetError;
    pub use crate::materializer::{AssetMaterializer, AssetOrigin, AssetOutcome, LocalAsset};
    pub use crate::storage::{AssetStore, DirStore};
    pub use crate::{BitableSync, SyncReport};
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::auth::Credential;
use crate::client::BitableClient;
use crate::config::SyncConfig;
use crate::dataset::{rewrite_covers, write_dataset, RewriteSummary};
use crate::materializer::AssetMaterializer;
use crate::records::RecordQuery;
use crate::storage::DirStore;

/// What one sync run did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub records: usize,
    /// `None` when image downloading is disabled.
    pub covers: Option<RewriteSummary>,
    pub output_path: PathBuf,
}

/// Library entry point. Owns the configuration and the HTTP client for one run.
pub struct BitableSync {
    config: SyncConfig,
    client: BitableClient,
}

impl BitableSync {
    /// Validate `config` and build the client. Does not touch the network.
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let client = BitableClient::from_config(&config)?;
        Ok(Self { config, client })
    }

    /// Acquire the run's credential; a missing token is fatal.
    pub async fn credential(&self) -> Result<Credential> {
        self.client
            .tenant_access_token(&self.config.app_id, &self.config.app_secret)
            .await?
            .context("failed to obtain tenant access token")
    }

    /// Credential + first page of records, untouched.
    pub async fn fetch_records(&self) -> Result<(Credential, Value)> {
        let token = self.credential().await?;
        let records = self
            .client
            .list_records(&token, &RecordQuery::from_config(&self.config))
            .await
            .context("failed to fetch records")?;
        Ok((token, records))
    }

    /// Full pipeline: records → cover materialization (optional) → dataset file.
    pub async fn run(&self) -> Result<SyncReport> {
        let (token, mut records) = self.fetch_records().await?;
        let count = records.pointer("/data/items").and_then(Value::as_array).map_or(0, Vec::len);

        let covers = if self.config.download_images {
            let store = DirStore::open(&self.config.image_dir)
                .await
                .with_context(|| format!("creating image dir: {}", self.config.image_dir.display()))?;
            let materializer = AssetMaterializer::new(
                self.client.clone(),
                store,
                self.config.compression.clone(),
                self.config.public_prefix.clone(),
            );
            let summary = rewrite_covers(
                &mut records,
                &self.config.cover_field,
                self.config.cover_policy,
                &materializer,
                &token,
            )
            .await;
            info!(
                fetched = summary.fetched,
                cached = summary.cached,
                failed = summary.failed,
                skipped = summary.skipped,
                "cover images processed"
            );
            Some(summary)
        } else {
            None
        };

        write_dataset(&self.config.output_path, records).await?;
        Ok(SyncReport { records: count, covers, output_path: self.config.output_path.clone() })
    }
}
