use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use crate::auth::Credential;
use crate::config::SyncConfig;
use crate::error::AssetError;

const USER_AGENT: &str = concat!("bitable-sync/", env!("CARGO_PKG_VERSION"));

/// Fetches raw image bytes for the materializer.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch_asset(&self, url: &str, token: &Credential) -> Result<Vec<u8>, AssetError>;
}

/// Thin HTTP client for the open platform: token exchange, record listing and
/// authenticated asset downloads all go through one `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct BitableClient {
    pub(crate) http: reqwest::Client,
    base: Url,
}

impl BitableClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        // a trailing slash makes `join` append instead of replacing the last segment
        let mut base = Url::parse(base_url).with_context(|| format!("invalid base url: {base_url}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(t) = timeout { builder = builder.timeout(t); }
        let http = builder.build().context("building http client")?;
        Ok(Self { http, base })
    }

    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        Self::new(&cfg.base_url, cfg.request_timeout_secs.map(Duration::from_secs))
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("building endpoint url for {path}"))
    }
}

#[async_trait]
impl AssetSource for BitableClient {
    async fn fetch_asset(&self, url: &str, token: &Credential) -> Result<Vec<u8>, AssetError> {
        let resp = self.http.get(url).bearer_auth(token.secret()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AssetError::Status { status: status.as_u16(), url: url.to_string() });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
