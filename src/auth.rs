use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::BitableClient;

const TOKEN_PATH: &str = "open-apis/auth/v3/tenant_access_token/internal";

/// Tenant access token. Lives for one run and is never written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }

    pub fn secret(&self) -> &str { &self.0 }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<u64>,
}

impl BitableClient {
    /// Exchange app credentials for a tenant access token.
    ///
    /// Transport and decoding failures are errors. A well-formed reply that carries no
    /// token (bad secret, disabled app) is `Ok(None)` so the caller decides what to do.
    pub async fn tenant_access_token(&self, app_id: &str, app_secret: &str) -> Result<Option<Credential>> {
        let url = self.endpoint(TOKEN_PATH)?;
        let resp = self
            .http
            .post(url)
            .json(&TokenRequest { app_id, app_secret })
            .send()
            .await
            .context("requesting tenant access token")?;
        let status = resp.status();
        let body: TokenResponse = resp
            .json()
            .await
            .with_context(|| format!("decoding tenant access token response (status {status})"))?;

        match body.tenant_access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                debug!(expire_secs = ?body.expire, "obtained tenant access token");
                Ok(Some(Credential::new(token)))
            }
            None => {
                warn!(code = ?body.code, msg = body.msg.as_deref().unwrap_or(""), "token endpoint returned no token");
                Ok(None)
            }
        }
    }
}
