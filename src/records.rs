use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::Credential;
use crate::client::BitableClient;
use crate::config::SyncConfig;

/// Which table to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub app_token: String,
    pub table_id: String,
    pub page_size: Option<u32>,
}

impl RecordQuery {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self { app_token: cfg.app_token.clone(), table_id: cfg.table_id.clone(), page_size: cfg.page_size }
    }

    fn path(&self) -> String {
        format!("open-apis/bitable/v1/apps/{}/tables/{}/records", self.app_token, self.table_id)
    }
}

impl BitableClient {
    /// Fetch the first page of records and return the decoded body as-is.
    ///
    /// Service-level errors (`code != 0`) come back as data; only transport failures and
    /// bodies that are not a non-empty JSON object are errors.
    pub async fn list_records(&self, token: &Credential, query: &RecordQuery) -> Result<Value> {
        let url = self.endpoint(&query.path())?;
        let mut req = self.http.get(url).bearer_auth(token.secret());
        if let Some(n) = query.page_size { req = req.query(&[("page_size", n)]); }
        let resp = req.send().await.context("requesting bitable records")?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("decoding bitable records response (status {status})"))?;

        match body.as_object() {
            Some(map) if !map.is_empty() => {}
            _ => bail!("bitable records response is empty or not an object (status {status})"),
        }

        let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let msg = body.get("msg").and_then(Value::as_str).unwrap_or("");
            warn!(code, msg, "bitable returned an error payload");
        }
        if body.pointer("/data/has_more").and_then(Value::as_bool) == Some(true) {
            warn!("table has more records than one page; only the first page was retrieved");
        }
        let count = body.pointer("/data/items").and_then(Value::as_array).map_or(0, Vec::len);
        info!(records = count, table = %query.table_id, "fetched bitable records");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_path_uses_configured_identifiers() {
        let cfg = SyncConfig {
            app_token: "bascnAAA".into(),
            table_id: "tblBBB".into(),
            page_size: Some(100),
            ..SyncConfig::default()
        };
        let q = RecordQuery::from_config(&cfg);
        assert_eq!(q.path(), "open-apis/bitable/v1/apps/bascnAAA/tables/tblBBB/records");
        assert_eq!(q.page_size, Some(100));
    }
}
