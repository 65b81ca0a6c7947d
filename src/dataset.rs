use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::Credential;
use crate::client::AssetSource;
use crate::config::CoverPolicy;
use crate::materializer::{AssetMaterializer, AssetOrigin, AssetOutcome};
use crate::storage::AssetStore;

pub const LAST_UPDATED_FIELD: &str = "last_updated";
pub const LOCAL_PATH_FIELD: &str = "local_path";

/// Counts from one cover-rewriting pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub fetched: usize,
    pub cached: usize,
    pub failed: usize,
    /// Records without a usable cover value.
    pub skipped: usize,
}

/// One URL-bearing spot inside a cover field: the owning object and the key holding the URL.
struct CoverSlot<'a> {
    obj: &'a mut Map<String, Value>,
    key: &'static str,
}

impl CoverSlot<'_> {
    fn url(&self) -> Option<String> {
        self.obj.get(self.key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
    }

    fn apply(self, policy: CoverPolicy, local: Option<&str>) {
        let local_value = local.map_or(Value::Null, |p| Value::String(p.to_owned()));
        match (policy, local) {
            (CoverPolicy::Replace, _) | (CoverPolicy::KeepOriginal, Some(_)) => {
                self.obj.insert(self.key.to_owned(), local_value);
            }
            (CoverPolicy::KeepOriginal, None) => {}
            (CoverPolicy::Annotate, _) => {
                self.obj.insert(LOCAL_PATH_FIELD.to_owned(), local_value);
            }
        }
    }
}

/// A URL field is `{ "link": .. }`; an attachment field is `[{ "url": .. }, ..]`.
fn cover_slots(cover: &mut Value) -> Vec<CoverSlot<'_>> {
    match cover {
        Value::Object(obj) if obj.contains_key("link") => vec![CoverSlot { obj, key: "link" }],
        Value::Array(items) => items
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .filter(|o| o.contains_key("url"))
            .map(|obj| CoverSlot { obj, key: "url" })
            .collect(),
        _ => Vec::new(),
    }
}

/// Materialize every cover referenced from `data.items[*].fields.<cover_field>` and write
/// the outcome back according to `policy`. Payloads without `data.items` are left untouched.
pub async fn rewrite_covers<S, T>(
    payload: &mut Value,
    cover_field: &str,
    policy: CoverPolicy,
    materializer: &AssetMaterializer<S, T>,
    token: &Credential,
) -> RewriteSummary
where
    S: AssetSource,
    T: AssetStore,
{
    let mut summary = RewriteSummary::default();
    let Some(items) = payload.pointer_mut("/data/items").and_then(Value::as_array_mut) else {
        debug!("payload has no data.items; nothing to rewrite");
        return summary;
    };

    for item in items.iter_mut() {
        let slots = match item.get_mut("fields").and_then(|f| f.get_mut(cover_field)) {
            Some(cover) => cover_slots(cover),
            None => Vec::new(),
        };
        if slots.is_empty() {
            summary.skipped += 1;
            continue;
        }
        for slot in slots {
            let Some(url) = slot.url() else {
                summary.skipped += 1;
                continue;
            };
            let outcome = materializer.materialize(&url, token).await;
            match &outcome {
                AssetOutcome::Materialized(a) if a.origin == AssetOrigin::Cache => summary.cached += 1,
                AssetOutcome::Materialized(_) => summary.fetched += 1,
                AssetOutcome::Failed { .. } => summary.failed += 1,
            }
            slot.apply(policy, outcome.public_path());
        }
    }
    summary
}

/// Timestamp in the dataset's `last_updated` format (local time, microseconds, no offset).
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Add `last_updated` and render with two-space indentation; non-ASCII stays literal.
pub fn render_dataset(mut payload: Value, at: DateTime<Local>) -> Result<String> {
    let obj = payload.as_object_mut().context("dataset payload must be a JSON object")?;
    obj.insert(LAST_UPDATED_FIELD.to_owned(), Value::String(format_timestamp(at)));
    serde_json::to_string_pretty(&payload).context("serializing dataset")
}

/// Overwrite `path` with the stamped dataset in a single write.
pub async fn write_dataset(path: &Path, payload: Value) -> Result<()> {
    let text = render_dataset(payload, Local::now())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating output dir: {}", parent.display()))?;
    }
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("writing dataset: {}", path.display()))?;
    info!(path = %path.display(), "dataset saved");
    Ok(())
}
