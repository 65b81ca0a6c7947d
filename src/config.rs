use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";
pub const LOCAL_CONFIG_FILE: &str = "bitable-sync.toml";

/// How a materialization outcome is written back into a record's cover field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CoverPolicy {
    /// Overwrite the remote link with the local path, or null on failure.
    #[default]
    Replace,
    /// Overwrite on success, leave the remote link in place on failure.
    KeepOriginal,
    /// Never touch the remote link; add a sibling `local_path` field.
    Annotate,
}

/// Knobs for the adaptive WebP re-encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// (width, height) envelope the output must fit inside.
    pub max_dimensions: (u32, u32),
    pub quality_initial: u8,
    pub quality_floor: u8,
    pub quality_step: u8,
    /// Byte budget; only exceeded when the floor is reached.
    pub max_bytes: usize,
    /// libwebp effort, 0 (fast) ..= 6 (slow).
    pub method: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_dimensions: (800, 1200),
            quality_initial: 85,
            quality_floor: 40,
            quality_step: 5,
            max_bytes: 300 * 1024,
            method: 4,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.quality_step >= 1, "compression.quality_step must be at least 1");
        ensure!(self.quality_initial <= 100, "compression.quality_initial must be <= 100");
        ensure!(
            self.quality_floor <= self.quality_initial,
            "compression.quality_floor ({}) exceeds quality_initial ({})",
            self.quality_floor,
            self.quality_initial
        );
        ensure!(self.method <= 6, "compression.method must be within 0..=6");
        ensure!(
            self.max_dimensions.0 >= 1 && self.max_dimensions.1 >= 1,
            "compression.max_dimensions must be non-zero"
        );
        Ok(())
    }

    /// Upper bound on encode attempts for one image. An inverted range or a zero
    /// step allows only the initial encode.
    pub fn max_attempts(&self) -> u32 {
        let steps = self
            .quality_initial
            .saturating_sub(self.quality_floor)
            .checked_div(self.quality_step)
            .unwrap_or(0);
        u32::from(steps) + 1
    }
}

/// Everything one sync run needs. Loaded from defaults, then a TOML file, then
/// the environment; the CLI applies its overrides last.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub app_id: String,
    pub app_secret: String,
    /// Bitable app token (the base the table lives in).
    pub app_token: String,
    pub table_id: String,
    pub base_url: String,
    pub page_size: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub cover_field: String,
    pub cover_policy: CoverPolicy,
    pub download_images: bool,
    pub image_dir: PathBuf,
    /// Web-relative prefix written into records in place of the remote URL.
    pub public_prefix: String,
    pub output_path: PathBuf,
    pub compression: CompressionConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            app_token: String::new(),
            table_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: None,
            request_timeout_secs: None,
            cover_field: "cover".to_string(),
            cover_policy: CoverPolicy::default(),
            download_images: true,
            image_dir: PathBuf::from("public/images/books"),
            public_prefix: "/images/books".to_string(),
            output_path: PathBuf::from("public/books.json"),
            compression: CompressionConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Resolve file + environment configuration.
    ///
    /// An explicit `path` must exist. Without one, `./bitable-sync.toml` and then the
    /// platform config directory are tried, and defaults are used when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_candidates().into_iter().find(|p| p.is_file()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file: {}", path.display()))?;
        let cfg = toml::from_str(&text)
            .with_context(|| format!("parsing config file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(cfg)
    }

    /// Overlay `FEISHU_*` variables. Unset or blank variables leave the value alone.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("FEISHU_APP_ID") { self.app_id = v; }
        if let Some(v) = get("FEISHU_APP_SECRET") { self.app_secret = v; }
        if let Some(v) = get("FEISHU_BITABLE_ID") { self.app_token = v; }
        if let Some(v) = get("FEISHU_TABLE_ID") { self.table_id = v; }
        if let Some(v) = get("FEISHU_BASE_URL") { self.base_url = v; }
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_token.trim().is_empty() {
            bail!("no bitable app token configured (set app_token or FEISHU_BITABLE_ID)");
        }
        if self.table_id.trim().is_empty() {
            bail!("no table id configured (set table_id or FEISHU_TABLE_ID)");
        }
        Url::parse(&self.base_url).with_context(|| format!("invalid base_url: {}", self.base_url))?;
        ensure!(!self.cover_field.is_empty(), "cover_field must not be empty");
        if self.app_id.is_empty() || self.app_secret.is_empty() {
            warn!("app id or secret is empty; the token request will be sent as-is");
        }
        self.compression.validate()
    }
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut out = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(proj) = ProjectDirs::from("dev", "bitable-sync", "bitable-sync") {
        out.push(proj.config_dir().join("config.toml"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> SyncConfig {
        SyncConfig { app_token: "bascn1".into(), table_id: "tbl1".into(), ..SyncConfig::default() }
    }

    #[test]
    fn compression_defaults_match_documented_values() {
        let c = CompressionConfig::default();
        assert_eq!(c.max_dimensions, (800, 1200));
        assert_eq!((c.quality_initial, c.quality_floor, c.quality_step), (85, 40, 5));
        assert_eq!(c.max_bytes, 300 * 1024);
        assert_eq!(c.max_attempts(), 10);
    }

    #[test]
    fn max_attempts_tolerates_unvalidated_settings() {
        let inverted = CompressionConfig { quality_floor: 90, ..CompressionConfig::default() };
        assert!(inverted.validate().is_err());
        assert_eq!(inverted.max_attempts(), 1);

        let stuck = CompressionConfig { quality_step: 0, ..CompressionConfig::default() };
        assert!(stuck.validate().is_err());
        assert_eq!(stuck.max_attempts(), 1);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: SyncConfig = toml::from_str(
            r#"
            app_token = "bascnABC"
            table_id = "tblXYZ"
            cover_policy = "keep-original"

            [compression]
            max_dimensions = [400, 600]
            quality_floor = 50
            "#,
        )
        .unwrap();
        assert_eq!(cfg.app_token, "bascnABC");
        assert_eq!(cfg.cover_policy, CoverPolicy::KeepOriginal);
        assert_eq!(cfg.compression.max_dimensions, (400, 600));
        assert_eq!(cfg.compression.quality_floor, 50);
        assert_eq!(cfg.compression.quality_initial, 85);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.output_path, PathBuf::from("public/books.json"));
        cfg.validate().unwrap();
    }

    #[test]
    fn env_overrides_file_values_but_ignores_blanks() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FEISHU_APP_ID", "cli_a1"),
            ("FEISHU_APP_SECRET", "s3cr3t"),
            ("FEISHU_TABLE_ID", "  "),
        ]);
        let mut cfg = valid();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.app_id, "cli_a1");
        assert_eq!(cfg.app_secret, "s3cr3t");
        assert_eq!(cfg.table_id, "tbl1");
    }

    #[test]
    fn explicit_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        fs::write(&path, "app_token = \"b\"\ntable_id = \"t\"\ndownload_images = false\n").unwrap();
        let cfg = SyncConfig::from_file(&path).unwrap();
        assert!(!cfg.download_images);
        assert!(SyncConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn validation_rejects_missing_identifiers_and_bad_compression() {
        assert!(SyncConfig::default().validate().is_err());
        valid().validate().unwrap();

        let mut cfg = valid();
        cfg.compression.quality_step = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.compression.quality_floor = 90;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.base_url = "not a url".into();
        assert!(cfg.validate().is_err());
    }
}
