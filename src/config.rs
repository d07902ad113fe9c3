//! Client configuration loaded from TOML with env overrides.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::posts::SessionLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub uploads: UploadConfig,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend root, e.g. `https://waffly.example.com`.
    pub base_url: String,
    /// Per-request timeout for API calls, fetches and uploads.
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct UploadConfig {
    /// Parallel uploads to presigned URLs.
    pub concurrency: usize,
    /// Parallel downloads of a post's existing images.
    pub fetch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            uploads: UploadConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            user_agent: concat!("waffly/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_concurrency: 4,
        }
    }
}

impl Config {
    /// Default location: `<platform config dir>/waffly/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "waffle22", "waffly").map(|d| d.config_dir().join("config.toml"))
    }

    /// Load from `path` (tilde-expanded) or the default location. A missing
    /// default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let expanded = PathBuf::from(shellexpand::tilde(p).to_string());
                Self::from_file(&expanded)?
            }
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// `WAFFLY_API_URL` and `WAFFLY_UPLOAD_CONCURRENCY` win over the file.
    pub fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = get("WAFFLY_API_URL") {
            self.api.base_url = url;
        }
        if let Some(raw) = get("WAFFLY_UPLOAD_CONCURRENCY") {
            self.uploads.concurrency = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid WAFFLY_UPLOAD_CONCURRENCY: {raw}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url must not be empty");
        }
        if self.uploads.concurrency == 0 || self.uploads.fetch_concurrency == 0 {
            bail!("upload and fetch concurrency must be at least 1");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            fetch_concurrency: self.uploads.fetch_concurrency,
            upload_concurrency: self.uploads.concurrency,
        }
    }

    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
