//! Configuration loader and validator for the photo catalog.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub database: Database,
    #[serde(default)]
    pub catalog: Catalog,
    pub storage: Storage,
    #[serde(default)]
    pub cache: Cache,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    /// Overridden by `DATABASE_URL` when set.
    #[serde(default)]
    pub url: Option<String>,
    /// Delay before the single retry on a transient backend failure.
    pub retry_delay_ms: u64,
}

/// Catalog feature flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub priority_order_enabled: bool,
    pub geo_privacy_enabled: bool,
    pub blur_enabled: bool,
    pub default_limit: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            priority_order_enabled: true,
            geo_privacy_enabled: false,
            blur_enabled: true,
            default_limit: 100,
        }
    }
}

/// Blob storage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Route paths revalidated alongside cache keys, and the read cache bound.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cache {
    pub admin_paths: Vec<String>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    crate::cache::DEFAULT_MAX_ENTRIES
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            admin_paths: vec![
                "/admin/photos".into(),
                "/admin/tags".into(),
                "/admin/uploads".into(),
            ],
            max_entries: default_max_entries(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL`, then `database.url`, then a file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database.url.clone())
            .unwrap_or_else(|| format!("sqlite://{}/catalog.db", self.app.data_dir))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.database.retry_delay_ms)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if let Some(url) = &cfg.database.url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must be non-empty when set"));
        }
    }
    if cfg.catalog.default_limit == 0 {
        return Err(ConfigError::Invalid("catalog.default_limit must be > 0"));
    }
    if cfg.storage.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.base_url must be non-empty"));
    }
    if cfg.cache.admin_paths.iter().any(|p| !p.starts_with('/')) {
        return Err(ConfigError::Invalid("cache.admin_paths must be absolute paths"));
    }
    if cfg.cache.max_entries == 0 {
        return Err(ConfigError::Invalid("cache.max_entries must be > 0"));
    }
    Ok(())
}

/// Example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

database:
  retry_delay_ms: 5000

catalog:
  priority_order_enabled: true
  geo_privacy_enabled: false
  blur_enabled: true
  default_limit: 100

storage:
  base_url: "https://blob.example.com/photos/"
  token: "YOUR_STORAGE_TOKEN"

cache:
  admin_paths:
    - "/admin/photos"
    - "/admin/tags"
    - "/admin/uploads"
  max_entries: 1024
"#
}
