//! Configuration infrastructure
//!
//! One immutable [`AppConfig`] is loaded at startup and handed to each
//! component. The file is JSON; every section falls back to defaults so a
//! partial file is enough. API credentials are read from the environment,
//! never from the file.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::domain::catalog::{CatalogEntry, default_catalog};
use crate::domain::quota::BudgetPolicy;
use crate::infrastructure::parsing::SelectorConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub fetch: FetchConfig,
    pub api: ApiConfig,
    pub quota: QuotaConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub validation: ValidationConfig,
    pub selectors: SelectorConfig,
    /// Series to scrape, in priority order
    pub catalog: Vec<CatalogEntry>,
}

/// Catalog website settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL; listing and detail URLs are built under it
    pub base_url: String,
    /// Page fetched to harvest fresh cookies on a session refresh
    pub session_root_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Browser-like headers sent with every page request
    pub headers: BTreeMap<String, String>,
}

/// Politeness and retry policy of the page fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base^n` seconds
    pub backoff_base: u64,
    /// Used when a 429 carries no Retry-After header
    pub default_retry_after_secs: u64,
    pub session_refresh_delay_ms: u64,
    /// Hard ceiling on session refreshes within one fetch
    pub max_session_refreshes: u32,
}

/// Price API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_path: String,
    pub username_env: String,
    pub password_env: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Linear backoff step: attempt `n` waits `retry_backoff_secs * (n + 1)`
    pub retry_backoff_secs: u64,
    /// Token is renewed this long before it expires
    pub token_expiry_buffer_secs: i64,
    /// Grades requested for every item on a price refresh
    pub target_grades: Vec<String>,
    /// Pause between price API calls
    pub call_delay_ms: u64,
    /// Prices older than this are refreshed
    pub stale_after_days: i64,
}

/// Daily API quota and budget tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub daily_limit: u32,
    pub low_water_mark: u32,
    pub low_water_cap: u32,
    pub daily_floor: u32,
    pub usable_percent: u32,
}

/// Local storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding scrape progress
    pub progress_db_path: PathBuf,
    /// JSON file holding the API quota counter
    pub quota_file_path: PathBuf,
    /// sqlx URL of the catalog database
    pub catalog_database_url: String,
}

/// Record validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Treat unrecognized denominations and mint marks as errors
    pub strict: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    /// Enable JSON formatted file logs
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Log directory; defaults to `logs/` under the data directory
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    /// Module-specific filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let headers = defaults::BROWSER_HEADERS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self {
            base_url: defaults::SITE_BASE_URL.to_string(),
            session_root_url: defaults::SITE_BASE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            headers,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::REQUEST_DELAY_MIN_MS,
            max_delay_ms: defaults::REQUEST_DELAY_MAX_MS,
            max_retries: defaults::MAX_RETRIES,
            backoff_base: defaults::RETRY_BACKOFF_BASE,
            default_retry_after_secs: defaults::DEFAULT_RETRY_AFTER_SECS,
            session_refresh_delay_ms: defaults::SESSION_REFRESH_DELAY_MS,
            max_session_refreshes: defaults::MAX_RETRIES,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            token_path: defaults::API_TOKEN_PATH.to_string(),
            username_env: "PCGS_USERNAME".to_string(),
            password_env: "PCGS_PASSWORD".to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_retries: defaults::MAX_RETRIES,
            retry_backoff_secs: 2,
            token_expiry_buffer_secs: 300,
            target_grades: defaults::TARGET_GRADES.iter().map(|g| (*g).to_string()).collect(),
            call_delay_ms: 500,
            stale_after_days: 7,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let policy = BudgetPolicy::default();
        Self {
            daily_limit: defaults::API_DAILY_LIMIT,
            low_water_mark: policy.low_water_mark,
            low_water_cap: policy.low_water_cap,
            daily_floor: policy.daily_floor,
            usable_percent: policy.usable_percent,
        }
    }
}

impl QuotaConfig {
    pub const fn budget_policy(&self) -> BudgetPolicy {
        BudgetPolicy {
            low_water_mark: self.low_water_mark,
            low_water_cap: self.low_water_cap,
            daily_floor: self.daily_floor,
            usable_percent: self.usable_percent,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = ConfigManager::get_app_data_dir().unwrap_or_else(|_| PathBuf::from("data"));
        let catalog_db = data_dir.join("database").join("catalog.db");
        Self {
            progress_db_path: data_dir.join("scrape_progress.db"),
            quota_file_path: data_dir.join("api_quota.json"),
            catalog_database_url: format!("sqlite:{}", catalog_db.display()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// The configured catalog, or the built-in one when the file lists none
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        if self.catalog.is_empty() {
            default_catalog()
        } else {
            self.catalog.clone()
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);
        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR_NAME);
        Ok(data_dir)
    }

    /// Manager for the platform config file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    /// Manager for an explicit config file
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {:?}", self.config_path))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write configuration file {:?}", self.config_path))?;
        info!("Configuration saved to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "coin-catalog";
    pub const CONFIG_FILE_NAME: &str = "coin_catalog_config.json";

    pub const SITE_BASE_URL: &str = "https://www.pcgs.com/coinfacts";
    pub const USER_AGENT: &str = "BullionTracker/1.0 (Personal Collection App)";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Uniform random politeness delay before every request
    pub const REQUEST_DELAY_MIN_MS: u64 = 1000;
    pub const REQUEST_DELAY_MAX_MS: u64 = 2000;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BACKOFF_BASE: u64 = 2;
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
    pub const SESSION_REFRESH_DELAY_MS: u64 = 2000;

    pub const API_BASE_URL: &str = "https://api.pcgs.com/publicapi";
    pub const API_TOKEN_PATH: &str = "Authentication/GetToken";
    pub const API_DAILY_LIMIT: u32 = 1000;
    pub const TARGET_GRADES: &[&str] = &["MS65", "MS66", "MS67", "PR70", "MS64", "AU58"];

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "coin-catalog.log";

    pub const BROWSER_HEADERS: &[(&str, &str)] = &[
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Cache-Control", "no-cache"),
        ("Pragma", "no-cache"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Upgrade-Insecure-Requests", "1"),
    ];
}

/// URL building helper functions
pub mod utils {
    use crate::domain::catalog::CatalogEntry;
    use crate::domain::item::ExternalId;

    /// `{base}/category/{slug}/{categoryId}`
    pub fn listing_url(base_url: &str, entry: &CatalogEntry) -> String {
        format!("{}/category/{}/{}", base_url.trim_end_matches('/'), entry.slug, entry.category_id)
    }

    /// `{base}/coin/detail/{externalId}`
    pub fn detail_url(base_url: &str, external_id: ExternalId) -> String {
        format!("{}/coin/detail/{}", base_url.trim_end_matches('/'), external_id)
    }

    /// Join an API base and a relative endpoint path
    pub fn api_url(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::PriorityTier;
    use tempfile::tempdir;

    #[test]
    fn urls_follow_site_shape() {
        let entry = CatalogEntry::new("Morgan Dollars", "morgan-dollars", 53, PriorityTier::P0, 150);
        assert_eq!(
            utils::listing_url("https://www.pcgs.com/coinfacts/", &entry),
            "https://www.pcgs.com/coinfacts/category/morgan-dollars/53"
        );
        assert_eq!(
            utils::detail_url(defaults::SITE_BASE_URL, 7172),
            "https://www.pcgs.com/coinfacts/coin/detail/7172"
        );
        assert_eq!(
            utils::api_url(defaults::API_BASE_URL, "/coindetail/GetCoinFactsByGrade"),
            "https://api.pcgs.com/publicapi/coindetail/GetCoinFactsByGrade"
        );
    }

    #[test]
    fn empty_catalog_falls_back_to_builtin() {
        let config = AppConfig::default();
        assert_eq!(config.catalog().len(), default_catalog().len());
    }

    #[tokio::test]
    async fn load_creates_default_then_reads_partial_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("config.json");
        let manager = ConfigManager::with_path(&path);

        let created = manager.load_config().await?;
        assert!(path.exists());
        assert_eq!(created.fetch.max_retries, 3);

        std::fs::write(&path, r#"{ "fetch": { "max_retries": 5 }, "quota": { "daily_limit": 200 } }"#)?;
        let loaded = manager.load_config().await?;
        assert_eq!(loaded.fetch.max_retries, 5);
        assert_eq!(loaded.fetch.min_delay_ms, 1000);
        assert_eq!(loaded.quota.daily_limit, 200);
        assert_eq!(loaded.api.target_grades.len(), 6);
        assert!(!loaded.validation.strict);

        std::fs::write(&path, r#"{ "validation": { "strict": true } }"#)?;
        assert!(manager.load_config().await?.validation.strict);
        Ok(())
    }
}
