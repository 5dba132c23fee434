use crate::cache::CacheOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DB_URL_ENV: &str = "TICKVAULT_DB_URL";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartSource {
    #[default]
    Yahoo,
    Massive,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub db: DbConfig,
    pub providers: ProvidersConfig,
    pub cache: CachesConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub reconcile_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 1_000,
            heartbeat_interval_secs: 600,
        }
    }
}

impl SchedulerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DbConfig {
    pub url: Option<String>,
    pub table: String,
    pub backend: StoreBackend,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: "chart_data".to_string(),
            backend: StoreBackend::Postgres,
        }
    }
}

impl DbConfig {
    /// `TICKVAULT_DB_URL` wins over the file value.
    pub fn resolve_url(&self) -> Result<String, String> {
        if let Ok(url) = std::env::var(DB_URL_ENV) {
            if !url.trim().is_empty() {
                return Ok(url);
            }
        }
        self.url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| format!("missing database url: set db.url or {DB_URL_ENV}"))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ProvidersConfig {
    pub chart: ChartSource,
    pub yahoo: YahooConfig,
    pub massive: KeyedProviderConfig,
    pub ninja: KeyedProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            chart: ChartSource::Yahoo,
            yahoo: YahooConfig::default(),
            massive: KeyedProviderConfig::from_env_name("MASSIVE_API_KEY"),
            ninja: KeyedProviderConfig::from_env_name("NINJA_API_KEY"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct YahooConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            user_agent: "Mozilla/5.0 (compatible; tickvault/0.1)".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Provider authenticated by an API key read from `api_key_env`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KeyedProviderConfig {
    pub base_url: Option<String>,
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl KeyedProviderConfig {
    pub fn from_env_name(api_key_env: &str) -> Self {
        Self {
            base_url: None,
            api_key_env: api_key_env.to_string(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CachesConfig {
    pub chart: CacheConfig,
    pub quote: CacheConfig,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            chart: CacheConfig::default(),
            quote: CacheConfig {
                success_ttl_secs: 8 * 60 * 60,
                ..CacheConfig::default()
            },
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// 0 keeps values until evicted.
    pub success_ttl_secs: u64,
    /// 0 disables negative caching.
    pub error_ttl_secs: u64,
    pub max_keys: usize,
    pub max_error_keys: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl_secs: 0,
            error_ttl_secs: 300,
            max_keys: 10_000,
            max_error_keys: 1_000,
        }
    }
}

impl CacheConfig {
    pub fn options(&self) -> CacheOptions {
        CacheOptions::from_secs(
            self.success_ttl_secs,
            self.error_ttl_secs,
            self.max_keys,
            self.max_error_keys,
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct WatchConfig {
    pub tickers: Vec<String>,
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), String> {
    for ticker in &config.watch.tickers {
        tickvault_domain::value_objects::ticker::validate_ticker(ticker)
            .map_err(|err| format!("invalid watch ticker: {err}"))?;
    }
    if config.cache.chart.max_keys == 0 || config.cache.quote.max_keys == 0 {
        return Err("cache max_keys must be at least 1".to_string());
    }
    Ok(())
}

pub fn to_toml_pretty(config: &Config) -> Result<String, String> {
    toml::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config as TOML: {err}"))
}
