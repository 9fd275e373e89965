use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the listing crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote site addressing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Site origin, used for warm-up, Referer/Origin and absolute listing URLs
    pub base_url: String,

    /// Root of the JSON search API
    pub api_base: String,

    /// Path segment between the API root and the neighborhood slug
    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    /// Value stored in the `source` column of every listing
    #[serde(default = "default_source")]
    pub source: String,
}

/// HTTP identity and retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportConfig {
    /// Pinned User-Agent; when unset one is picked from the built-in pool
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Pick a fresh User-Agent from the pool for every request
    #[serde(default)]
    pub rotate_user_agent: bool,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// First backoff delay after a block or transient error (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retries allowed for a single request before it fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Optional rotating outbound proxy
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// Rotating-proxy endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Proxy URL containing a `{session}` placeholder
    pub url: String,
}

/// Orchestrator knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Base pacing delay before every page request (milliseconds)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Pages to fetch per neighborhood; 0 means bounded only by the API
    #[serde(default)]
    pub max_pages: u32,

    /// Highest page number the API will serve
    #[serde(default = "default_max_api_pages")]
    pub max_api_pages: u32,

    /// Hierarchy level to crawl; leaf neighborhoods when unset
    #[serde(default)]
    pub level: Option<i64>,

    /// Bedroom filter
    #[serde(default)]
    pub beds: Option<u32>,

    /// Maximum price filter
    #[serde(default)]
    pub max_price: Option<u32>,
}

/// SQLite output
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// When to append price-history rows
    #[serde(default)]
    pub price_history: PriceHistoryPolicy,
}

/// Price-history append policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceHistoryPolicy {
    /// One row per upsert carrying a price, changed or not
    #[default]
    EverySighting,

    /// Only when the price differs from the latest logged price
    OnChange,
}

/// Where finished neighborhoods are recorded
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,

    /// Append-only file used by the `file` backend
    #[serde(default = "default_checkpoint_path")]
    pub path: String,
}

/// Checkpoint store implementation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointBackend {
    #[default]
    File,
    Table,
}

/// Optional file logging
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Directory receiving `crawl.log`
    #[serde(default)]
    pub directory: Option<String>,
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl CrawlConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            rotate_user_agent: false,
            request_timeout_secs: default_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            max_retries: default_max_retries(),
            proxy: None,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            max_pages: 0,
            max_api_pages: default_max_api_pages(),
            level: None,
            beds: None,
            max_price: None,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            path: default_checkpoint_path(),
        }
    }
}

fn default_listing_path() -> String {
    "for-rent".to_string()
}

fn default_source() -> String {
    "streeteasy".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_backoff_base_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_delay_ms() -> u64 {
    2_500
}

fn default_max_api_pages() -> u32 {
    50
}

fn default_checkpoint_path() -> String {
    "logs/processed_neighborhoods.txt".to_string()
}
