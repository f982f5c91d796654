//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `BLOODLESS_DIGEST__` (sections and keys
//! separated by `__`, e.g. `BLOODLESS_DIGEST__STORE__MAX_ARTICLES=30`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [search]
//! queries = ["bloodless medicine", "patient blood management"]
//! sources = ["pubmed", "europe_pmc", "openalex"]
//! year = "2020-"
//! timeout_seconds = 10
//!
//! [filter]
//! trust_mode = "allow"        # or "deny"
//! require_keyword = true
//! scoring = true
//!
//! [store]
//! max_articles = 15
//! retention_days = 30
//! search_interval_days = 7
//!
//! [email]
//! recipients = ["team@example.org"]
//!
//! [rate_limits]
//! default_requests_per_second = 3.0
//!
//! [[rate_limits.per_source]]
//! source = "semantic"
//! requests_per_second = 1.0
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::{AggregatorSettings, FilterPolicy, TrustMode};
use crate::sources::DEFAULT_SOURCE_ORDER;
use crate::store::StoreSettings;

/// Name used for config and data directories
pub const APP_NAME: &str = "bloodless-digest";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "BLOODLESS_DIGEST";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub filter: FilterPolicy,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub email: EmailConfig,

    /// API keys for various services
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What to search and how
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Queries issued to every source on each run
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,

    /// Enabled sources, highest priority first
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    #[serde(default = "default_max_results")]
    pub max_results_per_query: usize,

    /// Year filter ("2020-", "2018-2022", "2021")
    #[serde(default = "default_year")]
    pub year: Option<String>,

    /// Per-call timeout for a source
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Days of medRxiv postings scanned per run
    #[serde(default = "default_preprint_window")]
    pub preprint_window_days: i64,

    /// How often the background scheduler checks whether a run is due
    #[serde(default = "default_schedule_check")]
    pub schedule_check_minutes: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            queries: default_queries(),
            sources: default_sources(),
            max_results_per_query: default_max_results(),
            year: default_year(),
            timeout_seconds: default_timeout_seconds(),
            preprint_window_days: default_preprint_window(),
            schedule_check_minutes: default_schedule_check(),
        }
    }
}

fn default_queries() -> Vec<String> {
    [
        "bloodless medicine",
        "bloodless surgery",
        "patient blood management",
        "transfusion-free surgery",
        "alternatives to blood transfusion",
        "medicina sem sangue",
        "cirurgia sem sangue",
        "gerenciamento de sangue do paciente",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sources() -> Vec<String> {
    DEFAULT_SOURCE_ORDER.iter().map(|s| s.to_string()).collect()
}

fn default_max_results() -> usize {
    10
}

fn default_year() -> Option<String> {
    Some("2020-".to_string())
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_preprint_window() -> i64 {
    90
}

fn default_schedule_check() -> u64 {
    60
}

/// Lifecycle store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `articles.json` and `last-search.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_max_articles")]
    pub max_articles: usize,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_interval_days")]
    pub search_interval_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_articles: default_max_articles(),
            retention_days: default_retention_days(),
            search_interval_days: default_interval_days(),
        }
    }
}

fn default_max_articles() -> usize {
    15
}

fn default_retention_days() -> i64 {
    crate::models::RETENTION_DAYS
}

fn default_interval_days() -> i64 {
    7
}

/// Email dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Provider API key; without it reports fall back to a compose link
    #[serde(default = "env_resend_key", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_email_api_url")]
    pub api_url: String,

    #[serde(default = "default_email_from")]
    pub from: String,

    #[serde(default = "default_email_subject")]
    pub subject: String,

    /// Recipients of the scheduled report
    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default = "default_email_timeout")]
    pub timeout_seconds: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: env_resend_key(),
            api_url: default_email_api_url(),
            from: default_email_from(),
            subject: default_email_subject(),
            recipients: Vec::new(),
            timeout_seconds: default_email_timeout(),
        }
    }
}

fn env_resend_key() -> Option<String> {
    non_empty_env("RESEND_API_KEY")
}

fn default_email_api_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_email_from() -> String {
    "Bloodless Digest <digest@resend.dev>".to_string()
}

fn default_email_subject() -> String {
    "Bloodless Medicine & PBM - Weekly Literature Digest".to_string()
}

fn default_email_timeout() -> u64 {
    15
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default = "env_semantic_key", skip_serializing_if = "Option::is_none")]
    pub semantic_scholar: Option<String>,

    /// Contact email for the OpenAlex polite pool
    #[serde(default = "env_openalex_email", skip_serializing_if = "Option::is_none")]
    pub openalex_email: Option<String>,

    /// NCBI E-utilities API key
    #[serde(default = "env_ncbi_key", skip_serializing_if = "Option::is_none")]
    pub ncbi: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            semantic_scholar: env_semantic_key(),
            openalex_email: env_openalex_email(),
            ncbi: env_ncbi_key(),
        }
    }
}

fn env_semantic_key() -> Option<String> {
    non_empty_env("SEMANTIC_SCHOLAR_API_KEY")
}

fn env_openalex_email() -> Option<String> {
    non_empty_env("OPENALEX_EMAIL")
}

fn env_ncbi_key() -> Option<String> {
    non_empty_env("NCBI_API_KEY")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per second for each source (0 disables throttling)
    #[serde(default = "default_rps")]
    pub default_requests_per_second: f32,

    /// Per-source overrides
    #[serde(default = "default_source_rates")]
    pub per_source: Vec<SourceRateConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_requests_per_second: default_rps(),
            per_source: default_source_rates(),
        }
    }
}

impl RateLimitConfig {
    /// Effective requests per second for a source
    pub fn for_source(&self, source_id: &str) -> f32 {
        self.per_source
            .iter()
            .find(|r| r.source.eq_ignore_ascii_case(source_id))
            .map(|r| r.requests_per_second)
            .unwrap_or(self.default_requests_per_second)
    }
}

/// Per-source rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRateConfig {
    pub source: String,
    pub requests_per_second: f32,
}

fn default_rps() -> f32 {
    3.0
}

fn default_source_rates() -> Vec<SourceRateConfig> {
    vec![SourceRateConfig {
        source: "semantic".to_string(),
        requests_per_second: 1.0,
    }]
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" for structured output, anything else for human-readable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Data directory, falling back to the platform default
    pub fn data_dir(&self) -> PathBuf {
        self.store.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Settings for the aggregator derived from search and store sections
    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            max_results_per_query: self.search.max_results_per_query,
            year: self.search.year.clone().filter(|y| !y.trim().is_empty()),
            timeout: Duration::from_secs(self.search.timeout_seconds),
            max_articles: self.store.max_articles,
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings::from(&self.store)
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_articles == 0 {
            return Err(ConfigError::Invalid("store.max_articles must be > 0".into()));
        }
        if self.store.retention_days <= 0 {
            return Err(ConfigError::Invalid("store.retention_days must be > 0".into()));
        }
        if self.store.search_interval_days <= 0 {
            return Err(ConfigError::Invalid(
                "store.search_interval_days must be > 0".into(),
            ));
        }
        if self.search.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("search.timeout_seconds must be > 0".into()));
        }
        if self.filter.trust_mode == TrustMode::Allow && self.filter.trusted_domains.is_empty() {
            return Err(ConfigError::Invalid(
                "filter.trusted_domains is empty in allow mode; every article would be rejected"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Copy of the configuration with secrets removed, for writing to disk
    pub fn without_secrets(&self) -> Self {
        let mut copy = self.clone();
        copy.api_keys = ApiKeys {
            semantic_scholar: None,
            openalex_email: None,
            ncbi: None,
        };
        copy.email.api_key = None;
        copy
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration: defaults, then `path` (if any), then environment
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("search.queries")
                .with_list_parse_key("search.sources")
                .with_list_parse_key("email.recipients"),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Locate a configuration file in the usual places
///
/// Checks `./bloodless-digest.toml`, then the platform config directory.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(format!("{}.toml", APP_NAME));
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|p| p.is_file())
}

/// Platform config file location (`~/.config/bloodless-digest/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join("config.toml"))
}

/// Platform data directory, or `./data` when none is available
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
