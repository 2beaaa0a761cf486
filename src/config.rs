use anyhow::{Context, Result};
use console_whisperer_core::fingerprint::FingerprintAlgorithm;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub explainer: ExplainerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// `development` exposes internal error details in responses.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Allowed CORS origins; empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_error_ttl")]
    pub error_ttl_secs: u64,
    #[serde(default = "default_link_ttl")]
    pub link_ttl_secs: u64,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    #[serde(default)]
    pub fingerprint: FingerprintAlgorithm,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            error_ttl_secs: default_error_ttl(),
            link_ttl_secs: default_link_ttl(),
            recent_limit: default_recent_limit(),
            fingerprint: FingerprintAlgorithm::default(),
        }
    }
}

impl CacheConfig {
    pub fn error_ttl(&self) -> Duration {
        Duration::from_secs(self.error_ttl_secs)
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_secs)
    }
}

fn default_error_ttl() -> u64 {
    86_400
}
fn default_link_ttl() -> u64 {
    86_400 * 7
}
fn default_recent_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_links: default_max_links(),
        }
    }
}

fn default_max_links() -> usize {
    console_whisperer_core::rank::MAX_LINKS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExplainerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_gemini_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ExplainerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_temperature() -> f64 {
    1.0
}
fn default_top_p() -> f64 {
    0.95
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default)]
    pub stackoverflow: SearchSourceConfig,
    #[serde(default)]
    pub github: SearchSourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            stackoverflow: SearchSourceConfig::default(),
            github: SearchSourceConfig::default(),
        }
    }
}

pub const STACKOVERFLOW_API_URL: &str = "https://api.stackexchange.com";
pub const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize, Clone)]
pub struct SearchSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API root; each source falls back to its public endpoint when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            page_size: default_page_size(),
            timeout_secs: default_source_timeout(),
        }
    }
}

impl SearchSourceConfig {
    /// Configured API root without a trailing slash, or `default`.
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

fn default_true() -> bool {
    true
}
fn default_page_size() -> u32 {
    5
}
fn default_source_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window; `0` disables rate limiting.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    100
}
fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Configuration with every default and the explainer disabled, for
    /// commands and tests that must not reach the network for explanations.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.explainer.provider = "disabled".to_string();
        config
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.server.environment.as_str() {
        "development" | "production" => {}
        other => anyhow::bail!(
            "Unknown server.environment: '{}'. Must be development or production.",
            other
        ),
    }

    // Validate cache
    if config.cache.error_ttl_secs == 0 || config.cache.link_ttl_secs == 0 {
        anyhow::bail!("cache TTLs must be > 0");
    }
    if config.cache.recent_limit == 0 {
        anyhow::bail!("cache.recent_limit must be >= 1");
    }

    if config.ranking.max_links == 0 {
        anyhow::bail!("ranking.max_links must be >= 1");
    }

    // Validate explainer
    match config.explainer.provider.as_str() {
        "gemini" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown explainer provider: '{}'. Must be gemini or disabled.",
            other
        ),
    }
    if config.explainer.is_enabled() && config.explainer.model.trim().is_empty() {
        anyhow::bail!("explainer.model must be specified when provider is 'gemini'");
    }

    for (name, source) in [
        ("stackoverflow", &config.sources.stackoverflow),
        ("github", &config.sources.github),
    ] {
        if source.enabled && source.page_size == 0 {
            anyhow::bail!("sources.{}.page_size must be >= 1", name);
        }
    }

    if config.rate_limit.max_requests > 0 && config.rate_limit.window_secs == 0 {
        anyhow::bail!("rate_limit.window_secs must be > 0 when rate limiting is enabled");
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Unknown logging.format: '{}'. Must be text or json.", other),
    }

    Ok(())
}
