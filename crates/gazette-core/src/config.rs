//! Gazette configuration system.
//!
//! Loaded from TOML (`~/.gazette/config.toml` by default) with env-var
//! fallbacks for credentials. The config struct is threaded explicitly
//! through the pipeline — steps never read ambient process state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GazetteError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GazetteConfig {
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl GazetteConfig {
    /// Load config from the default path, falling back to defaults.
    /// Env-var credentials are applied either way.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path (no env fallback applied).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GazetteError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| GazetteError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Fill empty credential fields from the environment. Variable names
    /// match the original deployment so existing setups keep working.
    pub fn apply_env(&mut self) {
        fill_from_env(&mut self.news.api_key, "NEWS_API_KEY");
        fill_from_env(&mut self.llm.api_key, "OPENAI_API_KEY");
        fill_from_env(&mut self.email.service_id, "EMAILJS_SERVICE_ID");
        fill_from_env(&mut self.email.template_id, "EMAILJS_TEMPLATE_ID");
        fill_from_env(&mut self.email.public_key, "EMAILJS_PUBLIC_KEY");
        fill_from_env(&mut self.email.private_key, "EMAILJS_PRIVATE_KEY");
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Gazette home directory (~/.gazette).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gazette")
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty()
        && let Ok(val) = std::env::var(var)
    {
        *slot = val;
    }
}

/// Content source (NewsAPI-compatible) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
    /// Lookback window for "recent" articles, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Max articles contributed per category.
    #[serde(default = "default_per_category")]
    pub per_category: usize,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_news_base_url() -> String {
    "https://newsapi.org/v2".into()
}
fn default_lookback_days() -> i64 {
    7
}
fn default_per_category() -> usize {
    5
}
fn default_fetch_timeout() -> u64 {
    10
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_news_base_url(),
            lookback_days: default_lookback_days(),
            per_category: default_per_category(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Generation service (OpenAI-compatible) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_llm_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Delivery transport (EmailJS REST) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub public_key: String,
    /// Optional server-side access token.
    #[serde(default)]
    pub private_key: String,
    #[serde(default = "default_email_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

fn default_email_endpoint() -> String {
    "https://api.emailjs.com/api/v1.0/email/send".into()
}
fn default_email_timeout() -> u64 {
    10
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            template_id: String::new(),
            public_key: String::new(),
            private_key: String::new(),
            endpoint: default_email_endpoint(),
            timeout_secs: default_email_timeout(),
        }
    }
}

impl EmailConfig {
    /// Check the required identifiers. The private key is optional —
    /// the other three must be present before any delivery is attempted.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.service_id.is_empty() {
            missing.push("email.service_id");
        }
        if self.template_id.is_empty() {
            missing.push("email.template_id");
        }
        if self.public_key.is_empty() {
            missing.push("email.public_key");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GazetteError::ConfigMissing(missing.join(", ")))
        }
    }
}

/// Schedule engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Path to the trigger/ledger database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Engine tick interval.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Max cycles running at once (across users).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Attempts per cycle before a retryable failure becomes fatal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before a retryable failure is re-queued.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

fn default_db_path() -> String {
    "~/.gazette/gazette.db".into()
}
fn default_tick_secs() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tick_secs: default_tick_secs(),
            max_concurrent: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}
