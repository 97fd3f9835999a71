//! Configuration loading and validation for stepwire.
//!
//! Loads configuration from `~/.stepwire/config.toml` (or an explicit path)
//! with environment variable overrides. A missing file yields defaults;
//! [`EngineConfig::validate`] is run before any engine is built from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepwire_core::DeliveryMode;

/// The root configuration structure.
///
/// Maps directly to `~/.stepwire/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token budget of the conversation context
    #[serde(default = "default_max_context_size")]
    pub max_context_size: u32,

    /// Tokens kept free for the next response; compaction starts once the
    /// estimate exceeds `max_context_size - reserved_tokens`
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: u32,

    /// Hard limit on steps in a single run
    #[serde(default = "default_max_steps")]
    pub max_steps_per_run: u32,

    /// Working directory handed to tools that need one
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Event bus settings
    #[serde(default)]
    pub wire: WireConfig,

    /// Context compaction settings
    #[serde(default)]
    pub compaction: CompactionConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_max_context_size() -> u32 {
    8000
}
fn default_reserved_tokens() -> u32 {
    2000
}
fn default_max_steps() -> u32 {
    10
}
fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_context_size", &self.max_context_size)
            .field("reserved_tokens", &self.reserved_tokens)
            .field("max_steps_per_run", &self.max_steps_per_run)
            .field("work_dir", &self.work_dir)
            .field("client", &self.client)
            .field("wire", &self.wire)
            .field("compaction", &self.compaction)
            .finish()
    }
}

/// HTTP transport and client-cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How many model clients the factory keeps alive
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_connect_timeout() -> u64 {
    30
}
fn default_request_timeout() -> u64 {
    120
}
fn default_cache_capacity() -> usize {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireConfig {
    /// `"async"` (dedicated delivery thread) or `"sync"`
    #[serde(default)]
    pub delivery: DeliveryMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Messages kept when the context is compacted
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Per-message token estimate applied after compaction
    #[serde(default = "default_tokens_per_message")]
    pub tokens_per_message: u32,
}

fn default_keep_recent() -> usize {
    10
}
fn default_tokens_per_message() -> u32 {
    100
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_recent: default_keep_recent(),
            tokens_per_message: default_tokens_per_message(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.stepwire/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides:
    /// - `STEPWIRE_API_KEY`, then `OPENAI_API_KEY` (only when the file has no key)
    /// - `STEPWIRE_MODEL`
    /// - `STEPWIRE_BASE_URL`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("STEPWIRE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("STEPWIRE_MODEL") {
            self.model = model;
        }
        if let Some(base_url) = lookup("STEPWIRE_BASE_URL") {
            self.base_url = base_url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwire")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("base_url must not be empty".into()));
        }
        if self.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "api_key is required (set it in config.toml or STEPWIRE_API_KEY)".into(),
            ));
        }
        if self.max_context_size == 0 {
            return Err(ConfigError::ValidationError("max_context_size must be > 0".into()));
        }
        if self.reserved_tokens >= self.max_context_size {
            return Err(ConfigError::ValidationError(
                "reserved_tokens must be smaller than max_context_size".into(),
            ));
        }
        if self.max_steps_per_run == 0 {
            return Err(ConfigError::ValidationError("max_steps_per_run must be > 0".into()));
        }
        if self.client.connect_timeout_secs == 0 || self.client.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("client timeouts must be > 0".into()));
        }
        if self.client.cache_capacity == 0 {
            return Err(ConfigError::ValidationError("client.cache_capacity must be > 0".into()));
        }
        if self.compaction.keep_recent == 0 {
            return Err(ConfigError::ValidationError("compaction.keep_recent must be > 0".into()));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Compaction threshold: the estimate above which a step compacts first.
    pub fn compaction_threshold(&self) -> u32 {
        self.max_context_size.saturating_sub(self.reserved_tokens)
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            max_context_size: default_max_context_size(),
            reserved_tokens: default_reserved_tokens(),
            max_steps_per_run: default_max_steps(),
            work_dir: default_work_dir(),
            client: ClientConfig::default(),
            wire: WireConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for stepwire_core::Error {
    fn from(e: ConfigError) -> Self {
        stepwire_core::Error::config(e.to_string())
    }
}
