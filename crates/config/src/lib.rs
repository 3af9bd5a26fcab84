//! Configuration loading, validation, and management for Maestro.
//!
//! Loads configuration from `~/.maestro/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use maestro_core::Topic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.maestro/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the primary model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The user-facing model
    #[serde(default)]
    pub primary: ModelConfig,

    /// The cheaper model used for classification and extraction side-calls
    #[serde(default = "ModelConfig::advisor_default")]
    pub advisor_model: ModelConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub background: BackgroundConfig,

    #[serde(default)]
    pub topic_guard: TopicGuardConfig,

    #[serde(default)]
    pub memory_capture: ToggleConfig,

    #[serde(default)]
    pub performance_capture: PerformanceCaptureConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub chat_memory: ChatMemoryConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("primary", &self.primary)
            .field("advisor_model", &self.advisor_model)
            .field("retry", &self.retry)
            .field("background", &self.background)
            .field("topic_guard", &self.topic_guard)
            .field("memory_capture", &self.memory_capture)
            .field("performance_capture", &self.performance_capture)
            .field("retrieval", &self.retrieval)
            .field("chat_memory", &self.chat_memory)
            .field("store", &self.store)
            .finish()
    }
}

/// One model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "openai" or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl ModelConfig {
    /// A small local model served by Ollama.
    pub fn advisor_default() -> Self {
        Self {
            provider: "ollama".into(),
            base_url: None,
            model: "gemma2:2b".into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Bounded re-attempts with fixed backoff for advisor side-calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Per-attempt timeout; unset means an attempt may take as long as the model does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            attempt_timeout_secs: None,
        }
    }
}

/// Largest accepted `retry.attempt_timeout_secs`.
pub const MAX_ATTEMPT_TIMEOUT_SECS: u64 = 3600;

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Maximum background tasks running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicGuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_banned_topics")]
    pub banned_topics: Vec<Topic>,

    #[serde(default = "default_refusal")]
    pub refusal_message: String,
}

fn default_banned_topics() -> Vec<Topic> {
    vec![Topic::Sport, Topic::Religion, Topic::Politics]
}

pub fn default_refusal() -> String {
    "I'm sorry, but I can only help you with Classical music.".into()
}

impl Default for TopicGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            banned_topics: default_banned_topics(),
            refusal_message: default_refusal(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceCaptureConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reply sent instead of the model's answer once a performance is saved.
    /// `{work}`, `{composer}` and `{date}` are substituted.
    #[serde(default = "default_acknowledgement")]
    pub acknowledgement: String,
}

pub fn default_acknowledgement() -> String {
    "Noted! I've saved {work} by {composer} on {date}.".into()
}

impl Default for PerformanceCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            acknowledgement: default_acknowledgement(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding model served by the advisor endpoint; empty for keyword scoring
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Minimum keyword score, used instead of `similarity_threshold` without embeddings
    #[serde(default = "default_keyword_threshold")]
    pub keyword_threshold: f32,

    /// Reference documents loaded into an empty note store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_dir: Option<String>,
}

fn default_similarity_threshold() -> f32 {
    0.8
}
fn default_top_k() -> usize {
    4
}
fn default_embedding_model() -> String {
    "gemma2:2b".into()
}
fn default_keyword_threshold() -> f32 {
    0.5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            embedding_model: default_embedding_model(),
            keyword_threshold: default_keyword_threshold(),
            documents_dir: None,
        }
    }
}

impl RetrievalConfig {
    /// The embedding model, if notes are searched by embedding.
    pub fn embedding_model(&self) -> Option<&str> {
        Some(self.embedding_model.trim()).filter(|m| !m.is_empty())
    }

    /// Minimum score for a note to be retrieved by the configured search.
    pub fn threshold(&self) -> f32 {
        match self.embedding_model() {
            Some(_) => self.similarity_threshold,
            None => self.keyword_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemoryConfig {
    /// How many past messages are replayed to the model
    #[serde(default = "default_retrieve_size")]
    pub retrieve_size: usize,
}

fn default_retrieve_size() -> usize {
    50
}

impl Default for ChatMemoryConfig {
    fn default() -> Self {
        Self {
            retrieve_size: default_retrieve_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file (sqlite backend only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from the default path (~/.maestro/config.toml).
    ///
    /// Environment overrides:
    /// - `MAESTRO_API_KEY`, then `OPENAI_API_KEY`
    /// - `MAESTRO_MODEL`, `MAESTRO_ADVISOR_MODEL`
    /// - `OLLAMA_BASE_URL` for whichever model uses Ollama
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
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

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("MAESTRO_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(model) = var("MAESTRO_MODEL") {
            self.primary.model = model;
        }
        if let Some(model) = var("MAESTRO_ADVISOR_MODEL") {
            self.advisor_model.model = model;
        }
        if let Some(url) = var("OLLAMA_BASE_URL") {
            for model in [&mut self.primary, &mut self.advisor_model] {
                if model.provider == "ollama" && model.base_url.is_none() {
                    model.base_url = Some(url.clone());
                }
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".maestro")
    }

    /// Where the SQLite store lives unless configured otherwise.
    pub fn store_path(&self) -> String {
        self.store.path.clone().unwrap_or_else(|| {
            format!("sqlite://{}", Self::config_dir().join("maestro.db").display())
        })
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (label, model) in [("primary", &self.primary), ("advisor_model", &self.advisor_model)] {
            if model.temperature < 0.0 || model.temperature > 2.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{label}.temperature must be between 0.0 and 2.0"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if let Some(secs) = self.retry.attempt_timeout_secs
            && !(1..=MAX_ATTEMPT_TIMEOUT_SECS).contains(&secs)
        {
            return Err(ConfigError::ValidationError(format!(
                "retry.attempt_timeout_secs must be between 1 and {MAX_ATTEMPT_TIMEOUT_SECS}"
            )));
        }

        for (label, threshold) in [
            ("similarity_threshold", self.retrieval.similarity_threshold),
            ("keyword_threshold", self.retrieval.keyword_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.{label} must be between 0.0 and 1.0"
                )));
            }
        }

        if self.background.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "background.max_concurrency must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            primary: ModelConfig::default(),
            advisor_model: ModelConfig::advisor_default(),
            retry: RetryConfig::default(),
            background: BackgroundConfig::default(),
            topic_guard: TopicGuardConfig::default(),
            memory_capture: ToggleConfig::default(),
            performance_capture: PerformanceCaptureConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat_memory: ChatMemoryConfig::default(),
            store: StoreConfig::default(),
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
