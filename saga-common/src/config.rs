//! Configuration management for Saga services.
//!
//! The chat gateway reads a single configuration file at `~/.sagacrush/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `OPENAI_API_KEY` → secrets.openai
//! - `OPENAI_BASE_URL` → llm.base_url
//! - `REDIS_URL` → session.redis.url
//! - `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB` → session.redis.*
//! - `SAGA_BIND_ADDRESS` → network.bind
//! - `SAGA_PORT` → network.port
//! - `SAGA_SESSION_BACKEND` → session.backend
//! - `SAGA_LOG_LEVEL` / `SAGA_LOG_FORMAT` → observability.*

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sagacrush"),
        |dirs| dirs.home_dir().join(".sagacrush"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener configuration for the chat gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port. Default: 8000
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// Gateway (HTTP plumbing)
// ============================================================================

/// HTTP layer settings: CORS, timeouts and body limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Origins allowed by CORS. Credentials are allowed for these origins.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Whole-request timeout in seconds (covers both completion calls of a turn)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            request_timeout_secs: default_request_timeout(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "https://www.sagacrush.com".into(),
        "https://sagacrush.com".into(),
        "http://127.0.0.1:8000".into(),
    ]
}

fn default_request_timeout() -> u64 {
    120
}

fn default_body_limit() -> usize {
    64 * 1024
}

// ============================================================================
// Secrets
// ============================================================================

/// API credentials.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// OpenAI API key (used for both completion and moderation)
    #[serde(default)]
    pub openai: Option<String>,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("openai", &self.openai.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used for both the reply and the fact extraction
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Sampling temperature for the user-facing reply
    #[serde(default = "default_reply_temperature")]
    pub reply_temperature: f64,

    /// Sampling temperature for fact extraction
    #[serde(default)]
    pub fact_temperature: f64,

    /// Optional cap on generated tokens
    #[serde(default)]
    pub max_tokens: Option<i64>,

    /// HTTP client timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Deadline for the whole fact extraction step in seconds, retries included
    #[serde(default = "default_fact_timeout")]
    pub fact_timeout_secs: u64,

    /// Retries on transient failures (network, 429, 5xx)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base backoff between retries in milliseconds (doubles per attempt)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            chat_model: default_chat_model(),
            reply_temperature: default_reply_temperature(),
            fact_temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            fact_timeout_secs: default_fact_timeout(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_chat_model() -> String {
    "gpt-4o".into()
}

fn default_reply_temperature() -> f64 {
    0.8
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_fact_timeout() -> u64 {
    20
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

// ============================================================================
// Moderation Configuration
// ============================================================================

/// Moderation pre-check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// When false every message is treated as clean
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Moderation model identifier
    #[serde(default = "default_moderation_model")]
    pub model: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_moderation_model(),
        }
    }
}

fn default_moderation_model() -> String {
    "omni-moderation-latest".into()
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Backend type (redis, memory)
    #[serde(default = "default_session_backend")]
    pub backend: String,

    /// Redis connection settings (used when backend = "redis")
    #[serde(default)]
    pub redis: RedisConfig,

    /// Sliding expiry window in seconds, refreshed on every write
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Key namespace prepended to every session id
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Serialize concurrent turns that target the same session id
    #[serde(default)]
    pub serialize_turns: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            redis: RedisConfig::default(),
            ttl_secs: default_session_ttl(),
            key_prefix: default_key_prefix(),
            serialize_turns: false,
        }
    }
}

fn default_session_backend() -> String {
    "redis".into()
}

fn default_session_ttl() -> u64 {
    30 * 60
}

fn default_key_prefix() -> String {
    "saga:session:".into()
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL; takes precedence over host/port/db
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Effective connection URL.
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

fn default_redis_host() -> String {
    "localhost".into()
}

fn default_redis_port() -> u16 {
    6379
}

// ============================================================================
// Bot Identity
// ============================================================================

/// Identity announced in every session's system preamble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,

    #[serde(default = "default_bot_creator")]
    pub creator: String,

    #[serde(default = "default_bot_website")]
    pub website: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            creator: default_bot_creator(),
            website: default_bot_website(),
        }
    }
}

fn default_bot_name() -> String {
    "SagaCrush AI".into()
}

fn default_bot_creator() -> String {
    "Sagar Gaikwad".into()
}

fn default_bot_website() -> String {
    "www.sagacrush.com".into()
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets forced to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure for the chat gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub moderation: ModerationConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration, apply environment overrides, and validate.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply process environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.secrets.openai = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }

        if let Some(url) = lookup("REDIS_URL") {
            self.session.redis.url = Some(url);
        }
        if let Some(host) = lookup("REDIS_HOST") {
            self.session.redis.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT").and_then(|p| p.parse().ok()) {
            self.session.redis.port = port;
        }
        if let Some(db) = lookup("REDIS_DB").and_then(|d| d.parse().ok()) {
            self.session.redis.db = db;
        }
        if let Some(backend) = lookup("SAGA_SESSION_BACKEND") {
            self.session.backend = backend;
        }

        if let Some(bind) = lookup("SAGA_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("SAGA_PORT").and_then(|p| p.parse().ok()) {
            self.network.port = port;
        }

        if let Some(level) = lookup("SAGA_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SAGA_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            return Err(Error::Config(
                "session.ttl_secs must be greater than zero".into(),
            ));
        }

        match self.session.backend.as_str() {
            "redis" | "memory" => {}
            other => {
                return Err(Error::Config(format!(
                    "unknown session backend '{}' (expected redis or memory)",
                    other
                )))
            }
        }

        for (name, value) in [
            ("llm.reply_temperature", self.llm.reply_temperature),
            ("llm.fact_temperature", self.llm.fact_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within 0.0..=2.0, got {}",
                    name, value
                )));
            }
        }

        if self.llm.fact_timeout_secs == 0
            || self.llm.fact_timeout_secs >= self.gateway.request_timeout_secs
        {
            return Err(Error::Config(format!(
                "llm.fact_timeout_secs ({}) must be non-zero and below gateway.request_timeout_secs ({})",
                self.llm.fact_timeout_secs, self.gateway.request_timeout_secs
            )));
        }

        Ok(())
    }

    /// OpenAI API key, if configured and non-empty.
    pub fn openai_api_key(&self) -> Option<&str> {
        self.secrets.openai.as_deref().filter(|k| !k.is_empty())
    }
}
