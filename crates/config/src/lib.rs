//! Configuration loading, validation, and management for Forgeloop.
//!
//! Loads configuration from `~/.forgeloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.forgeloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat-completions endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fallback log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub agent: AgentSettings,
}

fn default_base_url() -> String {
    "https://open.bigmodel.cn/api/paas/v4".into()
}
fn default_model() -> String {
    "glm-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_request_timeout() -> u64 {
    60
}
fn default_log_level() -> String {
    "warn".into()
}
fn default_true() -> bool {
    true
}

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
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("log_level", &self.log_level)
            .field("knowledge", &self.knowledge)
            .field("security", &self.security)
            .field("agent", &self.agent)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// SQLite file holding patterns, solutions and preferences.
    /// `:memory:` keeps everything in-process.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Patterns retrieved as planning context
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Preferences included in planning context
    #[serde(default = "default_preference_limit")]
    pub preference_limit: usize,
}

fn default_database_path() -> String {
    AppConfig::config_dir()
        .join("knowledge.db")
        .to_string_lossy()
        .into_owned()
}
fn default_search_limit() -> usize {
    5
}
fn default_preference_limit() -> usize {
    3
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            search_limit: default_search_limit(),
            preference_limit: default_preference_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Program names the bash tool may start with
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    ["git", "npm", "pnpm", "yarn", "python", "pytest", "node", "cargo"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Run evaluation and pattern extraction after each task
    #[serde(default = "default_true")]
    pub learning_enabled: bool,

    /// Write `FILE:` blocks from coding output to disk
    #[serde(default)]
    pub apply_file_blocks: bool,

    /// Command run after each task; recorded, does not change task success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,

    /// Re-score the patterns a plan was built from once it finishes
    #[serde(default = "default_true")]
    pub feedback_patterns: bool,

    #[serde(default = "default_preview_chars")]
    pub output_preview_chars: usize,
}

fn default_preview_chars() -> usize {
    200
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            learning_enabled: true,
            apply_file_blocks: false,
            test_command: None,
            feedback_patterns: true,
            output_preview_chars: default_preview_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.forgeloop/config.toml).
    ///
    /// API key lookup order when the file has none:
    /// - `FORGELOOP_API_KEY`
    /// - `GLM_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join("config.toml"))
            .map(|c| c.with_env_overrides(|k| std::env::var(k).ok()))
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file yields defaults.
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

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.api_key.is_none() {
            self.api_key = lookup("FORGELOOP_API_KEY")
                .or_else(|| lookup("GLM_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("FORGELOOP_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("FORGELOOP_BASE_URL") {
            self.base_url = url;
        }
        if let Some(db) = lookup("FORGELOOP_DATABASE") {
            self.knowledge.database_path = db;
        }
        if let Some(list) = lookup("FORGELOOP_ALLOWED_COMMANDS") {
            self.security.allowed_commands = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        self
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".forgeloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if self.security.allowed_commands.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "security.allowed_commands must not contain empty entries".into(),
            ));
        }

        if self.knowledge.search_limit == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.search_limit must be > 0".into(),
            ));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
            knowledge: KnowledgeConfig::default(),
            security: SecurityConfig::default(),
            agent: AgentSettings::default(),
        }
    }
}

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
