//! Configuration loading, validation, and management for toolrelay.
//!
//! Loads configuration from `~/.toolrelay/config.toml` (or an explicit path)
//! with `.env` and environment variable overrides. Validates all settings
//! before any provider is built.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Once;
use toolrelay_core::policy::DispatchPolicy;

/// Environment variables searched for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 3] = ["TOOLRELAY_API_KEY", "OPENAI_API_KEY", "OPENROUTER_API_KEY"];

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV_VAR: &str = "TOOLRELAY_CONFIG";

static ENV_FILE: Once = Once::new();

/// The root configuration structure.
///
/// Maps directly to `~/.toolrelay/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name: "openai", "openrouter", "ollama", or a custom label
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL override (required for custom providers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model to request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; endpoint default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens per completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// System prompt placed at the head of every history built by the CLI
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// How requested tool calls are dispatched
    #[serde(default)]
    pub dispatch: DispatchPolicy,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_system_prompt() -> String {
    "You are a helpful assistant that can do arithmetic. Use the provided tools to help the user.".into()
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
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("system_prompt", &self.system_prompt)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `TOOLRELAY_CONFIG` or the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration from `path`, falling back to `TOOLRELAY_CONFIG`
    /// and then `~/.toolrelay/config.toml`.
    ///
    /// A `.env` file in the working directory is read first. Environment
    /// variables then override file values:
    /// - `TOOLRELAY_API_KEY` / `OPENAI_API_KEY` / `OPENROUTER_API_KEY`
    ///   (only when the file sets no key)
    /// - `TOOLRELAY_PROVIDER`, `TOOLRELAY_MODEL`, `TOOLRELAY_API_URL`
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_env_file();

        let mut config = Self::load_from(&Self::resolve_path(path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
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

        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    ///
    /// Keys from the environment are only picked up for providers that
    /// authenticate, so a local endpoint never receives a hosted key.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("TOOLRELAY_PROVIDER") {
            self.provider = provider;
        }

        if self.api_key.is_none() && self.needs_api_key() {
            self.api_key = API_KEY_ENV_VARS
                .iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()));
        }

        if let Some(model) = lookup("TOOLRELAY_MODEL") {
            self.model = model;
        }

        if let Some(url) = lookup("TOOLRELAY_API_URL") {
            self.api_url = Some(url);
        }
    }

    /// Get the config directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrelay")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// The file `load_with(path)` reads: `path`, else `TOOLRELAY_CONFIG`,
    /// else the default location.
    pub fn resolve_path(path: Option<&Path>) -> PathBuf {
        match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_PATH_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::config_path()),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.dispatch.max_tool_calls_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.max_tool_calls_per_turn must be at least 1".into(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be at least 1".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Whether the configured provider authenticates. Only `ollama` does not.
    pub fn needs_api_key(&self) -> bool {
        self.provider != "ollama"
    }

    /// The API key, or `MissingCredential` naming every place that was checked.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                checked: format!("config file api_key, {}", API_KEY_ENV_VARS.join(", ")),
            })
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
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            system_prompt: default_system_prompt(),
            dispatch: DispatchPolicy::default(),
        }
    }
}

/// Read `.env` from the working directory once per process.
pub fn load_env_file() {
    ENV_FILE.call_once(|| {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded environment file");
        }
    });
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

    #[error("No API credential found (checked: {checked})")]
    MissingCredential { checked: String },
}

impl From<ConfigError> for toolrelay_core::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingCredential { checked } => {
                toolrelay_core::Error::MissingCredential { checked }
            }
            other => toolrelay_core::Error::Config {
                message: other.to_string(),
            },
        }
    }
}
