//! Configuration management for Koala
//!
//! Configuration is read once at startup and passed to the [`Brain`] as an
//! `Arc<Config>`. The model endpoint comes from the environment, optionally
//! layered over a TOML file:
//!
//! ```toml
//! [provider]
//! base_url = "https://api.example.com/v1"
//! model = "example-chat"
//!
//! [orchestrator]
//! default_client = "koala-news"
//! max_chat_completions = 1
//! rejection_policy = "report_to_model"
//! ```
//!
//! [`Brain`]: crate::orchestration::Brain

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variables holding the model endpoint
pub mod env {
    pub const BASE_URL: &str = "KOALA_BASE_URL";
    pub const API_KEY: &str = "KOALA_API_KEY";
    pub const MODEL: &str = "KOALA_MODEL";
}

/// Tool provider used when a run does not name one
pub const DEFAULT_CLIENT_NAME: &str = "koala-news";

/// Some providers keep requesting tools forever once tools are offered, so a
/// run makes a single completion round unless configured otherwise.
pub const DEFAULT_MAX_CHAT_COMPLETIONS: usize = 1;

pub const DEFAULT_MAX_TOOL_CALLS: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Configuration from the process environment only
    pub fn from_env() -> Self {
        Self {
            provider: ProviderConfig::from_env(),
            orchestrator: OrchestratorConfig::default(),
        }
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] with a custom environment lookup
    pub fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {}", path.display(), e)))?;
        config.provider.apply_overrides(lookup);

        Ok(config)
    }

    /// Load the given file, or the default file when it exists, or fall back
    /// to the environment alone
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::from_env()),
        }
    }

    /// `<config dir>/koala/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("koala").join("config.toml"))
    }
}

/// Model endpoint configuration
///
/// Values are not validated here; a missing key or URL surfaces as a model
/// error on the first completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Absent variables default to the empty string
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut provider = Self::default();
        provider.apply_overrides(lookup);
        provider
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(env::BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(api_key) = lookup(env::API_KEY) {
            self.api_key = api_key;
        }
        if let Some(model) = lookup(env::MODEL) {
            self.model = model;
        }
    }
}

/// What a rejected tool confirmation does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Abort the run; the chat session closes with an error
    #[default]
    Abort,
    /// Tell the model the call was rejected and keep going.
    /// Sampling confirmations always abort.
    ReportToModel,
}

/// Bounds for one tool runner invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolicy {
    pub max_chat_completions: usize,
    pub max_tool_calls: usize,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            max_chat_completions: DEFAULT_MAX_CHAT_COMPLETIONS,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
        }
    }
}

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tool provider used when a prompt does not name one
    pub default_client: String,
    pub max_chat_completions: usize,
    pub max_tool_calls: usize,
    /// No timeout when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_secs: Option<u64>,
    pub rejection_policy: RejectionPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_client: DEFAULT_CLIENT_NAME.to_string(),
            max_chat_completions: DEFAULT_MAX_CHAT_COMPLETIONS,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            confirmation_timeout_secs: None,
            rejection_policy: RejectionPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// At least one completion is always allowed
    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy {
            max_chat_completions: self.max_chat_completions.max(1),
            max_tool_calls: self.max_tool_calls,
        }
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }
}
