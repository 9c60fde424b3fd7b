//! Configuration loading and validation for toolrun.
//!
//! Loads configuration from `~/.toolrun/config.toml` with environment
//! variable overrides. Validates all settings before a loop is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toolrun_core::ReasoningEffort;

/// The root configuration structure.
///
/// Maps directly to `~/.toolrun/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model identifier sent to the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 – 2.0)
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Reasoning effort for models that support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// System prompt seeded ahead of a plain-prompt run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Usage and cost tracking
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_model() -> String {
    "openai/gpt-4o".into()
}
fn default_max_tokens() -> Option<u32> {
    Some(4096)
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Accounting bucket used when a run does not name one
    #[serde(default = "default_context_key")]
    pub context_key: String,

    /// Narrate every generation and tool call through the run tracker
    #[serde(default = "default_true")]
    pub verbose: bool,

    /// Upper bound on waiting for a deferred tool call, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_wait_timeout_secs: Option<u64>,
}

fn default_max_iterations() -> usize {
    256
}
fn default_context_key() -> String {
    "default".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            context_key: default_context_key(),
            verbose: true,
            tool_wait_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether cost is computed for backends that bill per token
    #[serde(default = "default_true")]
    pub track_cost: bool,

    /// Custom model pricing overrides (model name → pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            track_cost: true,
            custom_pricing: HashMap::new(),
        }
    }
}

/// Custom pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
    /// Price per 1M cached input tokens in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_per_m: Option<f64>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolrun/config.toml).
    ///
    /// Environment variables override the file:
    /// - `TOOLRUN_MODEL`
    /// - `TOOLRUN_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("TOOLRUN_MODEL") {
            self.model = model;
        }

        if let Some(raw) = lookup("TOOLRUN_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TOOLRUN_MAX_ITERATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrun")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.context_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.context_key must not be empty".into(),
            ));
        }

        for (model, pricing) in &self.telemetry.custom_pricing {
            let prices = [Some(pricing.input_per_m), Some(pricing.output_per_m), pricing.cached_input_per_m];
            if prices.iter().flatten().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "custom pricing for '{model}' must be finite and non-negative"
                )));
            }
        }

        Ok(())
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
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            reasoning_effort: None,
            system_prompt: None,
            agent: AgentConfig::default(),
            telemetry: TelemetryConfig::default(),
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

impl From<ConfigError> for toolrun_core::Error {
    fn from(e: ConfigError) -> Self {
        toolrun_core::Error::Config { message: e.to_string() }
    }
}
