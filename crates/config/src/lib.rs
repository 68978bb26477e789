//! Configuration loading, validation, and management for Contextwise.
//!
//! Loads configuration from `~/.contextwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use contextwise_core::error::Error as CoreError;
use contextwise_core::options::{ContextOptions, PreservationStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.contextwise/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model whose context window is used when none is named
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Defaults for every context computation
    #[serde(default)]
    pub context: ContextOptions,

    /// Model name → context window in tokens
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, usize>,

    /// Result caching
    #[serde(default)]
    pub cache: CacheConfig,

    /// Window set through `CONTEXTWISE_CONTEXT_WINDOW`; beats the models table
    #[serde(skip)]
    pub context_window_override: Option<usize>,
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_models() -> BTreeMap<String, usize> {
    [
        ("gpt-4o", 128_000),
        ("gpt-4o-mini", 128_000),
        ("gpt-3.5-turbo", 16_385),
        ("claude-sonnet-4", 200_000),
        ("claude-haiku-3.5", 200_000),
        ("llama3", 8_192),
    ]
    .into_iter()
    .map(|(name, window)| (name.to_string(), window))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lifetime of a cached context in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.contextwise/config.toml).
    ///
    /// Environment overrides, applied after the file:
    /// - `CONTEXTWISE_STRATEGY` — preservation strategy tag
    /// - `CONTEXTWISE_CONTEXT_WINDOW` — context window in tokens
    /// - `CONTEXTWISE_MODEL` — default model
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(tag) = lookup("CONTEXTWISE_STRATEGY") {
            self.context.preservation_strategy = tag.parse::<PreservationStrategy>()?;
        }

        if let Some(window) = lookup("CONTEXTWISE_CONTEXT_WINDOW") {
            let window = window.trim().parse::<usize>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CONTEXTWISE_CONTEXT_WINDOW must be a positive integer, got '{window}'"
                ))
            })?;
            self.context_window_override = Some(window);
        }

        if let Some(model) = lookup("CONTEXTWISE_MODEL") {
            self.default_model = model;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextwise")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.context.validate()?;

        if let Some((name, _)) = self.models.iter().find(|(_, window)| **window == 0) {
            return Err(ConfigError::ValidationError(format!(
                "context window for model '{name}' must be > 0"
            )));
        }

        if self.context_window_override == Some(0) {
            return Err(ConfigError::ValidationError(
                "CONTEXTWISE_CONTEXT_WINDOW must be > 0".into(),
            ));
        }

        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_secs must be > 0 when caching is enabled".into(),
            ));
        }

        Ok(())
    }

    /// Context window for `model`, falling back to `[context].context_window`.
    pub fn context_window_for(&self, model: &str) -> usize {
        self.context_window_override
            .or_else(|| self.models.get(model).copied())
            .unwrap_or(self.context.context_window)
    }

    /// Options for a computation against `model` (or the default model).
    pub fn context_options(&self, model: Option<&str>) -> Result<ContextOptions, ConfigError> {
        let model = model.unwrap_or(&self.default_model);
        let options = ContextOptions {
            context_window: self.context_window_for(model),
            ..self.context.clone()
        };
        options.validate()?;
        Ok(options)
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            context: ContextOptions::default(),
            models: default_models(),
            cache: CacheConfig::default(),
            context_window_override: None,
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

impl From<CoreError> for ConfigError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config { message } => ConfigError::ValidationError(message),
            other => ConfigError::ValidationError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextwise_core::options::OptimizationLevel;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.context.message_limit, 50);
        assert!(config.cache.enabled);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.context, config.context);
        assert_eq!(parsed.models, config.models);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "llama3"

[context]
preservation_strategy = "advanced_scored"
optimization_level = "balanced"

[cache]
ttl_secs = 60
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(
            config.context.preservation_strategy,
            PreservationStrategy::AdvancedScored
        );
        assert_eq!(config.context.optimization_level, Some(OptimizationLevel::Balanced));
        assert_eq!(config.context.context_ratio, 0.8);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.models["gpt-4o"], 128_000);

        let options = config.context_options(None).unwrap();
        assert_eq!(options.context_window, 8_192);
    }

    #[test]
    fn unknown_strategy_in_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[context]\npreservation_strategy = \"everything\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_ratio_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[context]\ncontext_ratio = 1.5").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("context_ratio"));
    }

    #[test]
    fn zero_window_model_rejected() {
        let mut config = AppConfig::default();
        config.models.insert("broken".into(), 0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("CONTEXTWISE_STRATEGY", "recent_messages"),
                ("CONTEXTWISE_MODEL", "claude-sonnet-4"),
            ]))
            .unwrap();
        assert_eq!(
            config.context.preservation_strategy,
            PreservationStrategy::RecentMessages
        );
        assert_eq!(config.context_options(None).unwrap().context_window, 200_000);

        config
            .apply_env(env(&[("CONTEXTWISE_CONTEXT_WINDOW", "4096")]))
            .unwrap();
        assert_eq!(config.context_options(None).unwrap().context_window, 4096);
        assert_eq!(
            config.context_options(Some("gpt-4o")).unwrap().context_window,
            4096
        );
    }

    #[test]
    fn bad_env_values_are_named() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("CONTEXTWISE_STRATEGY", "newest_only")]))
            .unwrap_err();
        assert!(err.to_string().contains("newest_only"));

        let err = config
            .apply_env(env(&[("CONTEXTWISE_CONTEXT_WINDOW", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn model_table_selects_window() {
        let config = AppConfig::default();
        assert_eq!(config.context_window_for("gpt-4o-mini"), 128_000);
        assert_eq!(config.context_window_for("unknown-model"), 8_192);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("intelligent_truncation"));
        assert!(toml_str.contains("[models]"));
        assert!(toml_str.contains("ttl_secs = 300"));
    }
}
