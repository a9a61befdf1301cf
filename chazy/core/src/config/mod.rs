//! TOML Configuration File Support
//!
//! Centralized configuration loading for the engine, with an optional TOML
//! file at `~/.config/chazy/chazy.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`CHAZY_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [machine]
//! first_line_delay_min_ms = 3000
//! first_line_delay_max_ms = 5000
//! fast_clear_ms = 120
//!
//! [router]
//! cooldown_ms = 4000
//! global_lock_ms = 8000
//! budget_max = 3
//! budget_refill_ms = 45000
//!
//! [router.cooldown_overrides_ms]
//! slider_changed = 5000
//!
//! [typing]
//! disable_typos = false
//! deletion = "word"
//! seed = 42
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::animation::{DeletionStrategy, TypingConfig};
use crate::router::RouterConfig;
use crate::state_machine::MachineConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[machine]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineToml {
    /// Shortest lead-in before the first line
    pub first_line_delay_min_ms: Option<u64>,
    /// Longest lead-in before the first line
    pub first_line_delay_max_ms: Option<u64>,
    /// Delay before a rejected line's callback fires
    pub fallback_delay_ms: Option<u64>,
    /// Total fast selection clear duration
    pub fast_clear_ms: Option<u64>,
    /// Fade portion of the fast selection clear
    pub fade_ms: Option<u64>,
    /// Display time of an empty line
    pub display_base_ms: Option<u64>,
    /// Extra display time per grapheme
    pub display_per_char_ms: Option<u64>,
    /// Upper bound on display time
    pub display_max_ms: Option<u64>,
}

/// `[router]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterToml {
    /// Default cooldown
    pub cooldown_ms: Option<u64>,
    /// Per event type cooldowns, merged over the defaults
    pub cooldown_overrides_ms: Option<HashMap<String, u64>>,
    /// Silence after any response
    pub global_lock_ms: Option<u64>,
    /// Response budget size
    pub budget_max: Option<u32>,
    /// Time to regain one response
    pub budget_refill_ms: Option<u64>,
    /// Identical-event suppression window
    pub suppression_window_ms: Option<u64>,
    /// Pending slot lifetime
    pub pending_ttl_ms: Option<u64>,
    /// Polite slot lifetime
    pub polite_ttl_ms: Option<u64>,
    /// Whether ambient lines are scheduled
    pub ambient_enabled: Option<bool>,
}

/// `[typing]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingToml {
    /// Disable typo injection
    pub disable_typos: Option<bool>,
    /// Disable the scramble reveal
    pub disable_scramble: Option<bool>,
    /// Force one deletion strategy
    pub deletion: Option<DeletionStrategy>,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChazyToml {
    /// State machine section
    pub machine: MachineToml,
    /// Router section
    pub router: RouterToml,
    /// Typing section
    pub typing: TypingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved engine configuration
#[derive(Clone, Debug, Default)]
pub struct ChazyConfig {
    /// State machine timings
    pub machine: MachineConfig,

    /// Router limits
    pub router: RouterConfig,

    /// Typing and deletion switches
    pub typing: TypingConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl ChazyConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let machine = &self.machine;
        if machine.first_line_delay_min_ms > machine.first_line_delay_max_ms {
            return Err(ConfigError::ValidationError(format!(
                "first_line_delay_min_ms ({}) exceeds first_line_delay_max_ms ({})",
                machine.first_line_delay_min_ms, machine.first_line_delay_max_ms
            )));
        }
        if machine.fade_ms > machine.fast_clear_ms {
            return Err(ConfigError::ValidationError(format!(
                "fade_ms ({}) exceeds fast_clear_ms ({})",
                machine.fade_ms, machine.fast_clear_ms
            )));
        }
        if self.router.budget_max == 0 {
            return Err(ConfigError::ValidationError(
                "budget_max must be at least 1".to_string(),
            ));
        }
        if self.router.budget_refill_ms == 0 {
            return Err(ConfigError::ValidationError(
                "budget_refill_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chazy/chazy.toml` or `~/.config/chazy/chazy.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chazy").join("chazy.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// resolved values are inconsistent. A missing file is not an error.
pub fn load_config() -> Result<ChazyConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChazyConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ChazyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChazyConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChazyToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut ChazyConfig, toml: &ChazyToml) {
    let machine = &mut config.machine;
    let section = &toml.machine;
    if let Some(ms) = section.first_line_delay_min_ms {
        machine.first_line_delay_min_ms = ms;
    }
    if let Some(ms) = section.first_line_delay_max_ms {
        machine.first_line_delay_max_ms = ms;
    }
    if let Some(ms) = section.fallback_delay_ms {
        machine.fallback_delay_ms = ms;
    }
    if let Some(ms) = section.fast_clear_ms {
        machine.fast_clear_ms = ms;
    }
    if let Some(ms) = section.fade_ms {
        machine.fade_ms = ms;
    }
    if let Some(ms) = section.display_base_ms {
        machine.display_base_ms = ms;
    }
    if let Some(ms) = section.display_per_char_ms {
        machine.display_per_char_ms = ms;
    }
    if let Some(ms) = section.display_max_ms {
        machine.display_max_ms = ms;
    }

    let router = &mut config.router;
    let section = &toml.router;
    if let Some(ms) = section.cooldown_ms {
        router.cooldown_ms = ms;
    }
    if let Some(overrides) = &section.cooldown_overrides_ms {
        router
            .cooldown_overrides_ms
            .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
    }
    if let Some(ms) = section.global_lock_ms {
        router.global_lock_ms = ms;
    }
    if let Some(max) = section.budget_max {
        router.budget_max = max;
    }
    if let Some(ms) = section.budget_refill_ms {
        router.budget_refill_ms = ms;
    }
    if let Some(ms) = section.suppression_window_ms {
        router.suppression_window_ms = ms;
    }
    if let Some(ms) = section.pending_ttl_ms {
        router.pending_ttl_ms = ms;
    }
    if let Some(ms) = section.polite_ttl_ms {
        router.polite_ttl_ms = ms;
    }
    if let Some(enabled) = section.ambient_enabled {
        router.ambient_enabled = enabled;
    }

    let typing = &mut config.typing;
    let section = &toml.typing;
    if let Some(disabled) = section.disable_typos {
        typing.disable_typos = disabled;
    }
    if let Some(disabled) = section.disable_scramble {
        typing.disable_scramble = disabled;
    }
    if section.deletion.is_some() {
        typing.deletion = section.deletion;
    }
    if let Some(seed) = section.seed {
        typing.seed = Some(seed);
        config.machine.seed = Some(seed);
    }
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

fn parse_deletion(value: &str) -> Option<DeletionStrategy> {
    match value.to_ascii_lowercase().as_str() {
        "select_all" | "select-all" => Some(DeletionStrategy::SelectAll),
        "word" => Some(DeletionStrategy::Word),
        "character" | "char" => Some(DeletionStrategy::Character),
        _ => None,
    }
}

fn apply_env_config<F>(config: &mut ChazyConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(seed) = env("CHAZY_SEED") {
        match seed.parse::<u64>() {
            Ok(seed) => {
                config.typing.seed = Some(seed);
                config.machine.seed = Some(seed);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %seed, "Ignoring invalid CHAZY_SEED"),
        }
    }
    if let Some(value) = env("CHAZY_DISABLE_TYPOS") {
        config.typing.disable_typos = parse_flag(&value);
        config.source = ConfigSource::Env;
    }
    if let Some(value) = env("CHAZY_DISABLE_SCRAMBLE") {
        config.typing.disable_scramble = parse_flag(&value);
        config.source = ConfigSource::Env;
    }
    if let Some(value) = env("CHAZY_DELETION") {
        match parse_deletion(&value) {
            Some(strategy) => {
                config.typing.deletion = Some(strategy);
                config.source = ConfigSource::Env;
            }
            None => tracing::warn!(value = %value, "Ignoring unknown CHAZY_DELETION"),
        }
    }
    if let Some(value) = env("CHAZY_AMBIENT") {
        config.router.ambient_enabled = parse_flag(&value);
        config.source = ConfigSource::Env;
    }
    if let Some(value) = env("CHAZY_GLOBAL_LOCK_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.router.global_lock_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(value) = env("CHAZY_BUDGET_MAX") {
        if let Ok(max) = value.parse::<u32>() {
            config.router.budget_max = max;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(value) = env("CHAZY_FIRST_LINE_DELAY_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.machine.first_line_delay_min_ms = ms;
            config.machine.first_line_delay_max_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Seed override
    pub seed: Option<u64>,

    /// Typos enabled override
    pub typos: Option<bool>,

    /// Deletion strategy override
    pub deletion: Option<DeletionStrategy>,

    /// Ambient scheduling override
    pub ambient: Option<bool>,

    /// Skip the first-line lead-in
    pub skip_lead_in: bool,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set seed override
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set typos override
    #[must_use]
    pub fn with_typos(mut self, enabled: bool) -> Self {
        self.typos = Some(enabled);
        self
    }

    /// Set deletion strategy override
    #[must_use]
    pub fn with_deletion(mut self, strategy: DeletionStrategy) -> Self {
        self.deletion = Some(strategy);
        self
    }

    /// Set ambient override
    #[must_use]
    pub fn with_ambient(mut self, enabled: bool) -> Self {
        self.ambient = Some(enabled);
        self
    }

    /// Skip the first-line lead-in
    #[must_use]
    pub fn without_lead_in(mut self) -> Self {
        self.skip_lead_in = true;
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ChazyConfig) {
        if self.seed.is_some()
            || self.typos.is_some()
            || self.deletion.is_some()
            || self.ambient.is_some()
            || self.skip_lead_in
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(seed) = self.seed {
            config.typing.seed = Some(seed);
            config.machine.seed = Some(seed);
        }
        if let Some(enabled) = self.typos {
            config.typing.disable_typos = !enabled;
        }
        if self.deletion.is_some() {
            config.typing.deletion = self.deletion;
        }
        if let Some(enabled) = self.ambient {
            config.router.ambient_enabled = enabled;
        }
        if self.skip_lead_in {
            config.machine = config.machine.clone().without_lead_in();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ChazyConfig::default();
        assert_eq!(config.machine.first_line_delay_min_ms, 3000);
        assert_eq!(config.router.global_lock_ms, 8000);
        assert_eq!(config.router.budget_max, 3);
        assert!(!config.typing.disable_typos);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("chazy/chazy.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[machine]
first_line_delay_min_ms = 1000
first_line_delay_max_ms = 2000
fast_clear_ms = 200

[router]
global_lock_ms = 5000
budget_max = 5

[router.cooldown_overrides_ms]
button_click = 9000

[typing]
disable_scramble = true
deletion = "word"
seed = 7
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.machine.first_line_delay_min_ms, 1000);
        assert_eq!(config.machine.first_line_delay_max_ms, 2000);
        assert_eq!(config.machine.fast_clear_ms, 200);
        assert_eq!(config.router.global_lock_ms, 5000);
        assert_eq!(config.router.budget_max, 5);
        assert_eq!(config.router.cooldown_overrides_ms["button_click"], 9000);
        assert_eq!(config.router.cooldown_overrides_ms["slider_changed"], 5000);
        assert!(config.typing.disable_scramble);
        assert_eq!(config.typing.deletion, Some(DeletionStrategy::Word));
        assert_eq!(config.typing.seed, Some(7));
        assert_eq!(config.machine.seed, Some(7));
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let file = write_toml("[router]\nbudget_max = 4\n");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.router.budget_max, 4);
        assert_eq!(config.router.budget_refill_ms, 45_000);
        assert_eq!(config.machine.fade_ms, 100);
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/path/chazy.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[router\nbudget_max = \"three\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_inconsistent_values_rejected() {
        let file = write_toml(
            "[machine]\nfirst_line_delay_min_ms = 6000\nfirst_line_delay_max_ms = 1000\n",
        );
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[typing]\nseed = 1\ndeletion = \"word\"\n");
        let env = |key: &str| match key {
            "CHAZY_SEED" => Some("99".to_string()),
            "CHAZY_DELETION" => Some("character".to_string()),
            "CHAZY_DISABLE_TYPOS" => Some("true".to_string()),
            _ => None,
        };
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.typing.seed, Some(99));
        assert_eq!(config.typing.deletion, Some(DeletionStrategy::Character));
        assert!(config.typing.disable_typos);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let env = |key: &str| match key {
            "CHAZY_SEED" => Some("abc".to_string()),
            "CHAZY_DELETION" => Some("shred".to_string()),
            _ => None,
        };
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.typing.seed, None);
        assert_eq!(config.typing.deletion, None);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = |key: &str| (key == "CHAZY_SEED").then(|| "5".to_string());
        let mut config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.source(), ConfigSource::Env);

        ConfigOverrides::new()
            .with_seed(6)
            .with_typos(false)
            .without_lead_in()
            .apply(&mut config);

        assert_eq!(config.typing.seed, Some(6));
        assert!(config.typing.disable_typos);
        assert_eq!(config.machine.first_line_delay_max_ms, 0);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = ChazyConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
