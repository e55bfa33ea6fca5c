//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every section has
//! built-in defaults, so an empty file (or no file at all) yields a usable
//! configuration apart from the backend credentials.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--config, --root-folder)
//! 2. Environment variables (LEXI_CONFIG, LEXI_ROOT_FOLDER, LEXI_API_KEY)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "LEXI_CONFIG";
/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "LEXI_ROOT_FOLDER";
/// Environment variable holding the backend API key
pub const API_KEY_ENV_VAR: &str = "LEXI_API_KEY";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the word collection snapshot (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Inference backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Batching, retry and throttling settings
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Inference backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer credential. `LEXI_API_KEY` takes precedence over this value.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Timeout applied to each individual HTTP attempt
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional client-side request quota
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    /// Writing system the backend expects source words in
    /// ("latin", "cyrillic", "greek", "arabic", "hebrew", "cjk", "kana", "hangul")
    #[serde(default = "default_expected_script")]
    pub expected_script: String,

    /// Language the translations are produced in
    #[serde(default = "default_native_language")]
    pub native_language: String,

    /// Language being learned
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: None,
            temperature: default_temperature(),
            request_timeout_ms: default_request_timeout_ms(),
            requests_per_minute: None,
            expected_script: default_expected_script(),
            native_language: default_native_language(),
            target_language: default_target_language(),
        }
    }
}

/// Batching, retry and inter-batch throttle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Maximum number of source items per backend call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-call retry policy (error recovery)
    #[serde(default)]
    pub retry: RetrySettings,

    /// Inter-batch delay (request-rate shaping)
    #[serde(default)]
    pub throttle: ThrottleSettings,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry: RetrySettings::default(),
            throttle: ThrottleSettings::default(),
        }
    }
}

/// Retry-with-exponential-backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Progressive inter-batch delay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleSettings {
    #[serde(default = "default_throttle_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_throttle_step_ms")]
    pub step_ms: u64,
    #[serde(default = "default_throttle_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_throttle_base_delay_ms(),
            step_ms: default_throttle_step_ms(),
            max_delay_ms: default_throttle_max_delay_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_expected_script() -> String {
    "latin".to_string()
}

fn default_native_language() -> String {
    "English".to_string()
}

fn default_target_language() -> String {
    "Spanish".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_throttle_base_delay_ms() -> u64 {
    500
}

fn default_throttle_step_ms() -> u64 {
    250
}

fn default_throttle_max_delay_ms() -> u64 {
    3_000
}

/// Values that signal an unconfigured credential or model
const PLACEHOLDER_VALUES: &[&str] = &[
    "your_api_key",
    "your-api-key",
    "your_api_key_here",
    "changeme",
    "sk-...",
    "<api-key>",
    "<model>",
    "todo",
];

/// Validate a credential or identifier (non-empty, non-whitespace, not a placeholder)
pub fn is_valid_key(key: &str) -> bool {
    let trimmed = key.trim();
    !trimmed.is_empty() && !PLACEHOLDER_VALUES.contains(&trimmed.to_ascii_lowercase().as_str())
}

impl TomlConfig {
    /// Resolve the backend API key
    ///
    /// **Priority:** ENV → TOML. Returns `None` when neither source holds a valid key;
    /// the pipeline reports that as a configuration error on the task itself.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            if is_valid_key(&key) {
                tracing::info!("Backend API key loaded from environment variable");
                return Some(key);
            }
            tracing::warn!("{} is set but holds an empty or placeholder value", API_KEY_ENV_VAR);
        }

        match self.backend.api_key.as_deref() {
            Some(key) if is_valid_key(key) => {
                tracing::info!("Backend API key loaded from TOML config");
                Some(key.to_string())
            }
            _ => None,
        }
    }
}

/// Resolve which config file to read
///
/// 1. Command-line argument
/// 2. `LEXI_CONFIG` environment variable
/// 3. `<config dir>/lexi/config.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|d| d.join("lexi").join("config.toml"))
}

/// Load TOML config from `path`, falling back to defaults when the file is missing
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::info!("Config file {} not found, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lexi"))
        .unwrap_or_else(|| PathBuf::from("./lexi_data"))
}
