//! Configuration loading and API endpoint resolution
//!
//! Bootstrap configuration comes from a TOML file. Every field has a built-in
//! default, so a missing file is a warning, never a startup failure.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`AYUSH_API_BASE_URL`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the API base URL
pub const API_BASE_URL_ENV: &str = "AYUSH_API_BASE_URL";

/// Compiled default API base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Base URL of the remote diagnosis service
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Static bearer token attached to requests (acquisition is external)
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Pipeline timing configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Delay before the cosmetic Mapping stage is shown
    #[serde(default = "default_mapping_delay_ms")]
    pub mapping_delay_ms: u64,

    /// Delay before the cosmetic Validation stage is shown (from run start)
    #[serde(default = "default_validation_delay_ms")]
    pub validation_delay_ms: u64,

    /// Bound on the pipeline invocation; 0 disables the bound
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// HTTP client request timeout
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mapping_delay_ms: default_mapping_delay_ms(),
            validation_delay_ms: default_validation_delay_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mapping_delay_ms() -> u64 {
    1000
}

fn default_validation_delay_ms() -> u64 {
    2000
}

fn default_run_timeout_secs() -> u64 {
    45
}

fn default_http_timeout_secs() -> u64 {
    60
}

/// Default configuration file path for the platform
///
/// `<config dir>/ayush/client.toml`, e.g. `~/.config/ayush/client.toml` on Linux.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("ayush").join("client.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load TOML configuration from an explicit path
///
/// Fails if the file is missing or malformed.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Load TOML configuration, degrading to defaults
///
/// A missing file yields defaults with a warning. A malformed file is still
/// an error.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Ok(p) => p,
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                return Ok(TomlConfig::default());
            }
        },
    };

    if !path.exists() {
        warn!(
            "Config file {} not found; using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(&path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the API base URL
///
/// Priority: command-line → environment → TOML → compiled default.
/// A trailing slash is trimmed so endpoint paths can be appended directly.
pub fn resolve_api_base_url(cli_arg: Option<&str>, toml_config: &TomlConfig) -> String {
    // Priority 1: Command-line argument
    if let Some(url) = cli_arg.filter(|u| !u.trim().is_empty()) {
        return normalize_base_url(url);
    }

    // Priority 2: Environment variable
    if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
        if !url.trim().is_empty() {
            return normalize_base_url(&url);
        }
    }

    // Priority 3: TOML config file
    if let Some(url) = toml_config
        .api_base_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
    {
        return normalize_base_url(url);
    }

    // Priority 4: compiled default
    DEFAULT_API_BASE_URL.to_string()
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Write configuration to TOML atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
