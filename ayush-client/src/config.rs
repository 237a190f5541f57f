//! Runtime configuration for ayush-client
//!
//! Resolves the bootstrap [`TomlConfig`] and command-line overrides into the
//! values the session orchestrator and HTTP store actually use.

use ayush_common::config::{resolve_api_base_url, TomlConfig};
use std::time::Duration;
use tracing::info;

/// Resolved client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API base URL without trailing slash
    pub api_base_url: String,

    /// Bearer token attached to every request, if any
    pub access_token: Option<String>,

    /// Delay from run start until the cosmetic Mapping stage
    pub mapping_delay: Duration,

    /// Delay from run start until the cosmetic Validation stage
    pub validation_delay: Duration,

    /// Bound on the pipeline invocation (`None` = unbounded)
    pub run_timeout: Option<Duration>,

    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl ClientConfig {
    /// Resolve from TOML plus command-line overrides
    ///
    /// A command-line token wins over the TOML token.
    pub fn resolve(
        toml_config: &TomlConfig,
        cli_api_url: Option<&str>,
        cli_token: Option<&str>,
    ) -> Self {
        let api_base_url = resolve_api_base_url(cli_api_url, toml_config);
        let access_token = cli_token
            .map(str::to_string)
            .or_else(|| toml_config.access_token.clone())
            .filter(|t| !t.trim().is_empty());

        let pipeline = &toml_config.pipeline;
        let config = Self {
            api_base_url,
            access_token,
            mapping_delay: Duration::from_millis(pipeline.mapping_delay_ms),
            validation_delay: Duration::from_millis(pipeline.validation_delay_ms),
            run_timeout: match pipeline.run_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            http_timeout: Duration::from_secs(pipeline.http_timeout_secs),
        };

        info!(
            api_base_url = %config.api_base_url,
            authenticated = config.access_token.is_some(),
            run_timeout_secs = ?config.run_timeout.map(|d| d.as_secs()),
            "Resolved client configuration"
        );
        config
    }

    /// Configuration pointing at an explicit base URL with built-in defaults
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let defaults = TomlConfig::default().pipeline;
        Self {
            api_base_url: ayush_common::config::DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            mapping_delay: Duration::from_millis(defaults.mapping_delay_ms),
            validation_delay: Duration::from_millis(defaults.validation_delay_ms),
            run_timeout: Some(Duration::from_secs(defaults.run_timeout_secs)),
            http_timeout: Duration::from_secs(defaults.http_timeout_secs),
        }
    }
}
