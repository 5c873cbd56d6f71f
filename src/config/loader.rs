//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides the port redirects point at.
pub const ENV_REDIRECT_UPSTREAM_PORT: &str = "REDIRECT_UPSTREAM_PORT";
/// Overrides the TLS listener's upstream URL.
pub const ENV_TLS_UPSTREAM: &str = "TLS_UPSTREAM";

const DEFAULT_REDIRECT_PORT: u16 = 2021;
const DEFAULT_TLS_PORT: u16 = 2022;
const DEFAULT_HTTPS_PORT: u16 = 443;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, default and validate configuration from a TOML file.
///
/// `None` (or an empty path) starts from the built-in defaults instead of a file.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let config = match path.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    finalize(config, |key| std::env::var(key).ok())
}

/// Apply environment overrides and defaults, then validate.
pub fn finalize<F>(config: ProxyConfig, env: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = apply_defaults(apply_env_overrides(config, env));
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Environment variables win over file values.
pub fn apply_env_overrides<F>(mut config: ProxyConfig, env: F) -> ProxyConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = env(ENV_REDIRECT_UPSTREAM_PORT).and_then(|v| v.trim().parse::<u16>().ok()) {
        config.redirect.upstream_port = port;
    }

    if let Some(upstream) = env(ENV_TLS_UPSTREAM).filter(|v| !v.is_empty()) {
        config.tls.upstream = upstream;
    }

    config
}

/// Fill in unset ports.
pub fn apply_defaults(mut config: ProxyConfig) -> ProxyConfig {
    if config.redirect.upstream_port == 0 {
        config.redirect.upstream_port = DEFAULT_HTTPS_PORT;
    }

    match (config.redirect.port, config.tls.port) {
        (0, 0) => {
            config.redirect.port = DEFAULT_REDIRECT_PORT;
            config.tls.port = DEFAULT_TLS_PORT;
        }
        (0, tls) => config.redirect.port = tls.saturating_add(1),
        (redirect, 0) => config.tls.port = redirect.saturating_add(1),
        _ => {}
    }

    config
}
