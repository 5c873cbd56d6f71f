//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate port values and listener conflicts
//! - Check the upstream is an absolute http(s) URL
//! - Check TLS material paths are readable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function over the config plus file readability
//! - Runs before config is accepted into the system

use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tls.port must be non-zero")]
    MissingTlsPort,
    #[error("tls.upstream {url:?} is not an absolute http(s) URL: {reason}")]
    InvalidUpstream { url: String, reason: String },
    #[error("missing TLS {0} file")]
    MissingTlsFile(&'static str),
    #[error("TLS {kind} file {path:?} is not readable: {reason}")]
    UnreadableTlsFile {
        kind: &'static str,
        path: String,
        reason: String,
    },
    #[error("redirect.port must be non-zero when the redirect listener is enabled")]
    MissingRedirectPort,
    #[error("redirect.upstream_port must be non-zero when the redirect listener is enabled")]
    MissingRedirectUpstreamPort,
    #[error("redirect.port and tls.port are both {0}")]
    PortConflict(u16),
}

/// Validate a fully defaulted configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.tls.port == 0 {
        errors.push(ValidationError::MissingTlsPort);
    }

    if let Err(reason) = check_upstream(&config.tls.upstream) {
        errors.push(ValidationError::InvalidUpstream {
            url: config.tls.upstream.clone(),
            reason,
        });
    }

    check_readable("cert", &config.tls.cert_file, &mut errors);
    check_readable("key", &config.tls.key_file, &mut errors);

    let redirect = &config.redirect;
    if redirect.enabled {
        if redirect.port == 0 {
            errors.push(ValidationError::MissingRedirectPort);
        }
        if redirect.upstream_port == 0 {
            errors.push(ValidationError::MissingRedirectUpstreamPort);
        }
        if redirect.port != 0 && redirect.port == config.tls.port {
            errors.push(ValidationError::PortConflict(redirect.port));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream(upstream: &str) -> Result<(), String> {
    let url = Url::parse(upstream).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {other:?}")),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(())
}

fn check_readable(kind: &'static str, path: &Path, errors: &mut Vec<ValidationError>) {
    if path.as_os_str().is_empty() {
        errors.push(ValidationError::MissingTlsFile(kind));
        return;
    }
    if let Err(e) = std::fs::File::open(path) {
        errors.push(ValidationError::UnreadableTlsFile {
            kind,
            path: path.display().to_string(),
            reason: e.to_string(),
        });
    }
}
