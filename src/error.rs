//! Error kinds shared by the listeners and the orchestrator.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Every failure the proxy core can report.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// `start` was called while a lifecycle is already active.
    #[error("already running")]
    AlreadyRunning,

    /// A listener could not acquire its port.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Certificate or private key could not be used.
    #[error("unusable TLS material (cert {cert:?}, key {key:?}): {source}")]
    TlsConfig {
        cert: PathBuf,
        key: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Host rewrite input was malformed.
    #[error("invalid host {0:?}")]
    InvalidHost(String),

    /// The upstream URL could not be turned into a forwarding target.
    #[error("invalid upstream {url:?}: {reason}")]
    UpstreamConfig { url: String, reason: String },

    /// A listener failed while serving.
    #[error("{name} server failed: {source}")]
    Serve {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Several errors from one lifecycle, in the order they were observed.
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<ProxyError>),
}

impl ProxyError {
    /// Fold collected errors into a single result.
    ///
    /// No errors is success, a single error is returned as is, anything more
    /// becomes [`ProxyError::Aggregate`].
    pub fn combine(mut errors: Vec<ProxyError>) -> Result<(), ProxyError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ProxyError::Aggregate(errors)),
        }
    }

    /// Iterate over the leaf errors, descending into aggregates.
    pub fn flatten(&self) -> Vec<&ProxyError> {
        match self {
            ProxyError::Aggregate(errors) => errors.iter().flat_map(|e| e.flatten()).collect(),
            other => vec![other],
        }
    }

    pub fn is_bind(&self) -> bool {
        self.flatten().iter().any(|e| matches!(e, ProxyError::Bind { .. }))
    }

    pub fn is_tls_config(&self) -> bool {
        self.flatten().iter().any(|e| matches!(e, ProxyError::TlsConfig { .. }))
    }
}

fn join_messages(errors: &[ProxyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
