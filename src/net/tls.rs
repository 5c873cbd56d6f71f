//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::error::ProxyError;

/// Load TLS configuration from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, ProxyError> {
    let tls_err = |source| ProxyError::TlsConfig {
        cert: cert_path.to_path_buf(),
        key: key_path.to_path_buf(),
        source,
    };

    for (kind, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.is_file() {
            return Err(tls_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{kind} file not found: {path:?}"),
            )));
        }
    }

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(tls_err)
}
