//! TCP listener binding.
//!
//! # Responsibilities
//! - Compute the wildcard bind address for a configured port
//! - Bind the socket before serving so port conflicts surface as `Bind`
//! - Hand a non-blocking std listener to `axum_server`

use std::net::{SocketAddr, TcpListener};

use crate::error::ProxyError;

/// Both listeners bind on all interfaces.
pub fn bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Bind a listener on `addr`, ready to be driven by Tokio.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, ProxyError> {
    let bind_err = |source| ProxyError::Bind { addr, source };

    let listener = TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;

    let local_addr = listener.local_addr().map_err(bind_err)?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
