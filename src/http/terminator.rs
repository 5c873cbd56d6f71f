//! TLS listener that forwards decrypted requests to the upstream.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use futures_util::future::BoxFuture;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{TimeoutConfig, TlsConfig};
use crate::error::ProxyError;
use crate::http::forward::Forwarder;
use crate::http::host::{replace_port, request_host};
use crate::lifecycle::Runnable;
use crate::net::{bind_addr, listener, tls::load_tls_config, ListenerControl};

/// The TLS terminator.
pub struct TlsTerminator {
    config: TlsConfig,
    forwarder: Arc<Forwarder>,
    router: Router,
    control: ListenerControl,
}

impl TlsTerminator {
    /// Parse the upstream and prepare the router. Nothing is bound yet.
    pub fn new(config: TlsConfig, timeouts: &TimeoutConfig) -> Result<Self, ProxyError> {
        let forwarder = Arc::new(Forwarder::new(&config.upstream)?);
        tracing::debug!(
            upstream = %config.upstream,
            upstream_port = ?forwarder.upstream_port(),
            "Proxying to target"
        );

        let router = Self::build_router(Arc::clone(&forwarder), timeouts);
        Ok(Self {
            config,
            forwarder,
            router,
            control: ListenerControl::new(timeouts.shutdown_grace()),
        })
    }

    #[allow(deprecated)]
    fn build_router(forwarder: Arc<Forwarder>, timeouts: &TimeoutConfig) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(forwarder)
            .layer(TimeoutLayer::new(timeouts.request()))
            .layer(TraceLayer::new_for_http())
    }

    /// Port the forwarded `Host` header is rewritten to, if the upstream names one.
    pub fn upstream_port(&self) -> Option<u16> {
        self.forwarder.upstream_port()
    }

    pub fn control(&self) -> &ListenerControl {
        &self.control
    }

    async fn serve(&self) -> Result<(), ProxyError> {
        let addr = bind_addr(self.config.port);
        tracing::info!(address = %addr, "Starting TLS server");

        let tls = load_tls_config(&self.config.cert_file, &self.config.key_file).await?;
        let listener = listener::bind(addr)?;
        self.control.mark_serving();

        axum_server::tls_rustls::from_tcp_rustls(listener, tls)
            .handle(self.control.handle())
            .serve(
                self.router
                    .clone()
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .map_err(|source| ProxyError::Serve { name: "tls", source })
    }
}

impl Runnable for TlsTerminator {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ProxyError>> {
        Box::pin(async move {
            let result = self.serve().await;
            self.control.mark_closed();
            result
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), ProxyError>> {
        Box::pin(async move {
            tracing::info!("Stopping TLS server");
            self.control.shutdown().await;
            tracing::info!("TLS server stopped");
            Ok(())
        })
    }
}

async fn proxy_handler(
    State(forwarder): State<Arc<Forwarder>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    tracing::info!(uri = %request.uri(), peer = %peer, "Proxying request");

    let host = forwarded_host(request_host(request.headers(), request.uri()), forwarder.upstream_port());
    forwarder.forward(request, &host, peer.ip()).await
}

/// Host header sent upstream: the client's host moved to the upstream's port.
///
/// A failed rewrite never blocks the request; the client's host is forwarded as is.
fn forwarded_host(host: String, upstream_port: Option<u16>) -> String {
    match upstream_port {
        Some(port) => replace_port(&host, port).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Forwarding original host");
            host
        }),
        None => host,
    }
}
