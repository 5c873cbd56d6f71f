//! Plaintext listener that answers every request with a redirect to HTTPS.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::future::BoxFuture;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{RedirectConfig, TimeoutConfig};
use crate::error::ProxyError;
use crate::http::host::{replace_port, request_host};
use crate::lifecycle::Runnable;
use crate::net::{bind_addr, listener, ListenerControl};

#[derive(Clone)]
struct RedirectState {
    upstream_port: u16,
}

/// The redirect responder.
pub struct RedirectServer {
    config: RedirectConfig,
    router: Router,
    control: ListenerControl,
}

impl RedirectServer {
    pub fn new(config: RedirectConfig, timeouts: &TimeoutConfig) -> Self {
        let router = Self::build_router(&config, timeouts);
        Self {
            config,
            router,
            control: ListenerControl::new(timeouts.shutdown_grace()),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &RedirectConfig, timeouts: &TimeoutConfig) -> Router {
        let state = Arc::new(RedirectState {
            upstream_port: config.upstream_port,
        });
        Router::new()
            .fallback(redirect_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(timeouts.request()))
            .layer(TraceLayer::new_for_http())
    }

    pub fn control(&self) -> &ListenerControl {
        &self.control
    }

    async fn serve(&self) -> Result<(), ProxyError> {
        let addr = bind_addr(self.config.port);
        tracing::info!(address = %addr, "Starting redirect server");

        let listener = listener::bind(addr)?;
        self.control.mark_serving();

        axum_server::from_tcp(listener)
            .handle(self.control.handle())
            .serve(self.router.clone().into_make_service())
            .await
            .map_err(|source| ProxyError::Serve {
                name: "redirect",
                source,
            })
    }
}

impl Runnable for RedirectServer {
    fn name(&self) -> &'static str {
        "redirect"
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
            tracing::info!("Stopping redirect server");
            self.control.shutdown().await;
            tracing::info!("Redirect server stopped");
            Ok(())
        })
    }
}

async fn redirect_handler(State(state): State<Arc<RedirectState>>, request: Request<Body>) -> Response {
    let host = request_host(request.headers(), request.uri());
    let original = request.uri().to_string();

    let target_host = match replace_port(&host, state.upstream_port) {
        Ok(rewritten) => rewritten,
        Err(e) => {
            tracing::error!(original = %original, error = %e, "Bad host for redirect request");
            if host.is_empty() {
                return StatusCode::BAD_REQUEST.into_response();
            }
            host
        }
    };

    let location = https_location(&target_host, request.uri());
    tracing::info!(original = %original, target = %location, "Redirecting request");

    match HeaderValue::try_from(location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(original = %original, error = %e, "Redirect target is not a valid header value");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// `https://<host><path>[?query]` for the request's path and query.
fn https_location(host: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("https://{host}{path_and_query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn server(upstream_port: u16) -> RedirectServer {
        RedirectServer::new(
            RedirectConfig {
                enabled: true,
                port: 0,
                upstream_port,
            },
            &TimeoutConfig::default(),
        )
    }

    async fn call(router: Router, host: Option<&str>, uri: &str) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[test]
    fn location_keeps_path_and_query() {
        let uri: Uri = "/foo?x=1".parse().unwrap();
        assert_eq!(https_location("example.com:2022", &uri), "https://example.com:2022/foo?x=1");
    }

    #[tokio::test]
    async fn redirects_to_upstream_port() {
        let response = call(server(2022).router, Some("example.com:2021"), "/foo?x=1").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&response), "https://example.com:2022/foo?x=1");
    }

    #[tokio::test]
    async fn bare_host_gets_port_added() {
        let response = call(server(443).router, Some("example.com"), "/").await;
        assert_eq!(location(&response), "https://example.com:443/");
    }

    #[tokio::test]
    async fn missing_host_is_bad_request() {
        let response = call(server(2022).router, None, "/foo").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn nameless_host_still_redirects() {
        let response = call(server(2022).router, Some(":8080"), "/foo").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&response), "https://:8080/foo");
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let server = server(2022);
        server.stop().await.unwrap();
        server.stop().await.unwrap();
    }
}
