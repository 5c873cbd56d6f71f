//! Single-upstream request forwarding.
//!
//! # Responsibilities
//! - Resolve each request's path/query against the upstream base URL
//! - Strip hop-by-hop headers in both directions
//! - Record the client in `X-Forwarded-For`
//! - Map upstream failures to 502
//!
//! # Design Decisions
//! - No routing: every request goes to the same origin
//! - Bodies are streamed, never buffered
//! - The `Host` header is decided by the caller; nothing here rewrites it

use std::net::IpAddr;

use axum::{
    body::Body,
    http::{
        header,
        uri::{Authority, Scheme},
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::ProxyError;

/// Headers that only describe a single connection.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Forwards requests to one upstream origin.
#[derive(Clone)]
pub struct Forwarder {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl Forwarder {
    /// Parse the upstream URL and build the HTTP client.
    pub fn new(upstream: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: String| ProxyError::UpstreamConfig {
            url: upstream.to_string(),
            reason,
        };

        let uri: Uri = upstream.parse().map_err(|e: axum::http::uri::InvalidUri| invalid(e.to_string()))?;
        let scheme = uri
            .scheme()
            .cloned()
            .ok_or_else(|| invalid("missing scheme".to_string()))?;
        if scheme != Scheme::HTTP && scheme != Scheme::HTTPS {
            return Err(invalid(format!("unsupported scheme {scheme}")));
        }
        let authority = uri
            .authority()
            .cloned()
            .filter(|a| !a.host().is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            scheme,
            authority,
            base_path: uri.path().to_string(),
            base_query: uri.query().map(str::to_string),
            client,
        })
    }

    /// Port written explicitly in the upstream URL, if any.
    pub fn upstream_port(&self) -> Option<u16> {
        self.authority.port_u16()
    }

    /// The upstream URI a request for `incoming` is sent to.
    pub fn target_uri(&self, incoming: &Uri) -> Result<Uri, axum::http::Error> {
        let mut path_and_query = join_paths(&self.base_path, incoming.path());
        let query = match (self.base_query.as_deref(), incoming.query()) {
            (Some(base), Some(req)) if !base.is_empty() && !req.is_empty() => Some(format!("{base}&{req}")),
            (Some(base), None) | (Some(base), Some("")) => Some(base.to_string()),
            (_, Some(req)) => Some(req.to_string()),
            (None, None) => None,
        };
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            path_and_query.push('?');
            path_and_query.push_str(&query);
        }

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }

    /// Send `request` upstream with `host` as its `Host` header.
    pub async fn forward(&self, request: Request<Body>, host: &str, client_ip: IpAddr) -> Response {
        let (mut parts, body) = request.into_parts();

        let uri = match self.target_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(uri = %parts.uri, error = %e, "Could not build upstream URI");
                return (StatusCode::BAD_GATEWAY, "Invalid upstream request").into_response();
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        if !host.is_empty() {
            if let Ok(value) = HeaderValue::from_str(host) {
                parts.headers.insert(header::HOST, value);
            }
        }
        append_forwarded_for(&mut parts.headers, client_ip);

        parts.uri = uri;
        parts.version = Version::HTTP_11;
        let upstream_uri = parts.uri.clone();

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(upstream = %upstream_uri, error = %e, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

/// Join two paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {client_ip}", prior.join(", "))
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_unusable_upstreams() {
        for upstream in ["", "/relative", "ftp://files.example.com", "localhost:9000"] {
            assert!(
                matches!(Forwarder::new(upstream), Err(ProxyError::UpstreamConfig { .. })),
                "{upstream:?} should be rejected"
            );
        }
    }

    #[test]
    fn explicit_port_is_remembered() {
        assert_eq!(Forwarder::new("http://localhost:9000").unwrap().upstream_port(), Some(9000));
        assert_eq!(Forwarder::new("http://localhost:80").unwrap().upstream_port(), Some(80));
        assert_eq!(Forwarder::new("https://origin.internal/api").unwrap().upstream_port(), None);
    }

    #[test]
    fn target_uri_appends_request_path() {
        let fwd = Forwarder::new("http://localhost:9000").unwrap();
        assert_eq!(fwd.target_uri(&uri("/bar")).unwrap(), "http://localhost:9000/bar");
        assert_eq!(fwd.target_uri(&uri("/bar?x=1")).unwrap(), "http://localhost:9000/bar?x=1");
    }

    #[test]
    fn target_uri_joins_base_path_and_queries() {
        let fwd = Forwarder::new("https://origin.internal/api/?key=k").unwrap();
        assert_eq!(
            fwd.target_uri(&uri("/v1/items?page=2")).unwrap(),
            "https://origin.internal/api/v1/items?key=k&page=2"
        );

        let fwd = Forwarder::new("http://origin.internal/api").unwrap();
        assert_eq!(fwd.target_uri(&uri("/")).unwrap(), "http://origin.internal/api/");
        assert_eq!(fwd.target_uri(&uri("/v1")).unwrap(), "http://origin.internal/api/v1");
    }

    #[test]
    fn join_paths_uses_single_slash() {
        assert_eq!(join_paths("/a/", "/b"), "/a/b");
        assert_eq!(join_paths("/a", "b"), "/a/b");
        assert_eq!(join_paths("/a", "/b"), "/a/b");
        assert_eq!(join_paths("", "/b"), "/b");
    }

    #[test]
    fn strips_hop_by_hop_and_connection_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-session-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hop", HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2");
    }

    /// Upstream that answers with the raw request head it received.
    async fn echo_upstream() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\nX-Upstream: echo\r\n\r\n{}",
                        head.len(),
                        head
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn forward_sends_host_and_strips_connection_headers() {
        let upstream = echo_upstream().await;
        let fwd = Forwarder::new(&format!("http://{upstream}/base")).unwrap();

        let request = Request::builder()
            .uri("/bar?x=1")
            .header(header::HOST, "client.example:2022")
            .header(header::CONNECTION, "x-drop-me")
            .header("x-drop-me", "1")
            .header("x-keep-me", "1")
            .body(Body::empty())
            .unwrap();

        let response = fwd
            .forward(request, "client.example:9000", "192.0.2.7".parse().unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-upstream"], "echo");
        assert!(response.headers().get(header::CONNECTION).is_none());

        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let head = String::from_utf8(body.to_vec()).unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /base/bar?x=1 http/1.1\r\n"), "{head}");
        assert!(head.contains("host: client.example:9000\r\n"));
        assert!(head.contains("x-forwarded-for: 192.0.2.7\r\n"));
        assert!(head.contains("x-keep-me: 1\r\n"));
        assert!(!head.contains("x-drop-me"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fwd = Forwarder::new(&format!("http://{addr}")).unwrap();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = fwd.forward(request, "", "127.0.0.1".parse().unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
