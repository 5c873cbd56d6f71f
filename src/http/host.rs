//! Host/port rewriting shared by the redirect responder and the forwarder.

use axum::http::{header, HeaderMap, Uri};

use crate::error::ProxyError;

/// Replace the port of `host` (`name` or `name:port`) with `port`.
///
/// Everything from the first `:` on is discarded. An empty host, or one with
/// nothing before the first `:`, is rejected.
pub fn replace_port(host: &str, port: u16) -> Result<String, ProxyError> {
    let name = host.split(':').next().unwrap_or_default();
    if name.is_empty() {
        return Err(ProxyError::InvalidHost(host.to_string()));
    }
    Ok(format!("{name}:{port}"))
}

/// The authority a client addressed: the `Host` header, or the URI authority
/// (HTTP/2 `:authority`). Empty when neither is present.
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bare_host_gets_port() {
        assert_eq!(replace_port("example.com", 2022).unwrap(), "example.com:2022");
    }

    #[test]
    fn existing_port_is_replaced() {
        assert_eq!(replace_port("example.com:2021", 2022).unwrap(), "example.com:2022");
        assert_eq!(replace_port("localhost:1:2", 9000).unwrap(), "localhost:9000");
    }

    #[test]
    fn empty_or_nameless_host_is_invalid() {
        assert!(matches!(replace_port("", 443), Err(ProxyError::InvalidHost(h)) if h.is_empty()));
        assert!(matches!(replace_port(":8080", 443), Err(ProxyError::InvalidHost(h)) if h == ":8080"));
    }

    #[test]
    fn host_header_wins_over_authority() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("a.example:80"));
        let uri: Uri = "https://b.example:443/x".parse().unwrap();
        assert_eq!(request_host(&headers, &uri), "a.example:80");
        assert_eq!(request_host(&HeaderMap::new(), &uri), "b.example:443");
        assert_eq!(request_host(&HeaderMap::new(), &"/x".parse().unwrap()), "");
    }
}
