//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tls_edge_proxy::ProxyConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// A validated-looking config with both listeners on the given ports.
pub fn proxy_config(tls_port: u16, redirect_port: Option<u16>, upstream: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.tls.port = tls_port;
    config.tls.upstream = upstream.to_string();
    config.tls.cert_file = fixture("cert.pem");
    config.tls.key_file = fixture("key.pem");
    config.redirect.enabled = redirect_port.is_some();
    config.redirect.port = redirect_port.unwrap_or(0);
    config.redirect.upstream_port = tls_port;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// Start a mock upstream that answers with the raw request head it received.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            head.len(),
                            String::from_utf8_lossy(&head)
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Wait until something accepts connections on `127.0.0.1:port`.
pub async fn wait_for_port(port: u16) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while TcpStream::connect(("127.0.0.1", port)).await.is_err() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("port {port} never started accepting"));
}

/// Send a raw HTTP request and return the raw response.
pub async fn raw_request(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response).to_string()
}
