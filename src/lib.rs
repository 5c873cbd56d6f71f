//! TLS Edge Proxy Library
//!
//! A TLS terminating listener forwarding to a single upstream origin, plus an
//! optional plaintext listener redirecting to it, run together by
//! [`ProxyOrchestrator`].

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::{ProxyOrchestrator, Runnable};
