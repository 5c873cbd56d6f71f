//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Plaintext connection (redirect listener)
//!     → redirect.rs (Host → host.rs rewrite to the HTTPS port)
//!     → 301 Moved Permanently to https://<host>:<port><path>
//!
//! TLS connection (terminator)
//!     → terminator.rs (decrypt, Host → host.rs rewrite to the upstream port)
//!     → forward.rs (join path, strip hop-by-hop headers, send upstream)
//!     → Upstream response streamed back to client
//! ```

pub mod forward;
pub mod host;
pub mod redirect;
pub mod terminator;

pub use forward::Forwarder;
pub use host::replace_port;
pub use redirect::RedirectServer;
pub use terminator::TlsTerminator;
