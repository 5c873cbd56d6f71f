//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listener start
//!     → tls.rs (load PEM materials, TLS listener only)
//!     → listener.rs (bind 0.0.0.0:<port>)
//!     → connection.rs (Serving, shutdown handle attached)
//!     → Hand off to HTTP layer
//!
//! Listener States:
//!     Idle → Serving → Closed
//! ```
//!
//! # Design Decisions
//! - Binding happens before serving so port conflicts surface as `Bind`
//! - Shutdown requests are sticky and may arrive before the bind
//! - Graceful shutdown drains in-flight requests up to a grace period

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ListenerControl, ListenerState};
pub use listener::bind_addr;
