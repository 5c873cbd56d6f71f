//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (orchestrator.rs):
//!     Build listeners → spawn each start() → first result arrives
//!     → stop() every listener → collect remaining results → Stopped
//!
//! Stop (orchestrator.rs):
//!     stop() every listener → wait for the start path to finish
//!
//! Signals (signals.rs, shutdown.rs):
//!     SIGTERM/SIGINT → stop() on the supervised runnable
//! ```
//!
//! # Design Decisions
//! - Listeners are only stopped after one of them has returned
//! - Every listener is stopped, including the one that returned first
//! - Listeners are rebuilt on every start

pub mod orchestrator;
pub mod runnable;
pub mod shutdown;
pub mod signals;

pub use orchestrator::{OrchestratorState, ProxyOrchestrator};
pub use runnable::Runnable;
pub use shutdown::run_until_signal;
pub use signals::shutdown_signal;
