//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!
//! Consumers:
//!     → stdout, picked up by the process supervisor
//! ```

pub mod logging;

pub use logging::init_logging;
