//! The start/stop contract shared by listeners and the orchestrator.

use futures_util::future::BoxFuture;

use crate::error::ProxyError;

/// A long-running component with a blocking `start` and an idempotent `stop`.
///
/// `start` resolves only once the component has stopped serving: `Ok(())`
/// after a requested stop, `Err` when it could not start or failed while
/// serving. `stop` asks an in-flight `start` to finish gracefully and may be
/// called any number of times, including after `start` already returned.
pub trait Runnable: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn start(&self) -> BoxFuture<'_, Result<(), ProxyError>>;

    fn stop(&self) -> BoxFuture<'_, Result<(), ProxyError>>;
}
