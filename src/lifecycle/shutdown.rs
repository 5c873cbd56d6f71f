//! Graceful shutdown supervision for a [`Runnable`].

use std::future::Future;

use crate::error::ProxyError;
use crate::lifecycle::Runnable;

/// Run `runnable` until it returns on its own or `signal` fires.
///
/// On the signal, `stop` is issued while `start` keeps being driven, and the
/// result of `start` is returned. Stop errors are logged, not returned.
pub async fn run_until_signal<R, S>(runnable: &R, signal: S) -> Result<(), ProxyError>
where
    R: Runnable + ?Sized,
    S: Future<Output = ()>,
{
    let mut start = runnable.start();

    tokio::select! {
        result = &mut start => return result,
        () = signal => {
            tracing::info!(component = runnable.name(), "Shutdown signal received");
        }
    }

    let (result, stopped) = tokio::join!(start, runnable.stop());
    if let Err(e) = stopped {
        tracing::warn!(component = runnable.name(), error = %e, "Errors during shutdown");
    }
    result
}
