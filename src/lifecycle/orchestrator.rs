//! Owns both listeners for one start/stop cycle.
//!
//! # Responsibilities
//! - Build the TLS terminator (always) and redirect responder (when enabled)
//! - Start every listener on its own task
//! - Stop all of them as soon as the first one returns
//! - Aggregate every `start` error in observation order
//!
//! # Design Decisions
//! - One mutex guards state, listeners and the completion signal; it is never
//!   held across an await
//! - Results travel over an mpsc channel sized to the number of listeners
//! - A fresh watch channel per lifecycle broadcasts completion exactly once to
//!   external `stop` callers
//! - A dropped `start` future still stops every listener and reaches `Stopped`

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{join_all, BoxFuture};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::{RedirectServer, TlsTerminator};
use crate::lifecycle::Runnable;

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Builds the listeners for one lifecycle.
pub type RunnableFactory = Box<dyn Fn() -> Result<Vec<Arc<dyn Runnable>>, ProxyError> + Send + Sync>;

struct Lifecycle {
    state: OrchestratorState,
    runnables: Vec<Arc<dyn Runnable>>,
    done: Option<watch::Receiver<bool>>,
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    // Nothing panics while holding the lock; recover the data regardless.
    lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Move to `Stopped` and wake every `stop` caller waiting on this lifecycle.
fn finish_lifecycle(lifecycle: &Mutex<Lifecycle>, done: &watch::Sender<bool>) {
    {
        let mut lifecycle = lock(lifecycle);
        lifecycle.state = OrchestratorState::Stopped;
        lifecycle.runnables.clear();
        lifecycle.done = None;
    }
    done.send_replace(true);
}

/// Completes a running lifecycle, even when the `start` future is dropped early.
struct RunningGuard {
    lifecycle: Arc<Mutex<Lifecycle>>,
    runnables: Vec<Arc<dyn Runnable>>,
    done: Option<watch::Sender<bool>>,
}

impl RunningGuard {
    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            finish_lifecycle(&self.lifecycle, &done);
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let Some(done) = self.done.take() else {
            return;
        };
        tracing::warn!("Proxy start cancelled; stopping listeners");

        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.state == OrchestratorState::Running {
                lifecycle.state = OrchestratorState::Stopping;
            }
        }

        let lifecycle = Arc::clone(&self.lifecycle);
        let runnables = std::mem::take(&mut self.runnables);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for result in join_all(runnables.iter().map(|r| r.stop())).await {
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "Stop failed");
                        }
                    }
                    finish_lifecycle(&lifecycle, &done);
                });
            }
            // Runtime gone: the listener tasks died with it.
            Err(_) => finish_lifecycle(&lifecycle, &done),
        }
    }
}

/// Starts, supervises and stops the proxy's listeners.
pub struct ProxyOrchestrator {
    factory: RunnableFactory,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl ProxyOrchestrator {
    /// Orchestrate the listeners described by `config`.
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_factory(Box::new(move || build_runnables(&config)))
    }

    /// Orchestrate whatever `factory` builds on each start.
    pub fn with_factory(factory: RunnableFactory) -> Self {
        Self {
            factory,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: OrchestratorState::Idle,
                runnables: Vec::new(),
                done: None,
            })),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    /// Run every listener until the first one returns, then shut all of them down.
    ///
    /// Returns `AlreadyRunning` if another lifecycle is active, otherwise the
    /// combined `start` errors of every listener (`Ok` only if none failed).
    pub async fn start(&self) -> Result<(), ProxyError> {
        if !matches!(self.state(), OrchestratorState::Idle | OrchestratorState::Stopped) {
            return Err(ProxyError::AlreadyRunning);
        }

        let runnables = (self.factory)()?;

        let mut guard = {
            let mut lifecycle = self.lock();
            if !matches!(lifecycle.state, OrchestratorState::Idle | OrchestratorState::Stopped) {
                return Err(ProxyError::AlreadyRunning);
            }
            let (done_tx, done_rx) = watch::channel(false);
            lifecycle.state = OrchestratorState::Running;
            lifecycle.runnables = runnables.clone();
            lifecycle.done = Some(done_rx);
            RunningGuard {
                lifecycle: Arc::clone(&self.lifecycle),
                runnables: runnables.clone(),
                done: Some(done_tx),
            }
        };

        tracing::info!(listeners = runnables.len(), "Proxy starting");

        let (results_tx, mut results_rx) = mpsc::channel(runnables.len().max(1));
        for runnable in &runnables {
            let runnable = Arc::clone(runnable);
            let results_tx = results_tx.clone();
            tokio::spawn(async move {
                let result = runnable.start().await;
                let _ = results_tx.send((runnable.name(), result)).await;
            });
        }
        drop(results_tx);

        let mut errors = Vec::new();
        let mut record = |name: &'static str, result: Result<(), ProxyError>| match result {
            Ok(()) => tracing::info!(listener = name, "Listener exited"),
            Err(e) => {
                tracing::error!(listener = name, error = %e, "Listener failed");
                errors.push(e);
            }
        };

        if let Some((name, result)) = results_rx.recv().await {
            record(name, result);
        }

        {
            let mut lifecycle = self.lock();
            if lifecycle.state == OrchestratorState::Running {
                lifecycle.state = OrchestratorState::Stopping;
            }
        }
        tracing::info!("Stopping all listeners");

        let mut stops = JoinSet::new();
        for runnable in &runnables {
            let runnable = Arc::clone(runnable);
            stops.spawn(async move { (runnable.name(), runnable.stop().await) });
        }

        // The first result has already been received.
        for _ in 1..runnables.len() {
            match results_rx.recv().await {
                Some((name, result)) => record(name, result),
                None => break,
            }
        }

        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((name, Err(e))) => tracing::warn!(listener = name, error = %e, "Stop failed"),
                Ok((_, Ok(()))) => {}
                Err(e) => tracing::warn!(error = %e, "Stop task panicked"),
            }
        }

        guard.finish();

        tracing::info!(failures = errors.len(), "Proxy stopped");
        ProxyError::combine(errors)
    }

    /// Stop every listener and wait for the running `start` to finish.
    ///
    /// A no-op returning `Ok` when nothing is running. Errors are the
    /// combined `stop` errors of the listeners.
    pub async fn stop(&self) -> Result<(), ProxyError> {
        let (runnables, done) = {
            let mut lifecycle = self.lock();
            match lifecycle.state {
                OrchestratorState::Idle | OrchestratorState::Stopped => return Ok(()),
                OrchestratorState::Running => lifecycle.state = OrchestratorState::Stopping,
                OrchestratorState::Stopping => {}
            }
            (lifecycle.runnables.clone(), lifecycle.done.clone())
        };

        tracing::info!("Proxy stop requested");

        let results = join_all(runnables.iter().map(|r| r.stop())).await;

        if let Some(mut done) = done {
            // The sender only drops after announcing completion.
            let _ = done.wait_for(|finished| *finished).await;
        }

        ProxyError::combine(results.into_iter().filter_map(Result::err).collect())
    }
}

impl Runnable for ProxyOrchestrator {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ProxyError>> {
        Box::pin(ProxyOrchestrator::start(self))
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), ProxyError>> {
        Box::pin(ProxyOrchestrator::stop(self))
    }
}

/// The TLS terminator, plus the redirect responder when it is enabled.
pub fn build_runnables(config: &ProxyConfig) -> Result<Vec<Arc<dyn Runnable>>, ProxyError> {
    let mut runnables: Vec<Arc<dyn Runnable>> =
        vec![Arc::new(TlsTerminator::new(config.tls.clone(), &config.timeouts)?)];
    if config.redirect.enabled {
        runnables.push(Arc::new(RedirectServer::new(config.redirect.clone(), &config.timeouts)));
    }
    Ok(runnables)
}
