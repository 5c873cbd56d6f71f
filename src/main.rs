//! TLS Edge Proxy
//!
//! Terminates TLS and forwards to one upstream origin, optionally redirecting
//! plaintext HTTP to the TLS listener.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                  EDGE PROXY                      │
//!                    │                                                  │
//!   http://host:2021 │  ┌──────────────┐                                │
//!   ─────────────────┼─▶│   redirect   │── 301 https://host:2022/... ───┼──▶ Client
//!                    │  └──────────────┘                                │
//!                    │                                                  │
//!  https://host:2022 │  ┌──────────────┐    ┌───────────┐               │
//!   ─────────────────┼─▶│     TLS      │───▶│ forwarder │───────────────┼──▶ Upstream
//!                    │  │  terminator  │    │ Host/path │               │
//!                    │  └──────────────┘    └───────────┘               │
//!                    │                                                  │
//!                    │  ┌────────────────────────────────────────────┐  │
//!                    │  │ orchestrator: start both, stop both when   │  │
//!                    │  │ either returns, aggregate their errors     │  │
//!                    │  └────────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use tls_edge_proxy::config::load_config;
use tls_edge_proxy::lifecycle::{run_until_signal, shutdown_signal};
use tls_edge_proxy::observability::init_logging;
use tls_edge_proxy::ProxyOrchestrator;

#[derive(Parser)]
#[command(name = "tls-edge-proxy")]
#[command(about = "TLS terminating edge proxy with HTTP to HTTPS redirect", long_about = None)]
struct Cli {
    /// Config file for the proxy (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, overriding the config file (RUST_LOG still wins).
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.log_filter.as_deref().unwrap_or("tls_edge_proxy=info"));
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    init_logging(cli.log_filter.as_deref().unwrap_or(&config.observability.log_filter));

    tracing::info!(
        tls_port = config.tls.port,
        upstream = %config.tls.upstream,
        redirect_enabled = config.redirect.enabled,
        redirect_port = config.redirect.port,
        redirect_upstream_port = config.redirect.upstream_port,
        "Configuration loaded"
    );

    let proxy = ProxyOrchestrator::new(config);
    run_until_signal(&proxy, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
