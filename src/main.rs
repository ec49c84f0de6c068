//! API gate (v1)
//!
//! Serves the authenticated, rate-limited upload API and its admin API.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                     API GATE                      │
//!   Client Request      │  ┌────────┐   ┌──────────────────────────────┐   │
//!   ────────────────────┼─▶│  http  │──▶│             gate             │   │
//!                       │  │ server │   │ auth → rate limit → upload   │   │
//!                       │  └────────┘   └──────────────┬───────────────┘   │
//!                       │                              │ Identity          │
//!                       │                              ▼                   │
//!   Client Response     │                      ┌──────────────┐            │
//!   ◀───────────────────┼──────────────────────│   handlers   │            │
//!                       │                      └──────────────┘            │
//!                       │  ┌────────────────────────────────────────────┐  │
//!                       │  │ config · observability · lifecycle · admin │  │
//!                       │  └────────────────────────────────────────────┘  │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use api_gate::admin::setup_admin_router;
use api_gate::auth::{InMemoryAccountStore, InMemoryCredentialStore};
use api_gate::config::watcher::ConfigWatcher;
use api_gate::config::{load_config, GateConfig};
use api_gate::http::HttpServer;
use api_gate::lifecycle::Shutdown;
use api_gate::observability::{logging, metrics};
use api_gate::security::{InMemoryUsageStore, SystemClock};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "api-gate")]
#[command(about = "Authenticated, rate-limited upload API", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload rate-limit and upload policies when the config file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("api-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        anonymous_limit = config.rate_limit.anonymous_limit,
        authenticated_limit = config.rate_limit.authenticated_limit,
        window_secs = config.rate_limit.window_secs,
        upload_max_bytes = config.upload.max_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let credentials = Arc::new(match &config.auth.persistence_path {
        Some(path) => InMemoryCredentialStore::load_from_file(Path::new(path))?,
        None => InMemoryCredentialStore::new(None),
    });
    let min_password_len = config.auth.min_password_len;
    let accounts = Arc::new(match &config.auth.accounts_path {
        Some(path) => InMemoryAccountStore::load_from_file(Path::new(path), min_password_len)?,
        None => InMemoryAccountStore::new(min_password_len, None),
    });

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::with_components(
        config.clone(),
        credentials.clone(),
        accounts.clone(),
        Arc::new(InMemoryUsageStore::new()),
        Arc::new(SystemClock),
    );

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin = setup_admin_router(server.state().clone(), &config.admin.api_key);
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    if let Err(e) = credentials.save_to_file() {
        tracing::error!(error = %e, "Failed to save credentials");
    }
    if let Err(e) = accounts.save_to_file() {
        tracing::error!(error = %e, "Failed to save accounts");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
