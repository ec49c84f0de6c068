//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared gate state from configuration
//! - Create the Axum router with the gate in front of every API route
//!   (sign-up and login pass it as anonymous callers)
//! - Wire up middleware (request ID, tracing, timeout)
//! - Apply hot-reloaded configuration to the live policies
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, Request},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{
    AccountStore, Authenticator, CredentialStore, InMemoryAccountStore, InMemoryCredentialStore,
};
use crate::config::GateConfig;
use crate::gate::{gate_middleware, GateMode, GateState, RequestGate};
use crate::http::handlers;
use crate::http::storage::UploadStore;
use crate::security::clock::{Clock, SystemClock};
use crate::security::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::security::upload::UploadPolicy;
use crate::security::usage::{InMemoryUsageStore, UsageStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<RequestGate>,
    pub credentials: Arc<dyn CredentialStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub uploads: Arc<UploadStore>,
}

/// HTTP server for the API.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server with in-memory stores and the system clock.
    pub fn new(config: GateConfig) -> Self {
        let min_password_len = config.auth.min_password_len;
        Self::with_components(
            config,
            Arc::new(InMemoryCredentialStore::default()),
            Arc::new(InMemoryAccountStore::new(min_password_len, None)),
            Arc::new(InMemoryUsageStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create a server around externally owned stores and clock.
    pub fn with_components(
        config: GateConfig,
        credentials: Arc<dyn CredentialStore>,
        accounts: Arc<dyn AccountStore>,
        usage: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authenticator = Authenticator::new(credentials.clone(), &config.auth);
        let limiter = Arc::new(RateLimiter::new(
            usage,
            clock,
            RateLimitPolicy::from_config(&config.rate_limit),
        ));
        let gate = Arc::new(RequestGate::new(
            authenticator,
            limiter,
            UploadPolicy::from_config(&config.upload),
        ));

        let state = AppState {
            gate,
            credentials,
            accounts,
            uploads: Arc::new(UploadStore::new(PathBuf::from(&config.upload.storage_dir))),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, state: AppState) -> Router {
        let gate_state = GateState {
            gate: state.gate.clone(),
            credential_header: HeaderName::from_bytes(config.auth.header.as_bytes())
                .unwrap_or(axum::http::header::AUTHORIZATION),
            trust_forwarded_for: config.listener.trust_forwarded_for,
            mode: GateMode::Standard,
        };

        let gated = Router::new()
            .route("/api/me", get(handlers::me))
            .route("/api/logout", post(handlers::logout))
            .route_layer(middleware::from_fn_with_state(
                gate_state.clone(),
                gate_middleware,
            ));
        let uploads = Router::new()
            .route("/api/uploads", post(handlers::upload))
            .route_layer(middleware::from_fn_with_state(
                gate_state.with_mode(GateMode::Upload),
                gate_middleware,
            ));
        let public = Router::new()
            .route("/api/registration", post(handlers::register))
            .route("/api/login", post(handlers::login))
            .route_layer(middleware::from_fn_with_state(
                gate_state.with_mode(GateMode::Public),
                gate_middleware,
            ));

        let api = gated.merge(uploads).merge(public).with_state(state);

        Router::new()
            .route("/health", get(handlers::health))
            .merge(api)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router (without connect info).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Reloaded configurations arriving on `config_updates` are applied to
    /// the live policies; the server stops when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let gate = self.state.gate.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                gate.apply_config(&new_config);
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
