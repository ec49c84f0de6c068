//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use api_gate::auth::{InMemoryAccountStore, InMemoryCredentialStore};
use api_gate::config::GateConfig;
use api_gate::http::HttpServer;
use api_gate::security::{InMemoryUsageStore, ManualClock};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub const MB: usize = 1024 * 1024;

/// A server wired to a manual clock and a private upload directory.
pub struct TestGate {
    pub server: HttpServer,
    pub router: Router,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub accounts: Arc<InMemoryAccountStore>,
    pub clock: Arc<ManualClock>,
    pub upload_dir: PathBuf,
}

impl TestGate {
    pub fn new(mut config: GateConfig) -> Self {
        let upload_dir = std::env::temp_dir().join(format!("gate-test-{}", uuid::Uuid::new_v4()));
        config.upload.storage_dir = upload_dir.to_string_lossy().into_owned();

        let credentials = Arc::new(InMemoryCredentialStore::default());
        let accounts = Arc::new(InMemoryAccountStore::new(config.auth.min_password_len, None));
        let clock = Arc::new(ManualClock::new(Duration::from_secs(1_700_000_000)));
        let server = HttpServer::with_components(
            config,
            credentials.clone(),
            accounts.clone(),
            Arc::new(InMemoryUsageStore::new()),
            clock.clone(),
        );
        let router = server.router();

        Self {
            server,
            router,
            credentials,
            accounts,
            clock,
            upload_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(&self.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestGate {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.upload_dir);
    }
}

/// Request builder that carries a peer address the way the real listener does.
pub fn request(method: &str, uri: &str, peer: [u8; 4]) -> axum::http::request::Builder {
    let addr = SocketAddr::new(IpAddr::from(peer), 40_000);
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
}

/// JSON `POST` from `peer`.
pub fn json_request(uri: &str, peer: [u8; 4], body: Value) -> Request<Body> {
    request("POST", uri, peer)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn token_header(token: &str) -> String {
    format!("Token {}", token)
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
