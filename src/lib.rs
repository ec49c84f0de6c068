//! Request gating layer for an authenticated, rate-limited upload API.

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GateConfig;
pub use error::{GateRejection, StoreError};
pub use gate::RequestGate;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
