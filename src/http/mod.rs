//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout)
//!     → gate middleware (identity, quota, upload policy)
//!     → handlers.rs (business endpoints)
//!     → storage.rs (accepted uploads only)
//! ```

pub mod handlers;
pub mod server;
pub mod storage;

pub use server::{AppState, HttpServer};
