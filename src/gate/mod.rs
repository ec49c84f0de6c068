//! Request gate: the single composition point every API request passes.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → middleware.rs (extract credential, origin, declared upload per GateMode)
//!     → pipeline.rs (authenticate → rate limit → upload policy)
//!     → handler, with Identity in request extensions
//! ```
//!
//! # Design Decisions
//! - The pipeline is a plain function of (request facts, shared state);
//!   the middleware only translates HTTP in and out
//! - Short-circuits are explicit return values, not layered control flow

pub mod middleware;
pub mod pipeline;

pub use middleware::{gate_middleware, GateMode, GateState};
pub use pipeline::{Admission, DeclaredUpload, GateRequest, RequestGate};
