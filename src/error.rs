//! Error taxonomy for the gating layer.
//!
//! # Design Decisions
//! - Client-correctable outcomes (`Unauthorized`, `TooManyRequests`,
//!   `UnprocessableUpload`) are terminal for the request and never retried here
//! - Failures of the backing stores are a separate 503 outcome
//! - Every rejection converts straight into an HTTP response

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::security::upload::UploadViolation;

/// Failure of a backing store (credential store or usage table).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential not found")]
    NotFound,

    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn poisoned(what: &str) -> Self {
        StoreError::Unavailable(format!("{} lock poisoned", what))
    }
}

/// Why a request was stopped by the gate.
#[derive(Debug, Error)]
pub enum GateRejection {
    #[error("invalid or unknown credential")]
    Unauthorized,

    #[error("request quota exceeded, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    #[error("upload rejected: {reasons:?}")]
    UnprocessableUpload { reasons: Vec<UploadViolation> },

    #[error(transparent)]
    Unavailable(#[from] StoreError),
}

impl GateRejection {
    /// Short label used for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            GateRejection::Unauthorized => "unauthorized",
            GateRejection::TooManyRequests { .. } => "too_many_requests",
            GateRejection::UnprocessableUpload { .. } => "unprocessable_upload",
            GateRejection::Unavailable(_) => "unavailable",
        }
    }
}

/// Whole seconds a client should wait, rounded up and never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            GateRejection::Unauthorized => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Invalid token." })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
                response
            }
            GateRejection::TooManyRequests { retry_after } => {
                let secs = retry_after_secs(retry_after);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "detail": "Request was throttled.",
                        "retry_after": secs,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            GateRejection::UnprocessableUpload { reasons } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": "Upload rejected.", "reasons": reasons })),
            )
                .into_response(),
            GateRejection::Unavailable(e) => {
                tracing::error!(error = %e, "Gate backing store failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "detail": "Service temporarily unavailable." })),
                )
                    .into_response()
            }
        }
    }
}
