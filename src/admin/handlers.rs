use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::admin::AdminState;
use crate::auth::{Identity, SubjectId};
use crate::error::StoreError;
use crate::observability::metrics;
use crate::security::usage::UsageWindow;

/// Store failures as seen by admin clients.
pub struct AdminError(StoreError);

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self.0 {
            StoreError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
            }
            e => {
                tracing::error!(error = %e, "Admin store operation failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "detail": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub credentials: usize,
    pub accounts: usize,
    pub usage_windows: usize,
    pub rate_limit: RateLimitSummary,
    pub upload: UploadSummary,
}

#[derive(Serialize)]
pub struct RateLimitSummary {
    pub enabled: bool,
    pub anonymous_limit: u64,
    pub authenticated_limit: u64,
    pub window_secs: u64,
}

#[derive(Serialize)]
pub struct UploadSummary {
    pub max_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub subject_id: SubjectId,
}

#[derive(Deserialize)]
pub struct ActivityRequest {
    pub active: bool,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub subject_id: SubjectId,
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<SystemStatus>, AdminError> {
    let limiter = state.app.gate.limiter();
    let policy = limiter.policy();
    let upload = state.app.gate.upload_policy();
    let usage_windows = limiter.tracked_windows();
    metrics::record_usage_windows(usage_windows);

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        credentials: state.app.credentials.len()?,
        accounts: state.app.accounts.len()?,
        usage_windows,
        rate_limit: RateLimitSummary {
            enabled: policy.enabled,
            anonymous_limit: policy.anonymous.limit,
            authenticated_limit: policy.authenticated.limit,
            window_secs: policy.anonymous.window.as_secs(),
        },
        upload: UploadSummary {
            max_bytes: upload.max_bytes,
            allowed_extensions: upload.allowed_extensions.iter().cloned().collect(),
        },
    }))
}

/// Login-style issuance: returns the subject's live token or creates one.
pub async fn obtain_token(
    State(state): State<AdminState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AdminError> {
    let token = state.app.credentials.get_or_issue(req.subject_id)?;
    Ok(Json(TokenResponse {
        token: token.as_str().to_string(),
        subject_id: req.subject_id,
    }))
}

pub async fn rotate_token(
    State(state): State<AdminState>,
    Path(subject_id): Path<SubjectId>,
) -> Result<(StatusCode, Json<TokenResponse>), AdminError> {
    let token = state.app.credentials.rotate(subject_id)?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token: token.as_str().to_string(),
            subject_id,
        }),
    ))
}

pub async fn revoke_token(
    State(state): State<AdminState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AdminError> {
    state.app.credentials.revoke(&token)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke_subject(
    State(state): State<AdminState>,
    Path(subject_id): Path<SubjectId>,
) -> Result<StatusCode, AdminError> {
    state.app.credentials.revoke_subject(subject_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable or disable an account. Disabling also revokes its live token.
pub async fn set_account_active(
    State(state): State<AdminState>,
    Path(subject_id): Path<SubjectId>,
    Json(req): Json<ActivityRequest>,
) -> Result<StatusCode, AdminError> {
    state.app.accounts.set_active(subject_id, req.active)?;
    if !req.active {
        match state.app.credentials.revoke_subject(subject_id) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_usage(State(state): State<AdminState>) -> Json<serde_json::Value> {
    Json(json!({ "tracked_windows": state.app.gate.limiter().tracked_windows() }))
}

pub async fn get_subject_usage(
    State(state): State<AdminState>,
    Path(subject_id): Path<SubjectId>,
) -> Result<Json<UsageWindow>, AdminError> {
    let window = state
        .app
        .gate
        .limiter()
        .usage(&Identity::authenticated(subject_id))?
        .ok_or(StoreError::NotFound)?;
    Ok(Json(window))
}

pub async fn purge_usage(State(state): State<AdminState>) -> Result<Json<serde_json::Value>, AdminError> {
    let removed = state.app.gate.limiter().purge_expired()?;
    Ok(Json(json!({ "removed": removed })))
}
