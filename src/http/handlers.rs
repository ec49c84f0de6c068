//! API handlers behind the gate.
//!
//! Every handler here runs only after the gate admitted the request, so the
//! resolved [`Identity`] is always present in the request extensions.
//! Registration and login sit behind the gate in public mode: they are
//! rate limited, but their identity is always anonymous.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::auth::{Account, AccountError, AccountStore, Identity, Registration, SubjectId};
use crate::error::{GateRejection, StoreError};
use crate::gate::middleware::declared_filename;
use crate::http::server::AppState;
use crate::http::storage::StoredUpload;
use crate::observability::metrics;
use crate::security::upload::UploadViolation;

/// Errors raised inside handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Rejected(#[from] GateRejection),

    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Rejected(GateRejection::Unavailable(e))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(_: JsonRejection) -> Self {
        ApiError::BadRequest("Request body must be a JSON object.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::Rejected(rejection) => rejection.into_response(),
            ApiError::Body(e) => {
                tracing::warn!(error = %e, "Upload body read failed");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "detail": "Could not read request body." })),
                )
                    .into_response()
            }
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Upload storage failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Could not store upload." })),
                )
                    .into_response()
            }
            ApiError::Account(AccountError::Inactive) => (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "User account is disabled." })),
            )
                .into_response(),
            ApiError::Account(AccountError::Store(e)) => {
                GateRejection::Unavailable(e).into_response()
            }
            ApiError::Account(AccountError::Hashing(e)) => {
                tracing::error!(error = %e, "Password hashing failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Could not process credentials." })),
                )
                    .into_response()
            }
            ApiError::Account(e) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": e.to_string() }))).into_response()
            }
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Returned by registration and login.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub token: String,
    pub username: String,
    pub email: String,
    pub user_id: SubjectId,
}

/// Run a password operation off the async workers.
async fn with_accounts<T, F>(accounts: Arc<dyn AccountStore>, op: F) -> Result<T, AccountError>
where
    T: Send + 'static,
    F: FnOnce(&dyn AccountStore) -> Result<T, AccountError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(accounts.as_ref()))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
}

fn account_response(state: &AppState, account: Account) -> Result<AccountResponse, ApiError> {
    let token = state.credentials.get_or_issue(account.subject_id)?;
    Ok(AccountResponse {
        token: token.as_str().to_string(),
        username: account.username,
        email: account.email,
        user_id: account.subject_id,
    })
}

/// Create an account and hand back its token.
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let Json(registration) = body?;
    let account = with_accounts(state.accounts.clone(), move |accounts| {
        accounts.register(&registration)
    })
    .await?;
    metrics::record_account_event("registered");

    Ok((StatusCode::CREATED, Json(account_response(&state, account)?)))
}

/// Exchange a username and password for the account's token.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AccountResponse>, ApiError> {
    let Json(login) = body?;
    let result = with_accounts(state.accounts.clone(), move |accounts| {
        accounts.verify(&login.username, &login.password)
    })
    .await;

    let account = match result {
        Ok(account) => account,
        Err(e) => {
            metrics::record_account_event("login_failed");
            tracing::info!(error = %e, "Login refused");
            return Err(e.into());
        }
    };
    metrics::record_account_event("login");
    tracing::info!(subject = %account.subject_id, "Login succeeded");

    Ok(Json(account_response(&state, account)?))
}

/// The identity the gate resolved for this request.
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

/// Invalidate the caller's token.
pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let subject = identity
        .subject_id()
        .ok_or(GateRejection::Unauthorized)?;

    match state.credentials.revoke_subject(subject) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        // Revoked by someone else between the gate and here.
        Err(StoreError::NotFound) => Err(GateRejection::Unauthorized.into()),
        Err(e) => Err(GateRejection::Unavailable(e).into()),
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub stored: StoredUpload,
    pub uploaded_by: Identity,
}

/// Accept a raw file body named by `Content-Disposition`.
///
/// The gate already checked the declared name and length. The body is read
/// into memory with the size limit enforced chunk by chunk, checked again
/// against what actually arrived, and only then written to storage.
pub async fn upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let filename =
        declared_filename(&headers).ok_or(ApiError::BadRequest("Missing upload filename."))?;
    let policy = state.gate.upload_policy();

    let mut bytes = Vec::new();
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let size = (bytes.len() + chunk.len()) as u64;
        if size > policy.max_bytes {
            metrics::record_upload_rejection("too_large");
            return Err(GateRejection::UnprocessableUpload {
                reasons: vec![UploadViolation::TooLarge {
                    size,
                    max_bytes: policy.max_bytes,
                }],
            }
            .into());
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Err(reasons) = policy.validate(&filename, bytes.len() as u64) {
        for reason in &reasons {
            metrics::record_upload_rejection(reason.as_str());
        }
        return Err(GateRejection::UnprocessableUpload { reasons }.into());
    }

    let stored = state.uploads.save(&filename, &bytes).await?;
    tracing::info!(client = %identity, file = %stored.file, "Upload accepted");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            stored,
            uploaded_by: identity,
        }),
    ))
}
