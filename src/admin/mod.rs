//! Admin API for credential and quota management.
//!
//! Served on its own bind address and guarded by a static bearer key, so it
//! never shares the public gate or its quotas.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub app: AppState,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(app: AppState, api_key: &str) -> Router {
    let state = AdminState {
        app,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/tokens", post(obtain_token))
        .route("/admin/tokens/{token}", delete(revoke_token))
        .route("/admin/subjects/{subject_id}/rotate", post(rotate_token))
        .route("/admin/subjects/{subject_id}/token", delete(revoke_subject))
        .route("/admin/accounts/{subject_id}/active", put(set_account_active))
        .route("/admin/usage", get(get_usage))
        .route("/admin/usage/subjects/{subject_id}", get(get_subject_usage))
        .route("/admin/usage/purge", post(purge_usage))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
