//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (quotas > 0, timeouts > 0, addresses parse)
//! - Reject policies that could never admit anything
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::GateConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("auth.header: '{0}' is not a valid header name")]
    InvalidHeader(String),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("upload.allowed_extensions: '{0}' is not a plain extension")]
    BadExtension(String),

    #[error("admin.api_key is still the placeholder value")]
    PlaceholderAdminKey,
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if HeaderName::from_bytes(config.auth.header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader(config.auth.header.clone()));
    }
    if config.auth.schemes.iter().all(|s| s.trim().is_empty()) {
        errors.push(ValidationError::Empty { field: "auth.schemes" });
    }
    if config.auth.min_password_len == 0 {
        errors.push(ValidationError::Zero { field: "auth.min_password_len" });
    }

    let rl = &config.rate_limit;
    if rl.anonymous_limit == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.anonymous_limit" });
    }
    if rl.authenticated_limit == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.authenticated_limit" });
    }
    if rl.window_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.window_secs" });
    }

    if config.upload.max_bytes == 0 {
        errors.push(ValidationError::Zero { field: "upload.max_bytes" });
    }
    if config.upload.allowed_extensions.is_empty() {
        errors.push(ValidationError::Empty { field: "upload.allowed_extensions" });
    }
    for ext in &config.upload.allowed_extensions {
        let bare = ext.trim_start_matches('.');
        if bare.is_empty() || !bare.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push(ValidationError::BadExtension(ext.clone()));
        }
    }
    if config.upload.storage_dir.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "upload.storage_dir" });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }

    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::Empty { field: "admin.api_key" });
        } else if config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            errors.push(ValidationError::PlaceholderAdminKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GateConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.rate_limit.anonymous_limit = 0;
        config.rate_limit.window_secs = 0;
        config.upload.allowed_extensions = vec!["tar.gz".into()];
        config.auth.min_password_len = 0;
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::Zero { field: "auth.min_password_len" }));
        assert!(errors.contains(&ValidationError::PlaceholderAdminKey));
        assert!(errors.contains(&ValidationError::BadExtension("tar.gz".into())));
    }
}
