//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the API gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, origin resolution).
    pub listener: ListenerConfig,

    /// Credential parsing and storage.
    pub auth: AuthConfig,

    /// Per-identity request quotas.
    pub rate_limit: RateLimitConfig,

    /// Upload size and type policy.
    pub upload: UploadConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Take the caller origin from the first `X-Forwarded-For` entry.
    /// Only enable behind a reverse proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            trust_forwarded_for: false,
        }
    }
}

/// Credential settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the credential.
    pub header: String,

    /// Accepted schemes in `<scheme> <token>` (case-insensitive).
    pub schemes: Vec<String>,

    /// JSON file the credential store is loaded from and saved to.
    pub persistence_path: Option<String>,

    /// JSON file the account store is loaded from and saved to.
    pub accounts_path: Option<String>,

    /// Shortest password accepted at registration.
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: "Authorization".to_string(),
            schemes: vec!["Token".to_string(), "Bearer".to_string()],
            persistence_path: None,
            accounts_path: None,
            min_password_len: 8,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests per window for anonymous callers (per origin).
    pub anonymous_limit: u64,

    /// Requests per window for authenticated callers (per subject).
    pub authenticated_limit: u64,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Sweep expired windows once the table grows past this size.
    pub max_tracked_windows: usize,

    /// Minimum seconds between two such sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anonymous_limit: 100,
            authenticated_limit: 1000,
            window_secs: 3600,
            max_tracked_windows: 100_000,
            sweep_interval_secs: 30,
        }
    }
}

/// Upload policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes.
    pub max_bytes: u64,

    /// Allowed file extensions (case-insensitive).
    pub allowed_extensions: Vec<String>,

    /// Directory accepted uploads are written to.
    pub storage_dir: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            allowed_extensions: ["jpg", "jpeg", "png", "pdf", "doc", "docx"]
                .into_iter()
                .map(String::from)
                .collect(),
            storage_dir: "media/uploads".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
