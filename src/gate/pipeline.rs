//! The ordered gate pipeline.
//!
//! ```text
//! authenticate ──✗──▶ Unauthorized
//!      │
//! rate limit ───✗──▶ TooManyRequests { retry_after }
//!      │
//! upload policy ─✗──▶ UnprocessableUpload { reasons }   (only if a file is declared)
//!      │
//!   Admission { identity } ──▶ handler
//! ```
//!
//! Each step returns early, so a throttled request is counted once and never
//! reaches the upload check.

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::auth::{Authenticator, Identity};
use crate::config::GateConfig;
use crate::error::GateRejection;
use crate::security::rate_limit::{Decision, QuotaStatus, RateLimitPolicy, RateLimiter};
use crate::security::upload::UploadPolicy;

/// A file the request says it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredUpload<'a> {
    pub filename: &'a str,
    /// Declared length; `None` when the body is streamed without one.
    pub size: Option<u64>,
}

/// What the gate looks at. Nothing here is read from the body.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub credential: Option<&'a str>,
    pub origin: IpAddr,
    pub upload: Option<DeclaredUpload<'a>>,
}

impl<'a> GateRequest<'a> {
    pub fn new(origin: IpAddr) -> Self {
        Self {
            credential: None,
            origin,
            upload: None,
        }
    }

    pub fn with_credential(mut self, credential: &'a str) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_upload(mut self, filename: &'a str, size: Option<u64>) -> Self {
        self.upload = Some(DeclaredUpload { filename, size });
        self
    }
}

/// A request that passed every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub identity: Identity,
    pub quota: Option<QuotaStatus>,
}

pub struct RequestGate {
    authenticator: Authenticator,
    limiter: Arc<RateLimiter>,
    uploads: ArcSwap<UploadPolicy>,
}

impl RequestGate {
    pub fn new(authenticator: Authenticator, limiter: Arc<RateLimiter>, uploads: UploadPolicy) -> Self {
        Self {
            authenticator,
            limiter,
            uploads: ArcSwap::from_pointee(uploads),
        }
    }

    pub fn evaluate(&self, request: &GateRequest<'_>) -> Result<Admission, GateRejection> {
        let identity = self
            .authenticator
            .authenticate(request.credential, request.origin)?;

        let quota = match self.limiter.check_and_record(&identity)? {
            Decision::Admit(quota) => quota,
            Decision::Reject { retry_after } => {
                return Err(GateRejection::TooManyRequests { retry_after });
            }
        };

        if let Some(upload) = request.upload {
            let policy = self.uploads.load();
            let checked = match upload.size {
                Some(size) => policy.validate(upload.filename, size),
                None => policy.validate_extension(upload.filename),
            };
            checked.map_err(|reasons| GateRejection::UnprocessableUpload { reasons })?;
        }

        Ok(Admission { identity, quota })
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn upload_policy(&self) -> Arc<UploadPolicy> {
        self.uploads.load_full()
    }

    /// Adopt the policies of a reloaded configuration.
    pub fn apply_config(&self, config: &GateConfig) {
        self.limiter
            .update_policy(RateLimitPolicy::from_config(&config.rate_limit));
        let uploads = UploadPolicy::from_config(&config.upload);
        tracing::info!(
            max_bytes = uploads.max_bytes,
            extensions = ?uploads.allowed_extensions,
            "Upload policy updated"
        );
        self.uploads.store(Arc::new(uploads));
    }
}
