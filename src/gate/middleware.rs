//! Axum adapter for the gate pipeline.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GateRejection;
use crate::gate::pipeline::{GateRequest, RequestGate};
use crate::observability::metrics;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Which gate stages a route group runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Authenticate, then rate limit.
    Standard,
    /// Also run the upload policy on a declared file.
    Upload,
    /// Skip credentials; callers are limited as anonymous.
    Public,
}

/// State for the gate middleware.
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<RequestGate>,
    pub credential_header: HeaderName,
    pub trust_forwarded_for: bool,
    pub mode: GateMode,
}

impl GateState {
    /// The same gate running in another mode.
    pub fn with_mode(&self, mode: GateMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

/// Run every request through the gate before it reaches a handler.
///
/// On admission the resolved [`Identity`](crate::auth::Identity) is inserted
/// into the request extensions.
pub async fn gate_middleware(
    State(state): State<GateState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let origin = client_origin(&request, state.trust_forwarded_for);
    let headers = request.headers();

    // A header that is present but not visible ASCII still counts as a
    // credential, and an invalid one.
    let credential = match state.mode {
        GateMode::Public => None,
        GateMode::Standard | GateMode::Upload => headers
            .get(&state.credential_header)
            .map(|v| v.to_str().unwrap_or("")),
    };
    let filename = match state.mode {
        GateMode::Upload if carries_body(headers) => declared_filename(headers),
        _ => None,
    };

    let gate_request = GateRequest {
        credential,
        origin,
        upload: None,
    };
    let gate_request = match filename.as_deref() {
        Some(name) => gate_request.with_upload(name, declared_length(headers)),
        None => gate_request,
    };

    match state.gate.evaluate(&gate_request) {
        Ok(admission) => {
            metrics::record_gate_outcome("admitted", start);
            tracing::debug!(
                client = %admission.identity,
                path = %request.uri().path(),
                "Request admitted"
            );

            request.extensions_mut().insert(admission.identity);
            let mut response = next.run(request).await;

            if let Some(quota) = admission.quota {
                let headers = response.headers_mut();
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
            }
            response
        }
        Err(rejection) => {
            metrics::record_gate_outcome(rejection.outcome(), start);
            if let GateRejection::UnprocessableUpload { reasons } = &rejection {
                for reason in reasons {
                    metrics::record_upload_rejection(reason.as_str());
                }
            }
            tracing::info!(
                origin = %origin,
                path = %request.uri().path(),
                outcome = rejection.outcome(),
                "Request rejected by gate"
            );
            rejection.into_response()
        }
    }
}

/// Network origin used to bucket anonymous callers.
pub fn client_origin(request: &Request<Body>, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or_else(|| {
            tracing::debug!("No peer address on request; using unspecified origin");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        })
}

/// `filename` parameter of a `Content-Disposition` header, if any.
pub fn declared_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
    value.split(';').skip(1).find_map(|param| {
        let (key, raw) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Whether the request framing announces a body.
pub fn carries_body(headers: &HeaderMap) -> bool {
    headers.contains_key(header::TRANSFER_ENCODING)
        || declared_length(headers).is_some_and(|len| len > 0)
}

/// Declared body length.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.insert(k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_declared_filename() {
        let h = headers(&[("content-disposition", "attachment; filename=\"photo.JPG\"")]);
        assert_eq!(declared_filename(&h).as_deref(), Some("photo.JPG"));

        let h = headers(&[("content-disposition", "inline; FileName=cv.pdf; size=10")]);
        assert_eq!(declared_filename(&h).as_deref(), Some("cv.pdf"));

        let h = headers(&[("content-disposition", "attachment")]);
        assert_eq!(declared_filename(&h), None);

        let h = headers(&[("content-disposition", "attachment; filename=\"\"")]);
        assert_eq!(declared_filename(&h), None);

        assert_eq!(declared_filename(&HeaderMap::new()), None);
    }

    #[test]
    fn test_declared_length() {
        assert_eq!(declared_length(&headers(&[("content-length", "2048")])), Some(2048));
        assert_eq!(declared_length(&headers(&[("content-length", "lots")])), None);
        assert_eq!(declared_length(&HeaderMap::new()), None);
    }

    #[test]
    fn test_carries_body() {
        assert!(carries_body(&headers(&[("content-length", "12")])));
        assert!(carries_body(&headers(&[("transfer-encoding", "chunked")])));
        assert!(!carries_body(&headers(&[("content-length", "0")])));
        assert!(!carries_body(&headers(&[(
            "content-disposition",
            "attachment; filename=\"report.exe\""
        )])));
    }

    #[test]
    fn test_client_origin() {
        let peer: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let mut request = Request::builder()
            .header(X_FORWARDED_FOR, "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        assert_eq!(client_origin(&request, false), peer.ip());
        assert_eq!(
            client_origin(&request, true),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_origin(&bare, true), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
