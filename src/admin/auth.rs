use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::admin::AdminState;

pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if keys_match(key.as_bytes(), state.api_key.as_bytes()) => {
            Ok(next.run(request).await)
        }
        _ => {
            tracing::warn!("Rejected admin request with bad or missing key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Comparison whose duration does not depend on where the keys differ.
fn keys_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secret", b"secreT"));
        assert!(!keys_match(b"secret", b"secret2"));
        assert!(!keys_match(b"", b"x"));
    }
}
