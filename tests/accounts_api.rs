//! Registration and login through the public gate routes.

use api_gate::auth::{AccountStore, CredentialStore, SubjectId};
use api_gate::config::GateConfig;
use axum::body::Body;
use axum::http::{header, StatusCode};
use serde_json::{json, Value};

mod common;
use common::{json_body, json_request, request, token_header, TestGate};

const CLIENT: [u8; 4] = [203, 0, 113, 20];

fn sign_up(username: &str, password: &str, repeated: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{}@example.com", username),
        "password": password,
        "repeated_password": repeated,
    })
}

#[tokio::test]
async fn test_registration_issues_working_token() {
    let gate = TestGate::new(GateConfig::default());

    let res = gate
        .send(json_request(
            "/api/registration",
            CLIENT,
            sign_up("ada", "analytical", "analytical"),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = json_body(res).await;
    assert_eq!(body["username"], "ada");
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["user_id"], 1);
    let token = body["token"].as_str().unwrap();
    assert_eq!(token.len(), 40);
    assert_eq!(
        gate.credentials.token_for(SubjectId(1)).unwrap().unwrap().as_str(),
        token
    );

    let res = gate
        .send(
            request("GET", "/api/me", CLIENT)
                .header(header::AUTHORIZATION, token_header(token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let me = json_body(res).await;
    assert_eq!(me["kind"], "authenticated");
    assert_eq!(me["subject_id"], 1);
}

#[tokio::test]
async fn test_registration_rejections() {
    let gate = TestGate::new(GateConfig::default());
    gate.send(json_request(
        "/api/registration",
        CLIENT,
        sign_up("ada", "analytical", "analytical"),
    ))
    .await;

    let cases = [
        (sign_up("bob", "analytical", "difference"), "passwords don't match"),
        (sign_up("bob", "short", "short"), "password must be at least 8 characters"),
        (sign_up("ada", "analytical", "analytical"), "email already in use"),
        (json!({ "email": "x@example.com" }), "username is required"),
    ];
    for (payload, detail) in cases {
        let res = gate
            .send(json_request("/api/registration", CLIENT, payload))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["detail"], detail);
    }

    let res = gate
        .send(
            request("POST", "/api/registration", CLIENT)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gate.accounts.len().unwrap(), 1);
}

#[tokio::test]
async fn test_login_returns_existing_token() {
    let gate = TestGate::new(GateConfig::default());
    let res = gate
        .send(json_request(
            "/api/registration",
            CLIENT,
            sign_up("ada", "analytical", "analytical"),
        ))
        .await;
    let registered = json_body(res).await["token"].as_str().unwrap().to_string();

    let res = gate
        .send(json_request(
            "/api/login",
            CLIENT,
            json!({ "username": "ada", "password": "analytical" }),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["token"], registered.as_str());
    assert_eq!(body["user_id"], 1);

    // After logout the next login issues a fresh token.
    gate.credentials.revoke_subject(SubjectId(1)).unwrap();
    let res = gate
        .send(json_request(
            "/api/login",
            CLIENT,
            json!({ "username": "ada", "password": "analytical" }),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_ne!(json_body(res).await["token"], registered.as_str());
}

#[tokio::test]
async fn test_login_rejections() {
    let gate = TestGate::new(GateConfig::default());
    gate.send(json_request(
        "/api/registration",
        CLIENT,
        sign_up("ada", "analytical", "analytical"),
    ))
    .await;

    for payload in [
        json!({ "username": "ada", "password": "wrong-password" }),
        json!({ "username": "nobody", "password": "analytical" }),
        json!({ "username": "ada" }),
    ] {
        let res = gate.send(json_request("/api/login", CLIENT, payload)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(res).await["detail"],
            "unable to log in with provided credentials"
        );
    }

    gate.accounts.set_active(SubjectId(1), false).unwrap();
    let res = gate
        .send(json_request(
            "/api/login",
            CLIENT,
            json!({ "username": "ada", "password": "analytical" }),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await["detail"], "User account is disabled.");
}

#[tokio::test]
async fn test_login_ignores_credential_header_but_counts_as_anonymous() {
    let mut config = GateConfig::default();
    config.rate_limit.anonymous_limit = 2;
    let gate = TestGate::new(config);

    let login = || {
        request("POST", "/api/login", CLIENT)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Token not-a-real-token")
            .body(Body::from(
                json!({ "username": "ghost", "password": "whatever1" }).to_string(),
            ))
            .unwrap()
    };

    // A stale header does not turn into 401 here.
    let res = gate.send(login()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["x-ratelimit-remaining"], "1");
    assert_eq!(gate.send(login()).await.status(), StatusCode::BAD_REQUEST);

    let res = gate.send(login()).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key(header::RETRY_AFTER));
}
