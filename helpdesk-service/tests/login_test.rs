mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{TestApp, TEST_PASSWORD};
use helpdesk_service::{models::UserType, services::bootstrap::ADMIN_ROLE_ID};
use serde_json::{json, Value};

fn login_body(email: &str, password: &str) -> Value {
    json!({ "email": email, "password": password, "device_id": "laptop" })
}

#[tokio::test]
async fn test_login_returns_tokens_and_permissions() {
    let app = TestApp::spawn().await;
    let user = app.create_user("ada@example.com", UserType::Admin, ADMIN_ROLE_ID).await;

    let (status, body) = app
        .request(Method::POST, "/login", None, Some(login_body("ada@example.com", TEST_PASSWORD)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["user_id"], user.user_id.to_string());
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["roles"][0]["role_name"], "admin");
    assert!(body["tokens"].get("refresh_token_expiration").is_none());

    let object_actions = body["permissions"]["object_actions"].as_array().unwrap();
    assert_eq!(object_actions.len(), 15 * 5);
    assert_eq!(
        body["permissions"]["system_actions"],
        json!(["DASHBOARD", "REPORTS", "SETTINGS"])
    );

    let access = body["tokens"]["access_token"].as_str().unwrap();
    let principal = tokio_test::assert_ok!(app.state.tokens.verify_token(access));
    assert_eq!(principal.user_id, user.user_id);

    let (status, _) = app.request(Method::GET, "/policies", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = TestApp::spawn().await;
    app.create_user("ada@example.com", UserType::Admin, ADMIN_ROLE_ID).await;

    let (status, wrong_password) = app
        .request(Method::POST, "/login", None, Some(login_body("ada@example.com", "wrong")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_user) = app
        .request(Method::POST, "/login", None, Some(login_body("bob@example.com", TEST_PASSWORD)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password["error"], unknown_user["error"]);
}

#[tokio::test]
async fn test_login_validation() {
    let app = TestApp::spawn().await;
    let (status, body) = app
        .request(Method::POST, "/login", None, Some(login_body("not-an-email", "x")))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["data"]["email"].is_array());
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = TestApp::spawn().await;
    let user = app.create_user("ada@example.com", UserType::Admin, ADMIN_ROLE_ID).await;
    let (_, login) = app
        .request(Method::POST, "/login", None, Some(login_body("ada@example.com", TEST_PASSWORD)))
        .await;
    let first = login["tokens"]["refresh_token"].as_str().unwrap().to_string();

    let refresh = |token: String| {
        json!({ "user_id": user.user_id, "device_id": "laptop", "refresh_token": token })
    };

    let (status, rotated) = app
        .request(Method::POST, "/refresh", None, Some(refresh(first.clone())))
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(second, first);

    let (status, body) = app
        .request(Method::POST, "/refresh", None, Some(refresh(first)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = app
        .request(Method::POST, "/refresh", None, Some(refresh(second)))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_is_rate_limited_per_ip() {
    let app = TestApp::spawn().await;
    let attempt = |ip: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(login_body("nobody@example.com", "wrong").to_string()))
            .unwrap()
    };

    for _ in 0..5 {
        let (status, _) = app.send(attempt("203.0.113.7")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = app.send(attempt("203.0.113.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");

    let (status, _) = app.send(attempt("198.51.100.1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
