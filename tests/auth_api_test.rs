//! Signup, login, profile and role enforcement through the HTTP router.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn signup_returns_user_and_token() {
    let app = TestApp::new().await;

    let body = app
        .call(
            Method::POST,
            "/api/auth/signup",
            Some(json!({ "name": "Ada", "email": "Ada@Example.com", "password": "analytical-engine" })),
            None,
            StatusCode::CREATED,
        )
        .await;

    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["role"], "customer");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["expires_in"], 3600);
}

#[tokio::test]
async fn duplicate_signup_is_rejected() {
    let app = TestApp::new().await;
    app.signup("Ada", "ada@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/signup",
            Some(json!({ "name": "Other", "email": "ADA@example.com", "password": "another-password" })),
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("User already exists"));
}

#[tokio::test]
async fn signup_validates_fields() {
    let app = TestApp::new().await;

    for payload in [
        json!({ "name": "Ada", "email": "not-an-email", "password": "long-enough-pw" }),
        json!({ "name": "Ada", "email": "ada@example.com", "password": "short" }),
        json!({ "name": "", "email": "ada@example.com", "password": "long-enough-pw" }),
        json!({ "name": "   ", "email": "ada@example.com", "password": "long-enough-pw" }),
    ] {
        let response = app
            .request(Method::POST, "/api/auth/signup", Some(payload), None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn unparseable_bodies_get_a_json_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/auth/signup", Some(json!({ "name": "Ada" })), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid fields"), "{message}");
    assert!(message.contains("email"), "{message}");
    assert!(body["timestamp"].is_string());

    let response = app
        .request_raw(Method::POST, "/api/auth/login", "{\"email\": ")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");

    let response = app
        .request(
            Method::POST,
            "/api/auth/signup",
            Some(json!({ "name": 7, "email": "ada@example.com", "password": "long-enough-pw" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_valid_and_invalid_credentials() {
    let app = TestApp::new().await;
    app.signup("Ada", "ada@example.com").await;

    let body = app
        .call(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "ada@example.com", "password": "correct-horse-battery" })),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["name"], "Ada");

    let wrong_password = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
            None,
        )
        .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);

    let unknown_email = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "nobody@example.com", "password": "correct-horse-battery" })),
            None,
        )
        .await;
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_a_valid_token() {
    let app = TestApp::new().await;
    let (token, user_id) = app.signup("Ada", "ada@example.com").await;

    let body = app
        .call(Method::GET, "/api/auth/me", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(body["id"], user_id);
    assert!(body.get("password_hash").is_none());

    let missing = app.request(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(missing).await;
    assert_eq!(body["error"]["code"], "AUTH_MISSING_TOKEN");

    let garbage = app
        .request(Method::GET, "/api/auth/me", None, Some("not.a.jwt"))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_cannot_use_admin_routes() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/categories",
            Some(json!({ "name": "Lighting" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Lamp", "price": "10.00", "stock": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let admin = app.admin_token().await;
    let response = app
        .request(
            Method::POST,
            "/api/categories",
            Some(json!({ "name": "Lighting" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn responses_echo_request_id() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/categories", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
}
