#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    build_router,
    cache::{CacheBackend, InMemoryCache},
    config::AppConfig,
    db::{self, DbConfig},
    entities::Role,
    AppState,
};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Helper harness for spinning up the full router backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_cache(Arc::new(InMemoryCache::new())).await
    }

    pub async fn with_cache(cache: Arc<dyn CacheBackend>) -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cache, cfg);
        let router = build_router(state.clone());

        Self { router, state }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a raw, possibly malformed, JSON body.
    pub async fn request_raw(&self, method: Method, uri: &str, body: &'static str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a request and decodes the JSON body, asserting the status first.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        expected: StatusCode,
    ) -> Value {
        let response = self.request(method.clone(), uri, body, token).await;
        let status = response.status();
        let json = response_json(response).await;
        assert_eq!(status, expected, "{} {} returned {}", method, uri, json);
        json
    }

    /// Registers a customer and returns `(token, user_id)`.
    pub async fn signup(&self, name: &str, email: &str) -> (String, i32) {
        let body = self
            .call(
                Method::POST,
                "/api/auth/signup",
                Some(json!({ "name": name, "email": email, "password": "correct-horse-battery" })),
                None,
                StatusCode::CREATED,
            )
            .await;
        let token = body["token"].as_str().expect("token in signup response").to_string();
        let user_id = body["user"]["id"].as_i64().expect("user id") as i32;
        (token, user_id)
    }

    /// Creates an admin account directly and returns a token for it.
    pub async fn admin_token(&self) -> String {
        let admin = self
            .state
            .services
            .users
            .create_user("Admin", "admin@example.com", "admin-password-123", Role::Admin)
            .await
            .expect("create admin");
        self.state.auth.issue_token(&admin).expect("admin token")
    }

    /// Creates a product through the admin API and returns its id.
    pub async fn create_product(&self, admin: &str, name: &str, price: &str, stock: i32) -> i32 {
        let body = self
            .call(
                Method::POST,
                "/api/products",
                Some(json!({ "name": name, "price": price, "stock": stock })),
                Some(admin),
                StatusCode::CREATED,
            )
            .await;
        body["id"].as_i64().expect("product id") as i32
    }

    pub async fn create_variant(
        &self,
        admin: &str,
        product_id: i32,
        sku: &str,
        price: Option<&str>,
        stock: i32,
    ) -> i32 {
        let body = self
            .call(
                Method::POST,
                &format!("/api/products/{product_id}/variants"),
                Some(json!({ "sku": sku, "name": sku, "price": price, "stock": stock })),
                Some(admin),
                StatusCode::CREATED,
            )
            .await;
        body["id"].as_i64().expect("variant id") as i32
    }

    pub async fn add_to_cart(&self, token: &str, product_id: i32, quantity: i32) -> Value {
        self.call(
            Method::POST,
            "/api/cart",
            Some(json!({ "product_id": product_id, "quantity": quantity })),
            Some(token),
            StatusCode::OK,
        )
        .await
    }

    /// Stock as the product detail endpoint reports it.
    pub async fn product_stock(&self, product_id: i32) -> i64 {
        let body = self
            .call(
                Method::GET,
                &format!("/api/products/{product_id}"),
                None,
                None,
                StatusCode::OK,
            )
            .await;
        body["stock"].as_i64().expect("stock")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
}

/// Decimal from a JSON money field, which may be encoded as a string or a number.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}
