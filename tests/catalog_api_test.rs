//! Categories, products, variants and reviews.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

// ==================== Categories ====================

#[tokio::test]
async fn category_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let lighting = app
        .call(
            Method::POST,
            "/api/categories",
            Some(json!({ "name": "Lighting", "description": "Lamps and bulbs" })),
            Some(&admin),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(lighting["slug"], "lighting");

    app.call(
        Method::POST,
        "/api/categories",
        Some(json!({ "name": "Audio" })),
        Some(&admin),
        StatusCode::CREATED,
    )
    .await;

    // Same slug as an existing category
    app.call(
        Method::POST,
        "/api/categories",
        Some(json!({ "name": "LIGHTING!" })),
        Some(&admin),
        StatusCode::BAD_REQUEST,
    )
    .await;

    let list = app
        .call(Method::GET, "/api/categories", None, None, StatusCode::OK)
        .await;
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Audio", "Lighting"]);

    let id = lighting["id"].as_i64().unwrap();
    let response = app
        .request(Method::DELETE, &format!("/api/categories/{id}"), None, Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The cached list was invalidated by the delete
    let list = app
        .call(Method::GET, "/api/categories", None, None, StatusCode::OK)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let response = app
        .request(Method::DELETE, &format!("/api/categories/{id}"), None, Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Products ====================

#[tokio::test]
async fn create_product_validates_input() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    for payload in [
        json!({ "name": "", "price": "10.00", "stock": 1 }),
        json!({ "name": "Lamp", "price": "-1.00", "stock": 1 }),
        json!({ "name": "Lamp", "price": "10.00", "stock": -1 }),
    ] {
        let response = app
            .request(Method::POST, "/api/products", Some(payload), Some(&admin))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .request(
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Lamp", "price": "10.00", "stock": 1, "category_id": 999 })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_products_filters_and_paginates() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let category = app
        .call(
            Method::POST,
            "/api/categories",
            Some(json!({ "name": "Lighting" })),
            Some(&admin),
            StatusCode::CREATED,
        )
        .await;
    let category_id = category["id"].as_i64().unwrap();

    app.call(
        Method::POST,
        "/api/products",
        Some(json!({ "name": "Desk Lamp", "price": "25.50", "stock": 5, "category_id": category_id })),
        Some(&admin),
        StatusCode::CREATED,
    )
    .await;
    app.create_product(&admin, "Floor LAMP", "80.00", 2).await;
    app.create_product(&admin, "Coffee Mug", "8.00", 40).await;

    let body = app
        .call(Method::GET, "/api/products?search=lamp", None, None, StatusCode::OK)
        .await;
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let body = app
        .call(
            Method::GET,
            &format!("/api/products?category_id={category_id}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Desk Lamp");

    let body = app
        .call(Method::GET, "/api/products?per_page=2&page=2", None, None, StatusCode::OK)
        .await;
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["total_pages"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // per_page is clamped to the configured maximum
    let body = app
        .call(Method::GET, "/api/products?per_page=5000", None, None, StatusCode::OK)
        .await;
    assert_eq!(body["pagination"]["per_page"], 100);

    // Pages past the end are empty, however far past
    let body = app
        .call(
            Method::GET,
            "/api/products?page=18446744073709551615",
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
    assert_eq!(body["pagination"]["total"], 3);

    let response = app
        .request(Method::GET, "/api/products?page=abc", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn product_detail_includes_variants_and_is_invalidated_on_update() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let product_id = app.create_product(&admin, "T-Shirt", "20.00", 0).await;
    app.create_variant(&admin, product_id, "TS-M", None, 5).await;
    app.create_variant(&admin, product_id, "TS-XL", Some("22.00"), 3).await;

    let body = app
        .call(
            Method::GET,
            &format!("/api/products/{product_id}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["name"], "T-Shirt");
    assert_eq!(body["slug"], "t-shirt");
    assert_eq!(body["variants"].as_array().unwrap().len(), 2);
    assert!(body["variants"][0]["price"].is_null());
    assert_eq!(money(&body["variants"][1]["price"]), dec!(22.00));
    assert_eq!(body["review_count"], 0);

    app.call(
        Method::PUT,
        &format!("/api/products/{product_id}"),
        Some(json!({ "price": "18.00", "name": "Tee Shirt" })),
        Some(&admin),
        StatusCode::OK,
    )
    .await;

    let body = app
        .call(
            Method::GET,
            &format!("/api/products/{product_id}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(money(&body["price"]), dec!(18.00));
    assert_eq!(body["name"], "Tee Shirt");
    assert_eq!(body["slug"], "tee-shirt");
}

#[tokio::test]
async fn duplicate_sku_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let first = app.create_product(&admin, "Shirt", "20.00", 0).await;
    let second = app.create_product(&admin, "Pants", "30.00", 0).await;
    app.create_variant(&admin, first, "SKU-1", None, 1).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/products/{second}/variants"),
            Some(json!({ "sku": "SKU-1", "name": "Dup", "stock": 1 })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleted_products_leave_the_catalog() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let product_id = app.create_product(&admin, "Lamp", "10.00", 3).await;

    // Warm the cache so the delete has something to invalidate
    app.call(
        Method::GET,
        &format!("/api/products/{product_id}"),
        None,
        None,
        StatusCode::OK,
    )
    .await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/products/{product_id}"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = app
        .call(Method::GET, "/api/products", None, None, StatusCode::OK)
        .await;
    assert_eq!(body["pagination"]["total"], 0);

    let response = app
        .request(Method::GET, "/api/products/4242", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Reviews ====================

#[tokio::test]
async fn reviews_update_product_summary() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let product_id = app.create_product(&admin, "Lamp", "10.00", 3).await;
    let (ada, _) = app.signup("Ada", "ada@example.com").await;
    let (bob, _) = app.signup("Bob", "bob@example.com").await;

    let uri = format!("/api/products/{product_id}/reviews");

    // Cache the empty summary first
    let body = app
        .call(
            Method::GET,
            &format!("/api/products/{product_id}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert!(body["average_rating"].is_null());

    app.call(
        Method::POST,
        &uri,
        Some(json!({ "rating": 5, "comment": "Bright" })),
        Some(&ada),
        StatusCode::CREATED,
    )
    .await;
    app.call(
        Method::POST,
        &uri,
        Some(json!({ "rating": 4 })),
        Some(&bob),
        StatusCode::CREATED,
    )
    .await;

    // One review per user
    app.call(
        Method::POST,
        &uri,
        Some(json!({ "rating": 1 })),
        Some(&ada),
        StatusCode::BAD_REQUEST,
    )
    .await;

    let reviews = app.call(Method::GET, &uri, None, None, StatusCode::OK).await;
    assert_eq!(reviews.as_array().unwrap().len(), 2);
    assert_eq!(reviews[0]["rating"], 4, "newest review comes first");

    let body = app
        .call(
            Method::GET,
            &format!("/api/products/{product_id}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["review_count"], 2);
    assert_eq!(body["average_rating"], 4.5);
}

#[tokio::test]
async fn review_input_is_validated() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let product_id = app.create_product(&admin, "Lamp", "10.00", 3).await;
    let (ada, _) = app.signup("Ada", "ada@example.com").await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/products/{product_id}/reviews"),
            Some(json!({ "rating": 6 })),
            Some(&ada),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/products/999/reviews",
            Some(json!({ "rating": 3 })),
            Some(&ada),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            &format!("/api/products/{product_id}/reviews"),
            Some(json!({ "rating": 3 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
