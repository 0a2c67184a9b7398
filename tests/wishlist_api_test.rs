mod common;

use axum::http::{Method, StatusCode};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn add_list_and_remove() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.00", 5).await;
    let mug = app.create_product(&admin, "Mug", "4.00", 5).await;

    let entry = app
        .call(
            Method::POST,
            "/api/wishlist",
            Some(json!({ "product_id": lamp })),
            Some(&token),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(entry["product_id"], lamp);
    assert_eq!(entry["name"], "Lamp");
    assert_eq!(money(&entry["price"]), dec!(12.00));

    app.call(
        Method::POST,
        "/api/wishlist",
        Some(json!({ "product_id": lamp })),
        Some(&token),
        StatusCode::BAD_REQUEST,
    )
    .await;
    app.call(
        Method::POST,
        "/api/wishlist",
        Some(json!({ "product_id": 4242 })),
        Some(&token),
        StatusCode::NOT_FOUND,
    )
    .await;
    app.call(
        Method::POST,
        "/api/wishlist",
        Some(json!({ "product_id": mug })),
        Some(&token),
        StatusCode::CREATED,
    )
    .await;

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let response = app
        .request(Method::DELETE, &format!("/api/wishlist/{lamp}"), None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::DELETE, &format!("/api/wishlist/{lamp}"), None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["product_id"], mug);
}

#[tokio::test]
async fn wishlists_are_per_user() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (ada, _) = app.signup("Ada", "ada@example.com").await;
    let (bob, _) = app.signup("Bob", "bob@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.00", 5).await;

    app.call(
        Method::POST,
        "/api/wishlist",
        Some(json!({ "product_id": lamp })),
        Some(&ada),
        StatusCode::CREATED,
    )
    .await;

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&bob), StatusCode::OK)
        .await;
    assert!(list.as_array().unwrap().is_empty());

    let response = app
        .request(Method::DELETE, &format!("/api/wishlist/{lamp}"), None, Some(&bob))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn move_to_cart_transfers_the_product() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.00", 5).await;

    app.call(
        Method::POST,
        "/api/wishlist",
        Some(json!({ "product_id": lamp })),
        Some(&token),
        StatusCode::CREATED,
    )
    .await;
    // Prime both cached views
    app.call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    app.call(Method::GET, "/api/cart", None, Some(&token), StatusCode::OK)
        .await;

    let cart = app
        .call(
            Method::POST,
            &format!("/api/wishlist/{lamp}/move-to-cart"),
            None,
            Some(&token),
            StatusCode::OK,
        )
        .await;
    assert_eq!(cart["items"][0]["product_id"], lamp);
    assert_eq!(cart["items"][0]["quantity"], 1);

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    assert!(list.as_array().unwrap().is_empty());

    let cached_cart = app
        .call(Method::GET, "/api/cart", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(cached_cart["total_items"], 1);

    app.call(
        Method::POST,
        &format!("/api/wishlist/{lamp}/move-to-cart"),
        None,
        Some(&token),
        StatusCode::NOT_FOUND,
    )
    .await;
}

#[tokio::test]
async fn move_to_cart_keeps_the_entry_when_out_of_stock() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.00", 0).await;

    app.call(
        Method::POST,
        "/api/wishlist",
        Some(json!({ "product_id": lamp })),
        Some(&token),
        StatusCode::CREATED,
    )
    .await;

    app.call(
        Method::POST,
        &format!("/api/wishlist/{lamp}/move-to-cart"),
        None,
        Some(&token),
        StatusCode::BAD_REQUEST,
    )
    .await;

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn withdrawn_products_drop_out_of_the_wishlist() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.00", 5).await;
    let mug = app.create_product(&admin, "Mug", "4.00", 5).await;

    for product_id in [lamp, mug] {
        app.call(
            Method::POST,
            "/api/wishlist",
            Some(json!({ "product_id": product_id })),
            Some(&token),
            StatusCode::CREATED,
        )
        .await;
    }

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let response = app
        .request(Method::DELETE, &format!("/api/products/{lamp}"), None, Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let list = app
        .call(Method::GET, "/api/wishlist", None, Some(&token), StatusCode::OK)
        .await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["product_id"], mug);
}
