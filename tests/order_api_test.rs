//! Checkout, order visibility, cancellation and fulfilment status.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn place_order(app: &TestApp, token: &str, body: Value, expected: StatusCode) -> Value {
    app.call(Method::POST, "/api/order/placeOrder", Some(body), Some(token), expected)
        .await
}

async fn create_address(app: &TestApp, token: &str) -> i64 {
    let body = app
        .call(
            Method::POST,
            "/api/addresses",
            Some(json!({
                "line1": "1 Main St",
                "city": "Springfield",
                "postal_code": "62701",
                "country": "US",
            })),
            Some(token),
            StatusCode::CREATED,
        )
        .await;
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn place_order_reserves_stock_and_clears_cart() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, user_id) = app.signup("Ada", "ada@example.com").await;
    let address_id = create_address(&app, &token).await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;
    let mug = app.create_product(&admin, "Mug", "4.00", 10).await;

    app.add_to_cart(&token, lamp, 2).await;
    app.add_to_cart(&token, mug, 3).await;
    assert_eq!(app.product_stock(lamp).await, 5);

    let order = place_order(
        &app,
        &token,
        json!({ "address_id": address_id }),
        StatusCode::CREATED,
    )
    .await;

    assert_eq!(order["user_id"], user_id);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["address_id"], address_id);
    assert_eq!(order["currency"], "USD");
    assert_eq!(money(&order["total"]), dec!(37.00));
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["items"][0]["name"], "Lamp");
    assert_eq!(money(&order["items"][0]["unit_price"]), dec!(12.50));
    assert_eq!(order["payment"]["status"], "pending");
    assert_eq!(order["payment"]["method"], "cod");
    assert_eq!(money(&order["payment"]["amount"]), dec!(37.00));

    assert_eq!(app.product_stock(lamp).await, 3);
    assert_eq!(app.product_stock(mug).await, 7);

    let cart = app
        .call(Method::GET, "/api/cart", None, Some(&token), StatusCode::OK)
        .await;
    assert!(cart["items"].as_array().unwrap().is_empty());

    let orders = app
        .call(Method::GET, "/api/order", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["id"], order["id"]);
}

#[tokio::test]
async fn empty_cart_cannot_be_ordered() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;

    let body = place_order(&app, &token, json!({}), StatusCode::BAD_REQUEST).await;
    assert!(body["message"].as_str().unwrap().contains("Cart is empty"));
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;
    let mug = app.create_product(&admin, "Mug", "4.00", 10).await;

    app.add_to_cart(&token, mug, 2).await;
    app.add_to_cart(&token, lamp, 4).await;

    // Stock drops after the items were carted
    app.call(
        Method::PUT,
        &format!("/api/products/{lamp}"),
        Some(json!({ "stock": 1 })),
        Some(&admin),
        StatusCode::OK,
    )
    .await;

    let body = place_order(&app, &token, json!({}), StatusCode::BAD_REQUEST).await;
    assert!(body["message"].as_str().unwrap().contains("Lamp"));

    // The mug line was reserved first and must have been rolled back
    assert_eq!(app.product_stock(mug).await, 10);
    assert_eq!(app.product_stock(lamp).await, 1);

    let cart = app
        .call(Method::GET, "/api/cart", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);

    let orders = app
        .call(Method::GET, "/api/order", None, Some(&token), StatusCode::OK)
        .await;
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn buy_now_skips_the_cart() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let shirt = app.create_product(&admin, "Shirt", "20.00", 10).await;
    let shirt_xl = app
        .create_variant(&admin, shirt, "SHIRT-XL", Some("22.00"), 3)
        .await;
    let mug = app.create_product(&admin, "Mug", "4.00", 10).await;

    app.add_to_cart(&token, mug, 1).await;

    let order = app
        .call(
            Method::POST,
            "/api/order/buyNow",
            Some(json!({
                "product_id": shirt,
                "variant_id": shirt_xl,
                "quantity": 2,
                "payment_method": "card",
            })),
            Some(&token),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(money(&order["total"]), dec!(44.00));
    assert_eq!(order["items"][0]["variant_id"], shirt_xl);
    assert_eq!(order["payment"]["method"], "card");

    let product = app
        .call(
            Method::GET,
            &format!("/api/products/{shirt}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(product["stock"], 10, "product stock is a separate pool");
    assert_eq!(product["variants"][0]["stock"], 1);

    // The cart is untouched
    let cart = app
        .call(Method::GET, "/api/cart", None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(cart["total_items"], 1);

    app.call(
        Method::POST,
        "/api/order/buyNow",
        Some(json!({ "product_id": shirt, "variant_id": shirt_xl, "quantity": 2 })),
        Some(&token),
        StatusCode::BAD_REQUEST,
    )
    .await;
    app.call(
        Method::POST,
        "/api/order/buyNow",
        Some(json!({ "product_id": shirt, "quantity": 0 })),
        Some(&token),
        StatusCode::BAD_REQUEST,
    )
    .await;
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (ada, _) = app.signup("Ada", "ada@example.com").await;
    let (bob, _) = app.signup("Bob", "bob@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;

    app.add_to_cart(&ada, lamp, 1).await;
    let order = place_order(&app, &ada, json!({}), StatusCode::CREATED).await;
    let uri = format!("/api/order/{}", order["id"]);

    app.call(Method::GET, &uri, None, Some(&ada), StatusCode::OK)
        .await;
    app.call(Method::GET, &uri, None, Some(&bob), StatusCode::NOT_FOUND)
        .await;
    app.call(
        Method::POST,
        &format!("{uri}/cancel"),
        None,
        Some(&bob),
        StatusCode::NOT_FOUND,
    )
    .await;

    let seen_by_admin = app
        .call(Method::GET, &uri, None, Some(&admin), StatusCode::OK)
        .await;
    assert_eq!(seen_by_admin["id"], order["id"]);

    let bobs = app
        .call(Method::GET, "/api/order", None, Some(&bob), StatusCode::OK)
        .await;
    assert!(bobs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ordering_to_someone_elses_address_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (ada, _) = app.signup("Ada", "ada@example.com").await;
    let (bob, _) = app.signup("Bob", "bob@example.com").await;
    let bobs_address = create_address(&app, &bob).await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;

    app.add_to_cart(&ada, lamp, 1).await;
    place_order(
        &app,
        &ada,
        json!({ "address_id": bobs_address }),
        StatusCode::NOT_FOUND,
    )
    .await;

    assert_eq!(app.product_stock(lamp).await, 5);
}

#[tokio::test]
async fn cancel_restores_stock_and_refunds() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;

    app.add_to_cart(&token, lamp, 3).await;
    let order = place_order(&app, &token, json!({}), StatusCode::CREATED).await;
    assert_eq!(app.product_stock(lamp).await, 2);

    let uri = format!("/api/order/{}/cancel", order["id"]);
    let cancelled = app
        .call(Method::POST, &uri, None, Some(&token), StatusCode::OK)
        .await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["payment"]["status"], "refunded");
    assert_eq!(app.product_stock(lamp).await, 5);

    app.call(Method::POST, &uri, None, Some(&token), StatusCode::BAD_REQUEST)
        .await;
    assert_eq!(app.product_stock(lamp).await, 5);
}

#[tokio::test]
async fn cancel_returns_variant_stock_to_the_variant() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let shirt = app.create_product(&admin, "Shirt", "20.00", 10).await;
    let shirt_xl = app
        .create_variant(&admin, shirt, "SHIRT-XL", Some("22.00"), 3)
        .await;

    let order = app
        .call(
            Method::POST,
            "/api/order/buyNow",
            Some(json!({ "product_id": shirt, "variant_id": shirt_xl, "quantity": 2 })),
            Some(&token),
            StatusCode::CREATED,
        )
        .await;

    let cancelled = app
        .call(
            Method::POST,
            &format!("/api/order/{}/cancel", order["id"]),
            None,
            Some(&token),
            StatusCode::OK,
        )
        .await;
    assert_eq!(cancelled["status"], "cancelled");

    let product = app
        .call(
            Method::GET,
            &format!("/api/products/{shirt}"),
            None,
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(product["variants"][0]["id"], shirt_xl);
    assert_eq!(product["variants"][0]["stock"], 3);
    assert_eq!(product["stock"], 10);
    assert_eq!(app.product_stock(shirt).await, 10);
}

#[tokio::test]
async fn cancelled_orders_cannot_be_paid() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;

    app.add_to_cart(&token, lamp, 2).await;
    let order = place_order(&app, &token, json!({}), StatusCode::CREATED).await;

    app.call(
        Method::POST,
        &format!("/api/order/{}/cancel", order["id"]),
        None,
        Some(&token),
        StatusCode::OK,
    )
    .await;

    let body = app
        .call(
            Method::PUT,
            &format!("/api/order/{}/status", order["id"]),
            Some(json!({ "status": "paid" })),
            Some(&admin),
            StatusCode::BAD_REQUEST,
        )
        .await;
    assert!(body["message"].as_str().unwrap().contains("cancelled"));

    let seen = app
        .call(
            Method::GET,
            &format!("/api/order/{}", order["id"]),
            None,
            Some(&token),
            StatusCode::OK,
        )
        .await;
    assert_eq!(seen["status"], "cancelled");
    assert_eq!(seen["payment"]["status"], "refunded");
    assert_eq!(app.product_stock(lamp).await, 5);
}

#[tokio::test]
async fn admin_moves_order_through_fulfilment() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (token, _) = app.signup("Ada", "ada@example.com").await;
    let lamp = app.create_product(&admin, "Lamp", "12.50", 5).await;

    app.add_to_cart(&token, lamp, 1).await;
    let order = place_order(&app, &token, json!({}), StatusCode::CREATED).await;
    let status_uri = format!("/api/order/{}/status", order["id"]);

    // Customers cannot drive fulfilment
    app.call(
        Method::PUT,
        &status_uri,
        Some(json!({ "status": "paid" })),
        Some(&token),
        StatusCode::FORBIDDEN,
    )
    .await;

    // Skipping a step is rejected
    app.call(
        Method::PUT,
        &status_uri,
        Some(json!({ "status": "shipped" })),
        Some(&admin),
        StatusCode::BAD_REQUEST,
    )
    .await;

    let paid = app
        .call(
            Method::PUT,
            &status_uri,
            Some(json!({ "status": "paid" })),
            Some(&admin),
            StatusCode::OK,
        )
        .await;
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["payment"]["status"], "completed");

    // Paid orders can no longer be cancelled
    app.call(
        Method::POST,
        &format!("/api/order/{}/cancel", order["id"]),
        None,
        Some(&token),
        StatusCode::BAD_REQUEST,
    )
    .await;

    for next in ["shipped", "delivered"] {
        let body = app
            .call(
                Method::PUT,
                &status_uri,
                Some(json!({ "status": next })),
                Some(&admin),
                StatusCode::OK,
            )
            .await;
        assert_eq!(body["status"], next);
    }

    app.call(
        Method::PUT,
        "/api/order/4242/status",
        Some(json!({ "status": "paid" })),
        Some(&admin),
        StatusCode::NOT_FOUND,
    )
    .await;
}
