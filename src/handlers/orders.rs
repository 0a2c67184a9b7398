use crate::handlers::common::{created_response, map_service_error, success_response, Json};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::commerce::{BuyNowInput, PlaceOrderInput, UpdateOrderStatusInput},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};

/// Checkout and order history for the caller
pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/order", get(list_orders))
        .route("/order/placeOrder", post(place_order))
        .route("/order/buyNow", post(buy_now))
        .route("/order/:id", get(get_order))
        .route("/order/:id/cancel", post(cancel_order))
}

/// Fulfilment status changes
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/order/:id/status", put(update_order_status))
}

/// Place an order from the caller's cart
async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .place_order(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

/// Buy a single product without going through the cart
async fn buy_now(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BuyNowInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .buy_now(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .orders
        .list_orders(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(&user, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .cancel_order(&user, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderStatusInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .update_status(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
