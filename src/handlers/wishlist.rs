use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, Json,
};
use crate::{
    auth::AuthUser, errors::ApiError, services::commerce::AddToWishlistInput, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};

pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/wishlist", get(list_wishlist).post(add_to_wishlist))
        .route("/wishlist/:product_id", delete(remove_from_wishlist))
        .route("/wishlist/:product_id/move-to-cart", post(move_to_cart))
}

async fn list_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .services
        .wishlist
        .list(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(entries))
}

async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToWishlistInput>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .services
        .wishlist
        .add(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(entry))
}

async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .wishlist
        .remove(user.user_id, product_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Moves a wishlist product into the cart; responds with the updated cart
async fn move_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .wishlist
        .move_to_cart(user.user_id, product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}
