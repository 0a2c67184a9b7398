use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, Json,
};
use crate::{
    auth::AuthUser, errors::ApiError, services::addresses::CreateAddressInput, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get},
    Router,
};

pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/:id", delete(delete_address))
}

async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let addresses = state
        .services
        .addresses
        .list(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(addresses))
}

async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state
        .services
        .addresses
        .create(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(address))
}

async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .addresses
        .delete(user.user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}
