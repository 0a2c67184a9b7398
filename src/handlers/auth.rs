use crate::handlers::common::{created_response, map_service_error, success_response, Json};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::accounts::{LoginInput, SignupInput},
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

/// Signup and login; no token required
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
}

/// Routes that need a signed-in caller
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupInput>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .services
        .users
        .signup(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(response))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .services
        .users
        .login(payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(response))
}

/// Current user profile
async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .users
        .me(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}
