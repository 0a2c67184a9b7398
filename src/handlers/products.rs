use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, Json,
    PaginatedResponse, Query,
};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::commerce::{
        CreateProductInput, CreateReviewInput, CreateVariantInput, ProductSearchQuery,
        UpdateProductInput,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};

/// Catalog browsing and review listing
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/products/:id/reviews", get(list_reviews))
}

pub fn customer_routes() -> Router<AppState> {
    Router::new().route("/products/:id/reviews", post(create_review))
}

/// Catalog management
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/products/:id/variants", post(create_variant))
}

/// List active products
async fn list_products(
    State(state): State<AppState>,
    Query(mut query): Query<ProductSearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    query.per_page = Some(state.config.clamp_page_size(query.per_page));

    let result = state
        .services
        .product_catalog
        .search_products(query)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        result.products,
        result.page,
        result.per_page,
        result.total,
    )))
}

/// Get product with variants and review summary
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .product_catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Create a new product
async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .product_catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(product))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .product_catalog
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .product_catalog
        .delete_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

async fn create_variant(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CreateVariantInput>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = state
        .services
        .product_catalog
        .create_variant(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(variant))
}

async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let reviews = state
        .services
        .reviews
        .list_reviews(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(reviews))
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<CreateReviewInput>,
) -> Result<impl IntoResponse, ApiError> {
    let review = state
        .services
        .reviews
        .create_review(user.user_id, id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(review))
}
