//! Storefront API Library
//!
//! Catalog, carts, wishlists, addresses, reviews and transactional order
//! placement over axum and sea-orm, with a write-invalidate cache in front of
//! per-user and catalog reads.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, middleware, Router};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::{auth_middleware, require_roles, AuthService, ADMIN_ONLY, CUSTOMER_OR_ADMIN};
use crate::cache::CacheBackend;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    pub cache: Arc<dyn CacheBackend>,
}

impl AppState {
    /// Builds the auth service and every domain service from one pool and cache.
    pub fn new(
        db: Arc<DatabaseConnection>,
        cache: Arc<dyn CacheBackend>,
        config: config::AppConfig,
    ) -> Self {
        let auth = Arc::new(AuthService::new((&config).into()));
        let services = handlers::AppServices::new(db.clone(), cache.clone(), auth.clone(), &config);
        Self {
            db,
            config,
            services,
            auth,
            cache,
        }
    }
}

/// Routes under `/api`, grouped by the role allow-list guarding them.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .merge(handlers::auth::public_routes())
        .merge(handlers::categories::public_routes())
        .merge(handlers::products::public_routes());

    let customer = Router::new()
        .merge(handlers::auth::protected_routes())
        .merge(handlers::products::customer_routes())
        .merge(handlers::cart::cart_routes())
        .merge(handlers::wishlist::wishlist_routes())
        .merge(handlers::addresses::address_routes())
        .merge(handlers::orders::customer_routes())
        .route_layer(middleware::from_fn_with_state(CUSTOMER_OR_ADMIN, require_roles))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    let admin = Router::new()
        .merge(handlers::categories::admin_routes())
        .merge(handlers::products::admin_routes())
        .merge(handlers::orders::admin_routes())
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, require_roles))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    public.merge(customer).merge(admin)
}

/// Full application router: API, health probes and the HTTP middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api", api_routes(&state))
        .merge(health::health_routes())
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}

/// Configured origins, or any origin when none are set outside production.
pub fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        base.allow_origin(AllowOrigin::list(origins))
    } else if config.is_production() {
        base
    } else {
        base.allow_origin(Any)
    }
}
