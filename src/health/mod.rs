/*!
 * # Health Check Module
 *
 * - Health check (`/health`) - Database and cache probes; 503 when the database is down
 * - Liveness check (`/health/live`) - Process is up, no dependencies touched
 * - Version info (`/health/version`)
 */

use crate::{cache::CacheBackend, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

/// Body of `GET /health`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub database: HealthStatus,
    pub cache: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

impl HealthInfo {
    /// Combines component probes: the database decides up/down, the cache only degrades.
    pub fn from_checks(database: HealthStatus, cache: HealthStatus) -> Self {
        let status = match (database, cache) {
            (HealthStatus::Down, _) => HealthStatus::Down,
            (_, HealthStatus::Up) => database,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            cache,
            timestamp: Utc::now(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

async fn check_database(db: &DatabaseConnection) -> HealthStatus {
    match crate::db::check_connection(db).await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            error!("Database health check failed: {}", e);
            HealthStatus::Down
        }
    }
}

async fn check_cache(cache: &dyn CacheBackend) -> HealthStatus {
    match cache.ping().await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            warn!(backend = cache.name(), "Cache health check failed: {}", e);
            HealthStatus::Degraded
        }
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check endpoint called");

    let database = check_database(&state.db).await;
    let cache = check_cache(state.cache.as_ref()).await;
    let health = HealthInfo::from_checks(database, cache);

    (health.status_code(), Json(health))
}

/// Liveness check endpoint
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

/// Creates router with health check endpoints
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/version", get(version_info))
}
