pub mod addresses;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod common;
pub mod orders;
pub mod products;
pub mod wishlist;

use crate::{
    auth::AuthService,
    cache::CacheBackend,
    config::AppConfig,
    db::DbPool,
    services::{
        accounts::UserService,
        addresses::AddressService,
        commerce::{
            CartService, CategoryService, OrderService, ProductCatalogService, ReviewService,
            WishlistService,
        },
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub addresses: Arc<AddressService>,
    pub categories: Arc<CategoryService>,
    pub product_catalog: Arc<ProductCatalogService>,
    pub reviews: Arc<ReviewService>,
    pub cart: Arc<CartService>,
    pub wishlist: Arc<WishlistService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    /// Wires every service to the shared pool and cache using the configured TTLs.
    pub fn new(
        db_pool: Arc<DbPool>,
        cache: Arc<dyn CacheBackend>,
        auth_service: Arc<AuthService>,
        config: &AppConfig,
    ) -> Self {
        let user_ttl = config.cache.user_ttl();
        let catalog_ttl = config.cache.catalog_ttl();

        Self {
            users: Arc::new(UserService::new(db_pool.clone(), auth_service)),
            addresses: Arc::new(AddressService::new(db_pool.clone())),
            categories: Arc::new(CategoryService::new(
                db_pool.clone(),
                cache.clone(),
                catalog_ttl,
            )),
            product_catalog: Arc::new(ProductCatalogService::new(
                db_pool.clone(),
                cache.clone(),
                catalog_ttl,
            )),
            reviews: Arc::new(ReviewService::new(db_pool.clone(), cache.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), cache.clone(), user_ttl)),
            wishlist: Arc::new(WishlistService::new(
                db_pool.clone(),
                cache.clone(),
                user_ttl,
            )),
            orders: Arc::new(OrderService::new(
                db_pool,
                cache,
                config.default_currency.clone(),
            )),
        }
    }
}
