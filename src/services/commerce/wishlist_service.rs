use super::cart_service::{add_item_with, load_cart_view, AddToCartInput, CartView};
use crate::{
    cache::{self, keys, CacheBackend},
    entities::{product, wishlist},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{info, instrument};

/// Per-user wishlist of products.
#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// Wishlist entries with their product, newest first. Cached under `wishlist:{user_id}`.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: i32) -> Result<Vec<WishlistEntry>, ServiceError> {
        let key = keys::wishlist(user_id);
        if let Some(entries) = cache::get_json::<Vec<WishlistEntry>>(self.cache.as_ref(), &key).await
        {
            return Ok(entries);
        }

        let rows = wishlist::Entity::find()
            .filter(wishlist::Column::UserId.eq(user_id))
            .order_by_desc(wishlist::Column::CreatedAt)
            .order_by_desc(wishlist::Column::Id)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<i32> = rows.iter().map(|row| row.product_id).collect();
        let products: HashMap<i32, product::Model> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .filter(product::Column::IsActive.eq(true))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let entries: Vec<WishlistEntry> = rows
            .into_iter()
            .filter_map(|row| {
                let product = products.get(&row.product_id)?;
                Some(WishlistEntry::new(&row, product))
            })
            .collect();

        cache::set_json(self.cache.as_ref(), &key, &entries, self.ttl).await;
        Ok(entries)
    }

    /// Adds a product. Adding one that is already present is rejected.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: i32,
        input: AddToWishlistInput,
    ) -> Result<WishlistEntry, ServiceError> {
        let product = product::Entity::find_by_id(input.product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if find_entry(&*self.db, user_id, product.id).await?.is_some() {
            return Err(already_listed());
        }

        let row = wishlist::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::from)
        .map_err(|e| if e.is_unique_violation() { already_listed() } else { e })?;

        self.invalidate(user_id).await;
        info!("User {} added product {} to wishlist", user_id, product.id);
        Ok(WishlistEntry::new(&row, &product))
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: i32, product_id: i32) -> Result<(), ServiceError> {
        let row = find_entry(&*self.db, user_id, product_id)
            .await?
            .ok_or_else(|| not_listed(product_id))?;
        row.delete(&*self.db).await?;

        self.invalidate(user_id).await;
        info!("User {} removed product {} from wishlist", user_id, product_id);
        Ok(())
    }

    /// Moves a wishlist product into the cart with quantity 1.
    #[instrument(skip(self))]
    pub async fn move_to_cart(&self, user_id: i32, product_id: i32) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let row = find_entry(&txn, user_id, product_id)
            .await?
            .ok_or_else(|| not_listed(product_id))?;

        let input = AddToCartInput {
            product_id,
            variant_id: None,
            quantity: 1,
        };
        let cart = add_item_with(&txn, user_id, &input).await?;
        row.delete(&txn).await?;
        let view = load_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.invalidate(user_id).await;
        cache::invalidate(self.cache.as_ref(), &keys::cart(user_id)).await;
        info!("User {} moved product {} to cart", user_id, product_id);
        Ok(view)
    }

    async fn invalidate(&self, user_id: i32) {
        cache::invalidate(self.cache.as_ref(), &keys::wishlist(user_id)).await;
    }
}

async fn find_entry<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    product_id: i32,
) -> Result<Option<wishlist::Model>, ServiceError> {
    Ok(wishlist::Entity::find()
        .filter(wishlist::Column::UserId.eq(user_id))
        .filter(wishlist::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}

fn already_listed() -> ServiceError {
    ServiceError::BadRequest("Product is already in the wishlist".to_string())
}

fn not_listed(product_id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Product {} is not in the wishlist", product_id))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddToWishlistInput {
    pub product_id: i32,
}

/// Wishlist row joined with the product it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub wishlist_id: i32,
    pub product_id: i32,
    pub name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub added_at: DateTime<Utc>,
}

impl WishlistEntry {
    fn new(row: &wishlist::Model, product: &product::Model) -> Self {
        Self {
            wishlist_id: row.id,
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            image_url: product.image_url.clone(),
            is_active: product.is_active,
            added_at: row.created_at,
        }
    }
}
