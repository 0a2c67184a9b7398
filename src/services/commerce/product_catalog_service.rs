use super::{slugify, validate_non_negative_price};
use crate::{
    cache::{self, keys, CacheBackend},
    entities::{cart, cart_item, category, product, product_variant, review, wishlist},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument};
use validator::Validate;

const DEFAULT_PER_PAGE: u64 = 20;

/// Product catalog service for managing products and variants
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// Search active products
    #[instrument(skip(self))]
    pub async fn search_products(
        &self,
        query: ProductSearchQuery,
    ) -> Result<ProductSearchResult, ServiceError> {
        let mut db_query = product::Entity::find().filter(product::Column::IsActive.eq(true));

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            db_query = db_query
                .filter(Expr::expr(Func::lower(Expr::col(product::Column::Name))).like(pattern));
        }

        if let Some(category_id) = query.category_id {
            db_query = db_query.filter(product::Column::CategoryId.eq(category_id));
        }

        let total = db_query.clone().count(&*self.db).await?;

        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
        let page = query.page.unwrap_or(1).max(1);

        let products = db_query
            .order_by_desc(product::Column::CreatedAt)
            .order_by_desc(product::Column::Id)
            .limit(per_page)
            .offset(page_offset(page, per_page))
            .all(&*self.db)
            .await?;

        Ok(ProductSearchResult {
            products,
            total,
            page,
            per_page,
        })
    }

    /// Get product with variants and its review summary
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: i32) -> Result<ProductDetails, ServiceError> {
        let key = keys::product(product_id);
        if let Some(details) = cache::get_json::<ProductDetails>(self.cache.as_ref(), &key).await {
            return Ok(details);
        }

        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variants = product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Id)
            .all(&*self.db)
            .await?;

        let ratings: Vec<i16> = review::Entity::find()
            .select_only()
            .column(review::Column::Rating)
            .filter(review::Column::ProductId.eq(product_id))
            .into_tuple()
            .all(&*self.db)
            .await?;

        let details = ProductDetails {
            product,
            variants,
            review_count: ratings.len() as u64,
            average_rating: average_rating(&ratings),
        };

        cache::set_json(self.cache.as_ref(), &key, &details, self.ttl).await;
        Ok(details)
    }

    /// Create a new product
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            name: Set(input.name.trim().to_string()),
            slug: Set(slugify(&input.name)),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            category_id: Set(input.category_id),
            image_url: Set(input.image_url),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!("Created product: {}", product.id);
        Ok(product)
    }

    /// Update product fields that are present in the input
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: i32,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let existing = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let mut product: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            product.slug = Set(slugify(&name));
            product.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            product.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            product.price = Set(price);
        }
        if let Some(stock) = input.stock {
            product.stock = Set(stock);
        }
        if let Some(category_id) = input.category_id {
            product.category_id = Set(Some(category_id));
        }
        if let Some(image_url) = input.image_url {
            product.image_url = Set(Some(image_url));
        }
        if let Some(is_active) = input.is_active {
            product.is_active = Set(is_active);
        }
        product.updated_at = Set(Utc::now());

        let product = product.update(&*self.db).await?;
        self.invalidate(product_id).await;

        info!("Updated product: {}", product_id);
        Ok(product)
    }

    /// Soft delete: the row stays for order history but leaves the catalog
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: i32) -> Result<(), ServiceError> {
        let existing = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut product: product::ActiveModel = existing.into();
        product.is_active = Set(false);
        product.updated_at = Set(Utc::now());
        product.update(&*self.db).await?;

        self.invalidate(product_id).await;
        self.invalidate_holders(product_id).await?;
        info!("Deactivated product: {}", product_id);
        Ok(())
    }

    /// Create a product variant
    #[instrument(skip(self))]
    pub async fn create_variant(
        &self,
        product_id: i32,
        input: CreateVariantInput,
    ) -> Result<product_variant::Model, ServiceError> {
        input.validate()?;

        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let sku = input.sku.trim().to_string();
        let taken = product_variant::Entity::find()
            .filter(product_variant::Column::Sku.eq(sku.as_str()))
            .count(&*self.db)
            .await?;
        if taken > 0 {
            return Err(duplicate_sku(&sku));
        }

        let now = Utc::now();
        let variant = product_variant::ActiveModel {
            product_id: Set(product_id),
            sku: Set(sku.clone()),
            name: Set(input.name),
            price: Set(input.price),
            stock: Set(input.stock),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::from)
        .map_err(|e| if e.is_unique_violation() { duplicate_sku(&sku) } else { e })?;

        self.invalidate(product_id).await;
        info!("Created variant {} for product {}", variant.id, product_id);
        Ok(variant)
    }

    async fn ensure_category(&self, category_id: i32) -> Result<(), ServiceError> {
        category::Entity::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    async fn invalidate(&self, product_id: i32) {
        cache::invalidate(self.cache.as_ref(), &keys::product(product_id)).await;
    }

    /// Drops cached carts and wishlists that reference the product.
    async fn invalidate_holders(&self, product_id: i32) -> Result<(), ServiceError> {
        let carts = cart::Entity::find()
            .inner_join(cart_item::Entity)
            .filter(cart_item::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;
        for cart in carts {
            cache::invalidate(self.cache.as_ref(), &keys::cart(cart.user_id)).await;
        }

        let wishlists = wishlist::Entity::find()
            .filter(wishlist::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;
        for row in wishlists {
            cache::invalidate(self.cache.as_ref(), &keys::wishlist(row.user_id)).await;
        }
        Ok(())
    }
}

fn duplicate_sku(sku: &str) -> ServiceError {
    ServiceError::BadRequest(format!("SKU {} already exists", sku))
}

/// Row offset of `page` (1-based), capped at the largest offset SQL accepts.
fn page_offset(page: u64, per_page: u64) -> u64 {
    page.saturating_sub(1)
        .saturating_mul(per_page)
        .min(i64::MAX as u64)
}

fn average_rating(ratings: &[i16]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let avg = sum as f64 / ratings.len() as f64;
    Some((avg * 100.0).round() / 100.0)
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative_price")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock: i32,
    pub category_id: Option<i32>,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// Input for updating a product; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub category_id: Option<i32>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Input for creating a variant
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateVariantInput {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom = "validate_non_negative_price")]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock: i32,
}

/// Product search query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductSearchQuery {
    pub search: Option<String>,
    pub category_id: Option<i32>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Product search result
#[derive(Debug, Serialize)]
pub struct ProductSearchResult {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Product as shown on its detail page, cached under `product:{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: product::Model,
    pub variants: Vec<product_variant::Model>,
    pub review_count: u64,
    pub average_rating: Option<f64>,
}
