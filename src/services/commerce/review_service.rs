use crate::{
    cache::{self, keys, CacheBackend},
    entities::{product, review},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Product reviews. Writing one invalidates the product's cached summary.
#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheBackend>) -> Self {
        Self { db, cache }
    }

    /// Reviews for a product, newest first.
    #[instrument(skip(self))]
    pub async fn list_reviews(&self, product_id: i32) -> Result<Vec<review::Model>, ServiceError> {
        self.ensure_product(product_id).await?;

        Ok(review::Entity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .order_by_desc(review::Column::CreatedAt)
            .order_by_desc(review::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Adds the caller's review. Each user may review a product once.
    #[instrument(skip(self))]
    pub async fn create_review(
        &self,
        user_id: i32,
        product_id: i32,
        input: CreateReviewInput,
    ) -> Result<review::Model, ServiceError> {
        input.validate()?;
        self.ensure_product(product_id).await?;

        let existing = review::Entity::find()
            .filter(review::Column::UserId.eq(user_id))
            .filter(review::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        if existing > 0 {
            return Err(already_reviewed());
        }

        let review = review::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product_id),
            rating: Set(input.rating),
            comment: Set(input.comment),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::from)
        .map_err(|e| if e.is_unique_violation() { already_reviewed() } else { e })?;

        cache::invalidate(self.cache.as_ref(), &keys::product(product_id)).await;
        info!(
            "User {} reviewed product {} with rating {}",
            user_id, product_id, review.rating
        );
        Ok(review)
    }

    async fn ensure_product(&self, product_id: i32) -> Result<(), ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }
}

fn already_reviewed() -> ServiceError {
    ServiceError::BadRequest("You have already reviewed this product".to_string())
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateReviewInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}
