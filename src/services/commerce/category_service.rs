use super::slugify;
use crate::{
    cache::{self, keys, CacheBackend},
    entities::category,
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument};
use validator::Validate;

#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// All categories ordered by name, cached under `categories:all`.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        if let Some(categories) =
            cache::get_json::<Vec<category::Model>>(self.cache.as_ref(), keys::CATEGORIES_ALL)
                .await
        {
            return Ok(categories);
        }

        let categories = category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;

        cache::set_json(self.cache.as_ref(), keys::CATEGORIES_ALL, &categories, self.ttl).await;
        Ok(categories)
    }

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let slug = slugify(&input.name);
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "name: must contain letters or digits".to_string(),
            ));
        }

        let taken = category::Entity::find()
            .filter(category::Column::Slug.eq(slug.as_str()))
            .count(&*self.db)
            .await?;
        if taken > 0 {
            return Err(duplicate_slug(&slug));
        }

        let category = category::ActiveModel {
            name: Set(input.name.trim().to_string()),
            slug: Set(slug.clone()),
            description: Set(input.description),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::from)
        .map_err(|e| if e.is_unique_violation() { duplicate_slug(&slug) } else { e })?;

        cache::invalidate(self.cache.as_ref(), keys::CATEGORIES_ALL).await;
        info!("Created category {} ({})", category.id, category.slug);
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: i32) -> Result<(), ServiceError> {
        let category = category::Entity::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))?;

        category.delete(&*self.db).await?;

        cache::invalidate(self.cache.as_ref(), keys::CATEGORIES_ALL).await;
        info!("Deleted category {}", category_id);
        Ok(())
    }
}

fn duplicate_slug(slug: &str) -> ServiceError {
    ServiceError::BadRequest(format!("Category {} already exists", slug))
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}
