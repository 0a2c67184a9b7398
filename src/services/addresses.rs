//! Shipping addresses. Each user has at most one default address.

use crate::{entities::address, errors::ServiceError};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Default address first, then oldest to newest.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: i32) -> Result<Vec<address::Model>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_asc(address::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// The first address a user saves becomes their default.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: i32,
        input: CreateAddressInput,
    ) -> Result<address::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let existing = address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .count(&txn)
            .await?;
        let is_default = input.is_default || existing == 0;

        if is_default && existing > 0 {
            clear_default(&txn, user_id).await?;
        }

        let address = address::ActiveModel {
            user_id: Set(user_id),
            line1: Set(input.line1),
            line2: Set(input.line2),
            city: Set(input.city),
            state: Set(input.state),
            postal_code: Set(input.postal_code),
            country: Set(input.country),
            is_default: Set(is_default),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(user_id, address_id = address.id, is_default, "address saved");
        Ok(address)
    }

    /// Deleting the default promotes the oldest remaining address.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: i32, address_id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let address = address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;
        let was_default = address.is_default;
        address.delete(&txn).await?;

        if was_default {
            let next = address::Entity::find()
                .filter(address::Column::UserId.eq(user_id))
                .order_by_asc(address::Column::Id)
                .one(&txn)
                .await?;
            if let Some(next) = next {
                let mut next: address::ActiveModel = next.into();
                next.is_default = Set(true);
                next.update(&txn).await?;
            }
        }

        txn.commit().await?;
        info!(user_id, address_id, "address deleted");
        Ok(())
    }
}

async fn clear_default<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<(), ServiceError> {
    address::Entity::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .filter(address::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAddressInput {
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}
