use super::{display_name, load_sellable};
use crate::{
    cache::{self, keys, CacheBackend},
    entities::{cart, cart_item, product, product_variant},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{info, instrument};
use validator::Validate;

/// Shopping cart service.
///
/// Every user owns at most one cart, created the first time it is needed.
/// Prices are not stored on cart lines; [`CartView`] resolves them from the
/// catalog each time the cart is read, so the cached view is what callers see
/// until the next mutation or TTL expiry.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `cache` - Cache backend for `cart:{user_id}` entries
    /// * `ttl` - Lifetime of a cached cart view
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// Returns the caller's cart, read-through cached.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: i32) -> Result<CartView, ServiceError> {
        let key = keys::cart(user_id);
        if let Some(view) = cache::get_json::<CartView>(self.cache.as_ref(), &key).await {
            return Ok(view);
        }

        let cart = get_or_create_cart(&*self.db, user_id).await?;
        let view = load_cart_view(&*self.db, &cart).await?;
        cache::set_json(self.cache.as_ref(), &key, &view, self.ttl).await;
        Ok(view)
    }

    /// Adds an item to the cart or increments the quantity if the line already exists.
    ///
    /// # Returns
    ///
    /// * `Ok(CartView)` - The cart after the change
    /// * `Err(ServiceError::NotFound)` - Unknown or inactive product, unknown variant
    /// * `Err(ServiceError::BadRequest)` - Variant belongs to another product
    /// * `Err(ServiceError::InsufficientStock)` - Resulting quantity exceeds stock
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: i32,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let cart = add_item_with(&txn, user_id, &input).await?;
        let view = load_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.invalidate(user_id).await;
        info!(
            "Added product {} (variant {:?}) x{} to cart {}",
            input.product_id, input.variant_id, input.quantity, cart.id
        );
        Ok(view)
    }

    /// Sets the quantity of a cart line. A quantity of 0 removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: i32,
        item_id: i32,
        input: UpdateCartItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let (cart, item) = find_owned_item(&txn, user_id, item_id).await?;

        if input.quantity == 0 {
            item.delete(&txn).await?;
        } else {
            let sellable = load_sellable(&txn, item.product_id, item.variant_id).await?;
            if input.quantity > sellable.available_stock() {
                return Err(ServiceError::InsufficientStock(sellable.display_name()));
            }

            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(input.quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        let view = load_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.invalidate(user_id).await;
        Ok(view)
    }

    /// Removes one line from the caller's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: i32, item_id: i32) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let (cart, item) = find_owned_item(&txn, user_id, item_id).await?;
        item.delete(&txn).await?;
        let view = load_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.invalidate(user_id).await;
        info!("Removed item {} from cart {}", item_id, cart.id);
        Ok(view)
    }

    /// Removes every line from the caller's cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: i32) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = get_or_create_cart(&txn, user_id).await?;
        let deleted = cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let view = load_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.invalidate(user_id).await;
        info!(
            "Cleared {} items from cart {}",
            deleted.rows_affected, cart.id
        );
        Ok(view)
    }

    async fn invalidate(&self, user_id: i32) {
        cache::invalidate(self.cache.as_ref(), &keys::cart(user_id)).await;
    }
}

/// Adds `input` to the user's cart on `conn`, enforcing stock. Shared with the wishlist.
pub(crate) async fn add_item_with<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    input: &AddToCartInput,
) -> Result<cart::Model, ServiceError> {
    let sellable = load_sellable(conn, input.product_id, input.variant_id).await?;
    let cart = get_or_create_cart(conn, user_id).await?;

    let mut existing = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .filter(cart_item::Column::ProductId.eq(input.product_id));
    existing = match input.variant_id {
        Some(variant_id) => existing.filter(cart_item::Column::VariantId.eq(variant_id)),
        None => existing.filter(cart_item::Column::VariantId.is_null()),
    };
    let existing = existing.one(conn).await?;

    let current = existing.as_ref().map(|item| item.quantity).unwrap_or(0);
    let requested = current.saturating_add(input.quantity);
    if requested > sellable.available_stock() {
        return Err(ServiceError::InsufficientStock(sellable.display_name()));
    }

    let now = Utc::now();
    match existing {
        Some(item) => {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(requested);
            item.updated_at = Set(now);
            item.update(conn).await?;
        }
        None => {
            cart_item::ActiveModel {
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::from)
            .map_err(|e| {
                if e.is_unique_violation() {
                    ServiceError::BadRequest("Cart was updated concurrently; retry".to_string())
                } else {
                    e
                }
            })?;
        }
    }

    Ok(cart)
}

pub(crate) async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Option<cart::Model>, ServiceError> {
    Ok(cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<cart::Model, ServiceError> {
    if let Some(cart) = find_cart(conn, user_id).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let cart = cart::ActiveModel {
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    info!("Created cart {} for user {}", cart.id, user_id);
    Ok(cart)
}

async fn find_owned_item<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    item_id: i32,
) -> Result<(cart::Model, cart_item::Model), ServiceError> {
    let not_found = || ServiceError::NotFound(format!("Cart item {} not found", item_id));

    let cart = find_cart(conn, user_id).await?.ok_or_else(not_found)?;
    let item = cart_item::Entity::find_by_id(item_id)
        .filter(cart_item::Column::CartId.eq(cart.id))
        .one(conn)
        .await?
        .ok_or_else(not_found)?;

    Ok((cart, item))
}

/// Builds the priced view of a cart from its lines and the current catalog.
pub(crate) async fn load_cart_view<C: ConnectionTrait>(
    conn: &C,
    cart: &cart::Model,
) -> Result<CartView, ServiceError> {
    let items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?;

    let product_ids: Vec<i32> = items.iter().map(|i| i.product_id).collect();
    let variant_ids: Vec<i32> = items.iter().filter_map(|i| i.variant_id).collect();

    let products: HashMap<i32, product::Model> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    let variants: HashMap<i32, product_variant::Model> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        product_variant::Entity::find()
            .filter(product_variant::Column::Id.is_in(variant_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    let lines = items
        .into_iter()
        .filter_map(|item| {
            // FK cascades keep these present
            let product = products.get(&item.product_id)?;
            let variant = item.variant_id.and_then(|id| variants.get(&id));
            let unit_price = variant
                .map(|v| v.effective_price(product.price))
                .unwrap_or(product.price);
            Some(CartLine {
                item_id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                name: display_name(product, variant),
                unit_price,
                quantity: item.quantity,
                line_total: unit_price * Decimal::from(item.quantity),
                available: product.is_active,
            })
        })
        .collect();

    Ok(CartView::new(cart.id, lines))
}

/// Input for adding item to cart
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddToCartInput {
    pub product_id: i32,
    #[serde(default)]
    pub variant_id: Option<i32>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCartItemInput {
    #[validate(range(min = 0, max = 1000))]
    pub quantity: i32,
}

/// One priced cart line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: i32,
    pub product_id: i32,
    pub variant_id: Option<i32>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    /// False once the product has been removed from the catalog. Such lines
    /// stay visible so they can be removed but do not count towards totals.
    pub available: bool,
}

/// Cart as returned to clients and stored under `cart:{user_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: i32,
    pub items: Vec<CartLine>,
    pub total_items: i64,
    pub subtotal: Decimal,
}

impl CartView {
    pub fn new(cart_id: i32, items: Vec<CartLine>) -> Self {
        let total_items = items
            .iter()
            .filter(|line| line.available)
            .map(|line| i64::from(line.quantity))
            .sum();
        let subtotal = items
            .iter()
            .filter(|line| line.available)
            .map(|line| line.line_total)
            .sum();
        Self {
            cart_id,
            items,
            total_items,
            subtotal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(item_id: i32, price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            item_id,
            product_id: item_id,
            variant_id: None,
            name: format!("Item {item_id}"),
            unit_price: price,
            quantity,
            line_total: price * Decimal::from(quantity),
            available: true,
        }
    }

    #[test]
    fn cart_view_totals() {
        let view = CartView::new(1, vec![line(1, dec!(10.00), 2), line(2, dec!(25.50), 1)]);
        assert_eq!(view.total_items, 3);
        assert_eq!(view.subtotal, dec!(45.50));
    }

    #[test]
    fn unavailable_lines_are_listed_but_not_totalled() {
        let gone = CartLine {
            available: false,
            ..line(2, dec!(25.50), 4)
        };
        let view = CartView::new(1, vec![line(1, dec!(10.00), 2), gone]);
        assert_eq!(view.items.len(), 2);
        assert_eq!(view.total_items, 2);
        assert_eq!(view.subtotal, dec!(20.00));
    }

    #[test]
    fn empty_cart_view() {
        let view = CartView::new(7, vec![]);
        assert_eq!(view.total_items, 0);
        assert_eq!(view.subtotal, Decimal::ZERO);
        assert!(view.items.is_empty());
    }

    #[test]
    fn cart_view_survives_cache_encoding() {
        let view = CartView::new(3, vec![line(1, dec!(10.00), 2)]);
        let raw = serde_json::to_string(&view).unwrap();
        let back: CartView = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn add_to_cart_input_defaults_quantity() {
        let input: AddToCartInput = serde_json::from_str(r#"{"product_id": 5}"#).unwrap();
        assert_eq!(input.quantity, 1);
        assert!(input.variant_id.is_none());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn zero_quantity_is_rejected_when_adding() {
        let input = AddToCartInput {
            product_id: 1,
            variant_id: None,
            quantity: 0,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn zero_quantity_is_allowed_when_updating() {
        assert!(UpdateCartItemInput { quantity: 0 }.validate().is_ok());
        assert!(UpdateCartItemInput { quantity: -1 }.validate().is_err());
    }
}
