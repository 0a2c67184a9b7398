use super::{cart_service::find_cart, load_sellable, Sellable};
use crate::{
    auth::AuthUser,
    cache::{self, keys, CacheBackend},
    entities::{address, cart_item, order, order_item, payment, product, product_variant},
    entities::{OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument, warn};
use validator::Validate;

/// Order placement and lifecycle.
///
/// Placing an order is one transaction: every line's stock is decremented with
/// a guarded update, so two buyers racing for the last unit cannot both win.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    currency: String,
}

/// A line to purchase, resolved against the catalog inside the transaction.
#[derive(Debug, Clone, Copy)]
struct LineRequest {
    product_id: i32,
    variant_id: Option<i32>,
    quantity: i32,
}

impl OrderService {
    /// Creates a new `OrderService` instance.
    ///
    /// `currency` is recorded on every new order.
    pub fn new(
        db: Arc<DatabaseConnection>,
        cache: Arc<dyn CacheBackend>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            cache,
            currency: currency.into(),
        }
    }

    /// Turns the caller's cart into an order.
    ///
    /// # Returns
    ///
    /// * `Ok(OrderDetails)` - The created order with its items and pending payment
    /// * `Err(ServiceError::BadRequest)` - The cart is empty or holds a withdrawn product
    /// * `Err(ServiceError::InsufficientStock)` - A line exceeds the stock left
    /// * `Err(ServiceError::NotFound)` - The address is not the caller's
    #[instrument(skip(self))]
    pub async fn place_order(
        &self,
        user_id: i32,
        input: PlaceOrderInput,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = find_cart(&txn, user_id).await?;
        let cart_items = match &cart {
            Some(cart) => {
                cart_item::Entity::find()
                    .filter(cart_item::Column::CartId.eq(cart.id))
                    .order_by_asc(cart_item::Column::Id)
                    .all(&txn)
                    .await?
            }
            None => Vec::new(),
        };
        if cart_items.is_empty() {
            return Err(ServiceError::BadRequest("Cart is empty".to_string()));
        }

        let withdrawn = product::Entity::find()
            .filter(product::Column::Id.is_in(cart_items.iter().map(|item| item.product_id)))
            .filter(product::Column::IsActive.eq(false))
            .one(&txn)
            .await?;
        if let Some(product) = withdrawn {
            return Err(ServiceError::BadRequest(format!(
                "{} is no longer available; remove it from the cart",
                product.name
            )));
        }

        let lines: Vec<LineRequest> = cart_items
            .iter()
            .map(|item| LineRequest {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect();

        let details = self
            .create_order(&txn, user_id, input.address_id, input.payment_method, &lines)
            .await?;

        if let Some(cart) = &cart {
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        cache::invalidate(self.cache.as_ref(), &keys::cart(user_id)).await;
        self.after_commit(&details).await;
        Ok(details)
    }

    /// Purchases a single product directly, leaving the cart untouched.
    #[instrument(skip(self))]
    pub async fn buy_now(
        &self,
        user_id: i32,
        input: BuyNowInput,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;

        let line = LineRequest {
            product_id: input.product_id,
            variant_id: input.variant_id,
            quantity: input.quantity,
        };

        let txn = self.db.begin().await?;
        let details = self
            .create_order(&txn, user_id, input.address_id, input.payment_method, &[line])
            .await?;
        txn.commit().await?;

        self.after_commit(&details).await;
        Ok(details)
    }

    async fn create_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i32,
        address_id: Option<i32>,
        method: PaymentMethod,
        lines: &[LineRequest],
    ) -> Result<OrderDetails, ServiceError> {
        if let Some(address_id) = address_id {
            address::Entity::find_by_id(address_id)
                .filter(address::Column::UserId.eq(user_id))
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Address {} not found", address_id))
                })?;
        }

        let mut resolved: Vec<(LineRequest, Sellable)> = Vec::with_capacity(lines.len());
        for line in lines {
            let sellable = load_sellable(conn, line.product_id, line.variant_id).await?;
            reserve_stock(conn, &sellable, line.quantity).await?;
            resolved.push((*line, sellable));
        }

        let total: Decimal = resolved
            .iter()
            .map(|(line, sellable)| sellable.unit_price() * Decimal::from(line.quantity))
            .sum();

        let now = Utc::now();
        let order = order::ActiveModel {
            user_id: Set(user_id),
            address_id: Set(address_id),
            status: Set(OrderStatus::Pending),
            total: Set(total),
            currency: Set(self.currency.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        let mut items = Vec::with_capacity(resolved.len());
        for (line, sellable) in &resolved {
            let item = order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                name: Set(sellable.display_name()),
                quantity: Set(line.quantity),
                unit_price: Set(sellable.unit_price()),
                ..Default::default()
            }
            .insert(conn)
            .await?;
            items.push(item);
        }

        let payment = payment::ActiveModel {
            order_id: Set(order.id),
            method: Set(method),
            status: Set(PaymentStatus::Pending),
            amount: Set(total),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok(OrderDetails {
            order,
            items,
            payment: Some(payment),
        })
    }

    async fn after_commit(&self, details: &OrderDetails) {
        for product_id in details.product_ids() {
            cache::invalidate(self.cache.as_ref(), &keys::product(product_id)).await;
        }
        counter!("orders_placed_total", 1);
        info!(
            "Order {} placed by user {} for {} {}",
            details.order.id, details.order.user_id, details.order.total, details.order.currency
        );
    }

    /// Lists the caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, user_id: i32) -> Result<Vec<OrderDetails>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;

        let order_ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut items_by_order: HashMap<i32, Vec<order_item::Model>> = HashMap::new();
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?
        {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let mut payments: HashMap<i32, payment::Model> = payment::Entity::find()
            .filter(payment::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.order_id, p))
            .collect();

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails {
                items: items_by_order.remove(&order.id).unwrap_or_default(),
                payment: payments.remove(&order.id),
                order,
            })
            .collect())
    }

    /// Fetches one order. Other users' orders are hidden unless the caller is an admin.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub async fn get_order(
        &self,
        caller: &AuthUser,
        order_id: i32,
    ) -> Result<OrderDetails, ServiceError> {
        let order = find_visible_order(&*self.db, caller, order_id).await?;
        load_details(&*self.db, order).await
    }

    /// Cancels a pending order, returning its stock and refunding the payment.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub async fn cancel_order(
        &self,
        caller: &AuthUser,
        order_id: i32,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_visible_order(&txn, caller, order_id).await?;

        // Stock goes back only for the request that wins the pending -> cancelled flip
        if !transition_status(&txn, order.id, OrderStatus::Pending, OrderStatus::Cancelled).await? {
            return Err(ServiceError::BadRequest(format!(
                "Order {} cannot be cancelled in status {}",
                order.id, order.status
            )));
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&txn)
            .await?;
        for item in &items {
            restore_stock(&txn, item).await?;
        }

        let order = fetch_order(&txn, order.id).await?;
        let payment = set_payment_status(&txn, order.id, PaymentStatus::Refunded).await?;
        txn.commit().await?;

        let details = OrderDetails {
            order,
            items,
            payment,
        };
        for product_id in details.product_ids() {
            cache::invalidate(self.cache.as_ref(), &keys::product(product_id)).await;
        }
        info!("Order {} cancelled", details.order.id);
        Ok(details)
    }

    /// Moves an order forward through pending, paid, shipped and delivered.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i32,
        input: UpdateOrderStatusInput,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let from = fetch_order(&txn, order_id).await?.status;
        if !from.can_transition_to(input.status) {
            return Err(ServiceError::BadRequest(format!(
                "Cannot move order {} from {} to {}",
                order_id, from, input.status
            )));
        }

        if !transition_status(&txn, order_id, from, input.status).await? {
            return Err(ServiceError::BadRequest(format!(
                "Order {} changed status concurrently; retry",
                order_id
            )));
        }
        let order = fetch_order(&txn, order_id).await?;

        if input.status == OrderStatus::Paid {
            set_payment_status(&txn, order.id, PaymentStatus::Completed).await?;
        }

        let details = load_details(&txn, order).await?;
        txn.commit().await?;

        info!("Order {} moved from {} to {}", order_id, from, input.status);
        Ok(details)
    }
}

/// Guarded decrement: the update only matches while enough stock is left.
async fn reserve_stock<C: ConnectionTrait>(
    conn: &C,
    sellable: &Sellable,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = match &sellable.variant {
        Some(variant) => {
            product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).sub(quantity),
                )
                .filter(product_variant::Column::Id.eq(variant.id))
                .filter(product_variant::Column::Stock.gte(quantity))
                .exec(conn)
                .await?
        }
        None => {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(quantity),
                )
                .filter(product::Column::Id.eq(sellable.product.id))
                .filter(product::Column::Stock.gte(quantity))
                .exec(conn)
                .await?
        }
    };

    if result.rows_affected == 0 {
        warn!(
            "Stock reservation of {} for product {} failed",
            quantity, sellable.product.id
        );
        return Err(ServiceError::InsufficientStock(sellable.display_name()));
    }
    Ok(())
}

async fn restore_stock<C: ConnectionTrait>(
    conn: &C,
    item: &order_item::Model,
) -> Result<(), ServiceError> {
    match item.variant_id {
        Some(variant_id) => {
            product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).add(item.quantity),
                )
                .filter(product_variant::Column::Id.eq(variant_id))
                .exec(conn)
                .await?;
        }
        None => {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(item.quantity),
                )
                .filter(product::Column::Id.eq(item.product_id))
                .exec(conn)
                .await?;
        }
    }
    Ok(())
}

/// Compare-and-set on the order status. Returns false when the order is no
/// longer in `from`, so concurrent transitions cannot both apply.
async fn transition_status<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool, ServiceError> {
    let result = order::Entity::update_many()
        .set(order::ActiveModel {
            status: Set(to),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(from))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn fetch_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

async fn set_payment_status<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
    status: PaymentStatus,
) -> Result<Option<payment::Model>, ServiceError> {
    let Some(payment) = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let mut active: payment::ActiveModel = payment.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    Ok(Some(active.update(conn).await?))
}

async fn find_visible_order<C: ConnectionTrait>(
    conn: &C,
    caller: &AuthUser,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .filter(|order| order.user_id == caller.user_id || caller.is_admin())
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

async fn load_details<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDetails, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;
    let payment = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .one(conn)
        .await?;
    Ok(OrderDetails {
        order,
        items,
        payment,
    })
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Cod
}

/// Input for placing an order from the cart
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderInput {
    #[serde(default)]
    pub address_id: Option<i32>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
}

/// Input for purchasing one product directly
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BuyNowInput {
    pub product_id: i32,
    #[serde(default)]
    pub variant_id: Option<i32>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
    #[serde(default)]
    pub address_id: Option<i32>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
}

/// Order with its lines and payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub payment: Option<payment::Model>,
}

impl OrderDetails {
    fn product_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.items.iter().map(|item| item.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
