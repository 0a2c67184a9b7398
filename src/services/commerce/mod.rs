//! Catalog, cart, wishlist, review and order services.

use crate::{
    entities::{product, product_variant},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, EntityTrait};

pub mod cart_service;
pub mod category_service;
pub mod order_service;
pub mod product_catalog_service;
pub mod review_service;
pub mod wishlist_service;

pub use cart_service::{AddToCartInput, CartLine, CartService, CartView, UpdateCartItemInput};
pub use category_service::{CategoryService, CreateCategoryInput};
pub use order_service::{
    BuyNowInput, OrderDetails, OrderService, PlaceOrderInput, UpdateOrderStatusInput,
};
pub use product_catalog_service::{
    CreateProductInput, CreateVariantInput, ProductCatalogService, ProductDetails,
    ProductSearchQuery, ProductSearchResult, UpdateProductInput,
};
pub use review_service::{CreateReviewInput, ReviewService};
pub use wishlist_service::{AddToWishlistInput, WishlistEntry, WishlistService};

/// A purchasable product, optionally narrowed to one of its variants.
#[derive(Debug, Clone)]
pub(crate) struct Sellable {
    pub product: product::Model,
    pub variant: Option<product_variant::Model>,
}

impl Sellable {
    pub fn unit_price(&self) -> Decimal {
        match &self.variant {
            Some(variant) => variant.effective_price(self.product.price),
            None => self.product.price,
        }
    }

    /// Stock pool the line draws from: the variant's when one is chosen
    pub fn available_stock(&self) -> i32 {
        match &self.variant {
            Some(variant) => variant.stock,
            None => self.product.stock,
        }
    }

    pub fn display_name(&self) -> String {
        display_name(&self.product, self.variant.as_ref())
    }
}

pub(crate) fn display_name(
    product: &product::Model,
    variant: Option<&product_variant::Model>,
) -> String {
    match variant {
        Some(variant) => format!("{} ({})", product.name, variant.name),
        None => product.name.clone(),
    }
}

/// Loads an active product and, if requested, one of its variants.
pub(crate) async fn load_sellable<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    variant_id: Option<i32>,
) -> Result<Sellable, ServiceError> {
    let product = product::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let variant = match variant_id {
        Some(variant_id) => {
            let variant = product_variant::Entity::find_by_id(variant_id)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Variant {} not found", variant_id))
                })?;
            if variant.product_id != product.id {
                return Err(ServiceError::BadRequest(format!(
                    "Variant {} does not belong to product {}",
                    variant_id, product.id
                )));
            }
            Some(variant)
        }
        None => None,
    };

    Ok(Sellable { product, variant })
}

/// URL slug: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub(crate) fn validate_non_negative_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = validator::ValidationError::new("price");
        err.message = Some("price must not be negative".into());
        return Err(err);
    }
    Ok(())
}
