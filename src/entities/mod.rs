//! sea-orm entities, one module per table.

pub mod address;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod review;
pub mod user;
pub mod wishlist;

pub use order::OrderStatus;
pub use payment::{PaymentMethod, PaymentStatus};
pub use user::Role;
