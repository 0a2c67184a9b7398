//! Cache key builders. Every cached value lives under one of these.

pub const CATEGORIES_ALL: &str = "categories:all";

pub fn cart(user_id: i32) -> String {
    format!("cart:{user_id}")
}

pub fn wishlist(user_id: i32) -> String {
    format!("wishlist:{user_id}")
}

pub fn product(product_id: i32) -> String {
    format!("product:{product_id}")
}
