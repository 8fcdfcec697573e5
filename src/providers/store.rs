//! Storage seam
//!
//! Every handler talks to the database through these traits so the same
//! logic runs against the hosted platform or the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::cross_dock::AllocationPlan;
use crate::models::{
    AppResult, Order, Product, ProductSimilarity, PurchaseOrder, Referral, SaleLine, SalesOrder,
    SalesOrderItem, Supplier, UserFavorite, UserInteraction,
};

/// Table names as they exist in the database
pub mod tables {
    pub const PRODUCTS: &str = "products";
    pub const ORDERS: &str = "orders";
    pub const SALES_ORDERS: &str = "sales_orders";
    pub const SALES_ORDER_ITEMS: &str = "sales_order_items";
    pub const PURCHASE_ORDERS: &str = "purchase_orders";
    pub const SUPPLIERS: &str = "suppliers";
    pub const CUSTOMERS: &str = "customers";
    pub const REFERRALS: &str = "referrals";
    pub const USER_FAVORITES: &str = "user_favorites";
    pub const USER_INTERACTIONS: &str = "user_interactions";
    pub const PRODUCT_SIMILARITY: &str = "product_similarity";

    pub const ALL: [&str; 11] = [
        PRODUCTS,
        ORDERS,
        SALES_ORDERS,
        SALES_ORDER_ITEMS,
        PURCHASE_ORDERS,
        SUPPLIERS,
        CUSTOMERS,
        REFERRALS,
        USER_FAVORITES,
        USER_INTERACTIONS,
        PRODUCT_SIMILARITY,
    ];
}

#[async_trait]
pub trait Store: Send + Sync {
    // Catalog
    async fn list_products(&self) -> AppResult<Vec<Product>>;
    async fn get_product(&self, code: &str) -> AppResult<Option<Product>>;
    async fn list_suppliers(&self) -> AppResult<Vec<Supplier>>;

    // Storefront orders
    /// Orders placed from `ip` at or after `since`. One round trip.
    async fn count_orders_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> AppResult<u32>;
    async fn insert_order(&self, order: &Order) -> AppResult<()>;

    // Sales / purchasing
    async fn get_sales_order(&self, id: Uuid) -> AppResult<Option<SalesOrder>>;
    async fn list_sales_order_items(&self, sales_order_id: Uuid) -> AppResult<Vec<SalesOrderItem>>;
    async fn list_sales_orders_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SalesOrder>>;
    /// Lines of non-cancelled sales orders created at or after `since`
    async fn list_sale_lines_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SaleLine>>;
    /// Applies every write of the plan or none of them
    async fn apply_allocation(&self, plan: &AllocationPlan) -> AppResult<()>;
    async fn list_purchase_orders(&self) -> AppResult<Vec<PurchaseOrder>>;
    async fn insert_purchase_orders(&self, orders: &[PurchaseOrder]) -> AppResult<()>;

    // Recommendations
    /// Delete every stored pair, then insert `rows`
    async fn replace_similarities(&self, rows: &[ProductSimilarity]) -> AppResult<()>;
    async fn list_similar(&self, code: &str, limit: usize) -> AppResult<Vec<ProductSimilarity>>;
    async fn list_favorites(&self, user_id: &str) -> AppResult<Vec<UserFavorite>>;
    async fn list_interactions(&self, user_id: &str) -> AppResult<Vec<UserInteraction>>;
    async fn insert_interaction(&self, interaction: &UserInteraction) -> AppResult<()>;

    // Engagement
    async fn insert_referral(&self, referral: &Referral) -> AppResult<()>;

    /// Row count per table, for inspection
    async fn table_counts(&self) -> AppResult<Vec<(String, u64)>>;
}

/// Auth admin surface of the hosted platform
#[async_trait]
pub trait AuthAdmin: Send + Sync {
    /// Password recovery link for `email`; `None` when no such account exists
    async fn generate_recovery_link(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> AppResult<Option<String>>;
}
