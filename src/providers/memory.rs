//! In-memory store
//!
//! Backs the test-suite and local runs from a JSON seed file. All tables sit
//! behind one lock so multi-table writes (allocation) are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

use crate::core::cross_dock::AllocationPlan;
use crate::models::{
    AppError, AppResult, Customer, Order, Product, ProductSimilarity, PurchaseOrder, Referral,
    SaleLine, SalesOrder, SalesOrderItem, SalesOrderStatus, Supplier, UserFavorite,
    UserInteraction,
};
use crate::providers::store::{tables, AuthAdmin, Store};

/// Full database contents, also the seed file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub products: Vec<Product>,
    pub orders: Vec<Order>,
    pub sales_orders: Vec<SalesOrder>,
    pub sales_order_items: Vec<SalesOrderItem>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub suppliers: Vec<Supplier>,
    pub customers: Vec<Customer>,
    pub referrals: Vec<Referral>,
    pub user_favorites: Vec<UserFavorite>,
    pub user_interactions: Vec<UserInteraction>,
    pub product_similarity: Vec<ProductSimilarity>,
    /// Emails with an auth account (password reset)
    pub auth_users: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Seed>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        Self {
            tables: RwLock::new(seed),
        }
    }

    /// Load a JSON seed file
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let seed: Seed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            products = seed.products.len(),
            sales_orders = seed.sales_orders.len(),
            "memory store seeded"
        );
        Ok(Self::from_seed(seed))
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> AppResult<Seed> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Seed>> {
        self.tables
            .read()
            .map_err(|_| AppError::internal("memory store lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Seed>> {
        self.tables
            .write()
            .map_err(|_| AppError::internal("memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_products(&self) -> AppResult<Vec<Product>> {
        Ok(self.read()?.products.clone())
    }

    async fn get_product(&self, code: &str) -> AppResult<Option<Product>> {
        Ok(self.read()?.products.iter().find(|p| p.code == code).cloned())
    }

    async fn list_suppliers(&self) -> AppResult<Vec<Supplier>> {
        Ok(self.read()?.suppliers.clone())
    }

    async fn count_orders_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> AppResult<u32> {
        let count = self
            .read()?
            .orders
            .iter()
            .filter(|o| o.client_ip == ip && o.created_at >= since)
            .count();
        Ok(count as u32)
    }

    async fn insert_order(&self, order: &Order) -> AppResult<()> {
        self.write()?.orders.push(order.clone());
        Ok(())
    }

    async fn get_sales_order(&self, id: Uuid) -> AppResult<Option<SalesOrder>> {
        Ok(self.read()?.sales_orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_sales_order_items(&self, sales_order_id: Uuid) -> AppResult<Vec<SalesOrderItem>> {
        Ok(self
            .read()?
            .sales_order_items
            .iter()
            .filter(|i| i.sales_order_id == sales_order_id)
            .cloned()
            .collect())
    }

    async fn list_sales_orders_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SalesOrder>> {
        Ok(self
            .read()?
            .sales_orders
            .iter()
            .filter(|o| o.created_at >= since)
            .cloned()
            .collect())
    }

    async fn list_sale_lines_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SaleLine>> {
        let tables = self.read()?;
        let dates: HashMap<Uuid, DateTime<Utc>> = tables
            .sales_orders
            .iter()
            .filter(|o| o.status != SalesOrderStatus::Cancelled && o.created_at >= since)
            .map(|o| (o.id, o.created_at))
            .collect();

        Ok(tables
            .sales_order_items
            .iter()
            .filter_map(|i| {
                dates.get(&i.sales_order_id).map(|sold_at| SaleLine {
                    sales_order_id: i.sales_order_id,
                    product_code: i.product_code.clone(),
                    quantity: i.quantity,
                    sold_at: *sold_at,
                })
            })
            .collect())
    }

    async fn apply_allocation(&self, plan: &AllocationPlan) -> AppResult<()> {
        let mut tables = self.write()?;

        // Validate everything before touching anything
        let order_idx = tables
            .sales_orders
            .iter()
            .position(|o| o.id == plan.sales_order_id)
            .ok_or_else(|| AppError::not_found(format!("Sales order {} not found", plan.sales_order_id)))?;
        if tables.sales_orders[order_idx].status != SalesOrderStatus::Pending {
            return Err(AppError::conflict(format!(
                "Sales order {} is no longer pending",
                plan.sales_order_id
            )));
        }
        for dec in &plan.stock_decrements {
            let product = tables
                .products
                .iter()
                .find(|p| p.code == dec.product_code)
                .ok_or_else(|| AppError::conflict(format!("Product {} disappeared", dec.product_code)))?;
            if i64::from(product.stock) < i64::from(dec.quantity) {
                return Err(AppError::conflict(format!(
                    "Stock for {} changed: {} left, {} needed",
                    dec.product_code, product.stock, dec.quantity
                )));
            }
        }
        for update in &plan.line_updates {
            if !tables.sales_order_items.iter().any(|i| i.id == update.item_id) {
                return Err(AppError::conflict(format!("Line {} disappeared", update.item_id)));
            }
        }

        for dec in &plan.stock_decrements {
            if let Some(product) = tables.products.iter_mut().find(|p| p.code == dec.product_code) {
                product.stock -= dec.quantity as i32;
                product.updated_at = Some(Utc::now());
            }
        }
        tables.purchase_orders.extend(plan.purchase_orders.iter().cloned());
        for update in &plan.line_updates {
            if let Some(item) = tables.sales_order_items.iter_mut().find(|i| i.id == update.item_id) {
                item.allocated = update.allocated;
                item.is_backorder = update.is_backorder;
                item.purchase_order_id = update.purchase_order_id;
            }
        }
        tables.sales_orders[order_idx].status = plan.new_status;

        Ok(())
    }

    async fn list_purchase_orders(&self) -> AppResult<Vec<PurchaseOrder>> {
        Ok(self.read()?.purchase_orders.clone())
    }

    async fn insert_purchase_orders(&self, orders: &[PurchaseOrder]) -> AppResult<()> {
        self.write()?.purchase_orders.extend(orders.iter().cloned());
        Ok(())
    }

    async fn replace_similarities(&self, rows: &[ProductSimilarity]) -> AppResult<()> {
        self.write()?.product_similarity = rows.to_vec();
        Ok(())
    }

    async fn list_similar(&self, code: &str, limit: usize) -> AppResult<Vec<ProductSimilarity>> {
        let mut rows: Vec<ProductSimilarity> = self
            .read()?
            .product_similarity
            .iter()
            .filter(|s| s.product_code == code)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.similar_product_code.cmp(&b.similar_product_code))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_favorites(&self, user_id: &str) -> AppResult<Vec<UserFavorite>> {
        Ok(self
            .read()?
            .user_favorites
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_interactions(&self, user_id: &str) -> AppResult<Vec<UserInteraction>> {
        Ok(self
            .read()?
            .user_interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_interaction(&self, interaction: &UserInteraction) -> AppResult<()> {
        self.write()?.user_interactions.push(interaction.clone());
        Ok(())
    }

    async fn insert_referral(&self, referral: &Referral) -> AppResult<()> {
        let mut tables = self.write()?;
        if tables.referrals.iter().any(|r| r.code == referral.code) {
            return Err(AppError::conflict(format!("Referral code {} already used", referral.code)));
        }
        tables.referrals.push(referral.clone());
        Ok(())
    }

    async fn table_counts(&self) -> AppResult<Vec<(String, u64)>> {
        let t = self.read()?;
        let counts = [
            t.products.len(),
            t.orders.len(),
            t.sales_orders.len(),
            t.sales_order_items.len(),
            t.purchase_orders.len(),
            t.suppliers.len(),
            t.customers.len(),
            t.referrals.len(),
            t.user_favorites.len(),
            t.user_interactions.len(),
            t.product_similarity.len(),
        ];
        Ok(tables::ALL
            .iter()
            .zip(counts)
            .map(|(name, n)| (name.to_string(), n as u64))
            .collect())
    }
}

#[async_trait]
impl AuthAdmin for MemoryStore {
    async fn generate_recovery_link(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> AppResult<Option<String>> {
        let known: HashSet<String> = self
            .read()?
            .auth_users
            .iter()
            .map(|e| e.to_lowercase())
            .collect();
        if !known.contains(&email.to_lowercase()) {
            return Ok(None);
        }
        let base = redirect_to.unwrap_or("http://localhost/reset-password");
        Ok(Some(format!(
            "{}#type=recovery&token={}",
            base,
            Uuid::new_v4().simple()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cross_dock::{LineUpdate, StockDecrement};
    use crate::models::{ErrorCode, OrderStatus, PurchaseOrderStatus};

    fn product(code: &str, stock: i32) -> Product {
        Product {
            code: code.to_string(),
            name: code.to_string(),
            category: "c".to_string(),
            price: 10.0,
            stock,
            is_discontinued: false,
            supplier_id: None,
            lead_time_days: None,
            image_url: None,
            updated_at: None,
        }
    }

    fn seeded() -> (MemoryStore, SalesOrder, SalesOrderItem) {
        let so = SalesOrder {
            id: Uuid::new_v4(),
            customer_id: None,
            status: SalesOrderStatus::Pending,
            total: 20.0,
            created_at: Utc::now(),
        };
        let item = SalesOrderItem {
            id: Uuid::new_v4(),
            sales_order_id: so.id,
            product_code: "A".to_string(),
            quantity: 2,
            unit_price: 10.0,
            is_backorder: false,
            allocated: false,
            purchase_order_id: None,
        };
        let store = MemoryStore::from_seed(Seed {
            products: vec![product("A", 1)],
            sales_orders: vec![so.clone()],
            sales_order_items: vec![item.clone()],
            ..Default::default()
        });
        (store, so, item)
    }

    #[tokio::test]
    async fn test_allocation_is_all_or_nothing() {
        let (store, so, item) = seeded();
        let plan = AllocationPlan {
            sales_order_id: so.id,
            new_status: SalesOrderStatus::Allocated,
            stock_decrements: vec![StockDecrement { product_code: "A".to_string(), quantity: 2 }],
            line_updates: vec![LineUpdate {
                item_id: item.id,
                allocated: true,
                is_backorder: false,
                purchase_order_id: None,
            }],
            purchase_orders: vec![PurchaseOrder {
                id: Uuid::new_v4(),
                supplier_id: None,
                product_code: "A".to_string(),
                quantity: 1,
                status: PurchaseOrderStatus::Draft,
                source_sales_order_id: Some(so.id),
                is_cross_dock: true,
                notes: None,
                created_at: Utc::now(),
            }],
        };

        let err = store.apply_allocation(&plan).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderConflict);

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.products[0].stock, 1);
        assert!(snap.purchase_orders.is_empty());
        assert!(!snap.sales_order_items[0].allocated);
        assert_eq!(snap.sales_orders[0].status, SalesOrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_rate_limit_count_by_ip_and_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (ip, minutes_ago) in [("1.1.1.1", 5), ("1.1.1.1", 90), ("2.2.2.2", 1)] {
            store
                .insert_order(&Order {
                    id: Uuid::new_v4(),
                    customer_name: "Ana".to_string(),
                    phone: "+34 600 000 000".to_string(),
                    email: None,
                    product_code: "A".to_string(),
                    product_name: "A".to_string(),
                    size: None,
                    quantity: 1,
                    unit_price: 10.0,
                    total: 10.0,
                    notes: None,
                    client_ip: ip.to_string(),
                    status: OrderStatus::Pending,
                    created_at: now - chrono::Duration::minutes(minutes_ago),
                })
                .await
                .unwrap();
        }
        let since = now - chrono::Duration::minutes(60);
        assert_eq!(store.count_orders_from_ip_since("1.1.1.1", since).await.unwrap(), 1);
        assert_eq!(store.count_orders_from_ip_since("3.3.3.3", since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recovery_link_only_for_known_users() {
        let store = MemoryStore::from_seed(Seed {
            auth_users: vec!["Ana@Example.com".to_string()],
            ..Default::default()
        });
        let link = store
            .generate_recovery_link("ana@example.com", Some("https://shop.example/reset"))
            .await
            .unwrap();
        assert!(link.unwrap().starts_with("https://shop.example/reset#type=recovery"));
        assert!(store
            .generate_recovery_link("nobody@example.com", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_table_counts_cover_all_tables() {
        let (store, _, _) = seeded();
        let counts = store.table_counts().await.unwrap();
        assert_eq!(counts.len(), tables::ALL.len());
        assert!(counts.contains(&("products".to_string(), 1)));
    }
}
