//! Domain records
//!
//! Flat rows as they live in the hosted database. References between tables
//! are plain strings (`product_code`) or UUIDs; field names match the column
//! names so rows deserialize straight from the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Catalog
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog code, referenced as `product_code` everywhere else
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub is_discontinued: bool,
    #[serde(default)]
    pub supplier_id: Option<String>,
    /// Overrides the supplier's lead time when set
    #[serde(default)]
    pub lead_time_days: Option<u32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Sellable from the storefront right now
    pub fn is_available(&self) -> bool {
        self.stock > 0 && !self.is_discontinued
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub lead_time_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

// ============================================
// Storefront orders
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Order placed from the storefront order modal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub product_code: String,
    pub product_name: String,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    pub total: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub client_ip: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Back-office: sales & purchasing
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    Pending,
    Allocated,
    Backordered,
    Shipped,
    Cancelled,
}

impl SalesOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Allocated => "allocated",
            Self::Backordered => "backordered",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: Uuid,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    pub status: SalesOrderStatus,
    #[serde(default)]
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub id: Uuid,
    pub sales_order_id: Uuid,
    pub product_code: String,
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub is_backorder: bool,
    #[serde(default)]
    pub allocated: bool,
    #[serde(default)]
    pub purchase_order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Sent,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "received" => Some(Self::Received),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    #[serde(default)]
    pub supplier_id: Option<String>,
    pub product_code: String,
    pub quantity: u32,
    pub status: PurchaseOrderStatus,
    /// Sales order this PO was raised for (cross-docking)
    #[serde(default)]
    pub source_sales_order_id: Option<Uuid>,
    /// Supplier ships straight to the end customer
    #[serde(default)]
    pub is_cross_dock: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Still waiting on the supplier
    pub fn is_open(&self) -> bool {
        matches!(self.status, PurchaseOrderStatus::Draft | PurchaseOrderStatus::Sent)
    }
}

/// One sold line with the date of its sales order (read model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    pub sales_order_id: Uuid,
    pub product_code: String,
    pub quantity: u32,
    pub sold_at: DateTime<Utc>,
}

// ============================================
// Engagement
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub code: String,
    pub referrer_name: String,
    pub referrer_email: String,
    pub referred_name: String,
    #[serde(default)]
    pub referred_email: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFavorite {
    pub user_id: String,
    pub product_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    AddToCart,
    Favorite,
    Purchase,
}

impl InteractionKind {
    /// Seed weight used by personal recommendations
    pub fn weight(&self) -> f64 {
        match self {
            Self::View => 1.0,
            Self::AddToCart => 2.0,
            Self::Favorite => 3.0,
            Self::Purchase => 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInteraction {
    pub user_id: String,
    pub product_code: String,
    pub kind: InteractionKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSimilarity {
    pub product_code: String,
    pub similar_product_code: String,
    /// Always within [0, 1]
    pub score: f64,
    pub computed_at: DateTime<Utc>,
}
