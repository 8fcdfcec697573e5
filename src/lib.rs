//! Medicomp Library
//!
//! Server side of a storefront for medical compression garments:
//! - Order intake with validation and a per-IP rate limit
//! - Cross-docking allocation of sales orders with automatic backorders
//! - Product similarity and personal recommendations
//! - Demand forecast and reorder points for the back-office
//! - Sitemap, WhatsApp handoff and transactional email

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    allocate_sales_order, compute_similarities, place_order, plan_allocation, AllocationPlan,
    AllocationSummary, OrderReceipt, OrderRequest, Recommendation,
};
pub use models::{AppConfig, AppError, AppResult, ErrorCode};
pub use providers::{AuthAdmin, EmailSender, MemoryStore, Seed, Store, SupabaseClient};
pub use utils::cache::{CacheStats, RecommendationCache};
pub use utils::telemetry::{EventKind, TelemetryCollector, TelemetryEvent, TelemetryStats};
