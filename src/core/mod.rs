//! Core Module - Business logic
//!
//! Pure calculators plus the thin async flows that feed them from a `Store`.

pub mod catalog;
pub mod cross_dock;
pub mod forecast;
pub mod intake;
pub mod kpi;
pub mod notifications;
pub mod recommend;
pub mod reorder;
pub mod similarity;
pub mod sitemap;
pub mod whatsapp;

pub use cross_dock::{allocate_sales_order, plan_allocation, AllocationPlan, AllocationSummary};
pub use intake::{place_order, OrderReceipt, OrderRequest};
pub use recommend::Recommendation;
pub use similarity::compute_similarities;
