//! Reorder-point calculator
//!
//! rop = ceil(daily_forecast × lead_time) + safety_stock, with
//! safety_stock = ceil(z × σ_daily × √lead_time).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

use crate::core::forecast::{ceil_units, daily_series, forecast_from_series, std_dev};
use crate::models::{
    AppResult, Product, PurchaseOrder, PurchaseOrderStatus, SaleLine, Supplier,
};
use crate::providers::store::Store;
use crate::utils::constants::{
    DEFAULT_LEAD_TIME_DAYS, FORECAST_WINDOW_DAYS, REVIEW_PERIOD_DAYS, SAFETY_STOCK_Z,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderSuggestion {
    pub product_code: String,
    pub name: String,
    pub supplier_id: Option<String>,
    pub stock: i32,
    pub lead_time_days: u32,
    pub daily_forecast: f64,
    pub safety_stock: u32,
    pub reorder_point: u32,
    pub needs_reorder: bool,
    /// 0 unless `needs_reorder`
    pub suggested_quantity: u32,
}

/// Product override, then supplier, then the default
pub fn lead_time_for(product: &Product, suppliers: &HashMap<&str, &Supplier>) -> u32 {
    product
        .lead_time_days
        .or_else(|| {
            product
                .supplier_id
                .as_deref()
                .and_then(|id| suppliers.get(id))
                .and_then(|s| s.lead_time_days)
        })
        .unwrap_or(DEFAULT_LEAD_TIME_DAYS)
}

pub fn safety_stock(sigma_daily: f64, lead_time_days: u32) -> u32 {
    ceil_units(SAFETY_STOCK_Z * sigma_daily * f64::from(lead_time_days).sqrt())
}

pub fn reorder_point(daily_forecast: f64, lead_time_days: u32, safety: u32) -> u32 {
    ceil_units(daily_forecast * f64::from(lead_time_days)) + safety
}

/// Suggestion for one product from its daily series
pub fn suggest(product: &Product, series: &[f64], lead_time_days: u32) -> ReorderSuggestion {
    let forecast = forecast_from_series(product, series);
    let daily = forecast.daily_forecast;
    let safety = safety_stock(std_dev(series), lead_time_days);
    let rop = reorder_point(daily, lead_time_days, safety);

    let has_signal = daily > 0.0 || rop > 0;
    let needs_reorder = has_signal && i64::from(product.stock) <= i64::from(rop);
    let suggested_quantity = if needs_reorder {
        let target = i64::from(ceil_units(daily * REVIEW_PERIOD_DAYS)) + i64::from(rop);
        (target - i64::from(product.stock)).max(1) as u32
    } else {
        0
    };

    ReorderSuggestion {
        product_code: product.code.clone(),
        name: product.name.clone(),
        supplier_id: product.supplier_id.clone(),
        stock: product.stock,
        lead_time_days,
        daily_forecast: daily,
        safety_stock: safety,
        reorder_point: rop,
        needs_reorder,
        suggested_quantity,
    }
}

/// Suggestions for every active product, reorders first
pub fn suggest_all(
    products: &[Product],
    suppliers: &[Supplier],
    lines: &[SaleLine],
    now: DateTime<Utc>,
) -> Vec<ReorderSuggestion> {
    let today = now.date_naive();
    let suppliers: HashMap<&str, &Supplier> = suppliers.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut out: Vec<ReorderSuggestion> = products
        .iter()
        .filter(|p| !p.is_discontinued)
        .map(|p| {
            let series = daily_series(lines, &p.code, today);
            suggest(p, &series, lead_time_for(p, &suppliers))
        })
        .collect();
    out.sort_by(|a, b| {
        b.needs_reorder
            .cmp(&a.needs_reorder)
            .then_with(|| b.suggested_quantity.cmp(&a.suggested_quantity))
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
    out
}

/// Load what the calculator needs from the store
pub async fn load_suggestions(store: &dyn Store, now: DateTime<Utc>) -> AppResult<Vec<ReorderSuggestion>> {
    let products = store.list_products().await?;
    let suppliers = store.list_suppliers().await?;
    let lines = store
        .list_sale_lines_since(now - chrono::Duration::days(FORECAST_WINDOW_DAYS as i64))
        .await?;
    Ok(suggest_all(&products, &suppliers, &lines, now))
}

/// Draft purchase orders for products that need one and have none open
pub fn draft_orders(
    suggestions: &[ReorderSuggestion],
    open: &[PurchaseOrder],
    now: DateTime<Utc>,
) -> Vec<PurchaseOrder> {
    let covered: HashSet<&str> = open
        .iter()
        .filter(|po| po.is_open())
        .map(|po| po.product_code.as_str())
        .collect();

    suggestions
        .iter()
        .filter(|s| s.needs_reorder && !covered.contains(s.product_code.as_str()))
        .map(|s| PurchaseOrder {
            id: Uuid::new_v4(),
            supplier_id: s.supplier_id.clone(),
            product_code: s.product_code.clone(),
            quantity: s.suggested_quantity,
            status: PurchaseOrderStatus::Draft,
            source_sales_order_id: None,
            is_cross_dock: false,
            notes: Some(format!(
                "Reorder: stock {} at or below reorder point {}",
                s.stock, s.reorder_point
            )),
            created_at: now,
        })
        .collect()
}

/// Compute and store reorder drafts; returns the new purchase orders
pub async fn create_drafts(store: &dyn Store, now: DateTime<Utc>) -> AppResult<Vec<PurchaseOrder>> {
    let suggestions = load_suggestions(store, now).await?;
    let existing = store.list_purchase_orders().await?;
    let drafts = draft_orders(&suggestions, &existing, now);
    if !drafts.is_empty() {
        store.insert_purchase_orders(&drafts).await?;
    }
    info!(drafts = drafts.len(), "reorder drafts created");
    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(code: &str, stock: i32) -> Product {
        Product {
            code: code.to_string(),
            name: code.to_string(),
            category: String::new(),
            price: 10.0,
            stock,
            is_discontinued: false,
            supplier_id: Some("S1".to_string()),
            lead_time_days: None,
            image_url: None,
            updated_at: None,
        }
    }

    fn supplier(lead: Option<u32>) -> Supplier {
        Supplier {
            id: "S1".to_string(),
            name: "Supplier".to_string(),
            email: None,
            lead_time_days: lead,
        }
    }

    #[test]
    fn test_lead_time_precedence() {
        let s = supplier(Some(21));
        let map: HashMap<&str, &Supplier> = [("S1", &s)].into_iter().collect();

        let mut p = product("A", 0);
        assert_eq!(lead_time_for(&p, &map), 21);
        p.lead_time_days = Some(5);
        assert_eq!(lead_time_for(&p, &map), 5);
        p.lead_time_days = None;
        p.supplier_id = None;
        assert_eq!(lead_time_for(&p, &map), DEFAULT_LEAD_TIME_DAYS);
    }

    #[test]
    fn test_flat_demand_reorder_point() {
        // 1 unit/day, no variance, 14 day lead
        let s = suggest(&product("A", 10), &[1.0; 30], 14);
        assert_eq!(s.safety_stock, 0);
        assert_eq!(s.reorder_point, 14);
        assert!(s.needs_reorder);
        // 30 days of demand + rop - stock
        assert_eq!(s.suggested_quantity, 34);
    }

    #[test]
    fn test_safety_stock_formula() {
        // 1.65 × 2 × √9 = 9.9
        assert_eq!(safety_stock(2.0, 9), 10);
        assert_eq!(safety_stock(0.0, 14), 0);
    }

    #[test]
    fn test_no_demand_no_reorder() {
        let s = suggest(&product("A", 0), &[0.0; 30], 14);
        assert!(!s.needs_reorder);
        assert_eq!(s.suggested_quantity, 0);
    }

    #[test]
    fn test_well_stocked_no_reorder() {
        let s = suggest(&product("A", 500), &[1.0; 30], 14);
        assert!(!s.needs_reorder);
    }

    #[test]
    fn test_drafts_skip_products_with_open_po() {
        let now = Utc::now();
        let a = suggest(&product("A", 0), &[1.0; 30], 14);
        let b = suggest(&product("B", 0), &[1.0; 30], 14);
        let open = PurchaseOrder {
            id: Uuid::new_v4(),
            supplier_id: None,
            product_code: "A".to_string(),
            quantity: 3,
            status: PurchaseOrderStatus::Sent,
            source_sales_order_id: None,
            is_cross_dock: false,
            notes: None,
            created_at: now,
        };
        let drafts = draft_orders(&[a, b], &[open], now);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].product_code, "B");
        assert!(!drafts[0].is_cross_dock);
        assert_eq!(drafts[0].status, PurchaseOrderStatus::Draft);
    }
}
