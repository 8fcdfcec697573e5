//! Back-office KPI board

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{AppError, AppResult, Product, PurchaseOrder, SaleLine, SalesOrder, SalesOrderStatus};
use crate::providers::store::Store;
use crate::utils::constants::LOW_STOCK_THRESHOLD;

pub const DEFAULT_KPI_DAYS: u32 = 30;
const TOP_PRODUCTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProduct {
    pub product_code: String,
    pub units: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub period_days: u32,
    pub revenue: f64,
    pub order_count: usize,
    pub average_order_value: f64,
    pub backordered_orders: usize,
    pub open_purchase_orders: usize,
    pub low_stock_products: Vec<String>,
    pub top_products: Vec<TopProduct>,
}

/// Accepts 1..=365, defaults to 30
pub fn validate_days(days: Option<u32>) -> AppResult<u32> {
    match days.unwrap_or(DEFAULT_KPI_DAYS) {
        d @ 1..=365 => Ok(d),
        d => Err(AppError::bad_request(format!("days must be between 1 and 365, got {}", d))),
    }
}

/// Build the report from already-filtered period data
pub fn build_report(
    period_days: u32,
    orders: &[SalesOrder],
    lines: &[SaleLine],
    products: &[Product],
    purchase_orders: &[PurchaseOrder],
) -> KpiReport {
    let counted: Vec<&SalesOrder> = orders
        .iter()
        .filter(|o| o.status != SalesOrderStatus::Cancelled)
        .collect();
    let counted_ids: HashSet<_> = counted.iter().map(|o| o.id).collect();
    let revenue = (counted.iter().map(|o| o.total).sum::<f64>() * 100.0).round() / 100.0;
    let order_count = counted.len();
    let average_order_value = if order_count > 0 {
        (revenue / order_count as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let mut units: HashMap<&str, u64> = HashMap::new();
    for line in lines.iter().filter(|l| counted_ids.contains(&l.sales_order_id)) {
        *units.entry(line.product_code.as_str()).or_insert(0) += u64::from(line.quantity);
    }
    let mut top_products: Vec<TopProduct> = units
        .into_iter()
        .map(|(code, units)| TopProduct {
            product_code: code.to_string(),
            units,
        })
        .collect();
    top_products.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.product_code.cmp(&b.product_code)));
    top_products.truncate(TOP_PRODUCTS);

    let mut low_stock_products: Vec<String> = products
        .iter()
        .filter(|p| !p.is_discontinued && p.stock <= LOW_STOCK_THRESHOLD)
        .map(|p| p.code.clone())
        .collect();
    low_stock_products.sort();

    KpiReport {
        period_days,
        revenue,
        order_count,
        average_order_value,
        backordered_orders: counted
            .iter()
            .filter(|o| o.status == SalesOrderStatus::Backordered)
            .count(),
        open_purchase_orders: purchase_orders.iter().filter(|po| po.is_open()).count(),
        low_stock_products,
        top_products,
    }
}

pub async fn load_report(store: &dyn Store, days: u32, now: DateTime<Utc>) -> AppResult<KpiReport> {
    let since = now - chrono::Duration::days(i64::from(days));
    let orders = store.list_sales_orders_since(since).await?;
    let lines = store.list_sale_lines_since(since).await?;
    let products = store.list_products().await?;
    let purchase_orders = store.list_purchase_orders().await?;
    Ok(build_report(days, &orders, &lines, &products, &purchase_orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn order(total: f64, status: SalesOrderStatus) -> SalesOrder {
        SalesOrder {
            id: Uuid::new_v4(),
            customer_id: None,
            status,
            total,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_days_bounds() {
        assert_eq!(validate_days(None).unwrap(), 30);
        assert_eq!(validate_days(Some(365)).unwrap(), 365);
        assert!(validate_days(Some(0)).is_err());
        assert!(validate_days(Some(366)).is_err());
    }

    #[test]
    fn test_report_ignores_cancelled_orders() {
        let a = order(100.0, SalesOrderStatus::Allocated);
        let b = order(50.0, SalesOrderStatus::Backordered);
        let c = order(999.0, SalesOrderStatus::Cancelled);
        let lines = vec![
            SaleLine { sales_order_id: a.id, product_code: "X".to_string(), quantity: 2, sold_at: Utc::now() },
            SaleLine { sales_order_id: b.id, product_code: "Y".to_string(), quantity: 5, sold_at: Utc::now() },
            SaleLine { sales_order_id: c.id, product_code: "Z".to_string(), quantity: 9, sold_at: Utc::now() },
        ];
        let report = build_report(30, &[a, b, c], &lines, &[], &[]);

        assert_eq!(report.revenue, 150.0);
        assert_eq!(report.order_count, 2);
        assert_eq!(report.average_order_value, 75.0);
        assert_eq!(report.backordered_orders, 1);
        assert_eq!(report.top_products[0].product_code, "Y");
        assert_eq!(report.top_products.len(), 2);
    }
}
