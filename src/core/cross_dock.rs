//! Cross-docking allocator
//!
//! Walks the lines of a pending sales order against current stock. Lines that
//! can be served are allocated and their stock reserved; lines that cannot
//! are flagged as backorders and get a draft purchase order so the supplier
//! ships straight to the customer.
//!
//! Planning is pure. The resulting [`AllocationPlan`] is handed to
//! [`Store::apply_allocation`], which applies all of it or nothing, so a
//! failure halfway can no longer leave stock decremented without the
//! matching purchase orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    AppError, AppResult, Product, PurchaseOrder, PurchaseOrderStatus, SalesOrder, SalesOrderItem,
    SalesOrderStatus,
};
use crate::providers::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDecrement {
    pub product_code: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub item_id: Uuid,
    pub allocated: bool,
    pub is_backorder: bool,
    #[serde(default)]
    pub purchase_order_id: Option<Uuid>,
}

/// Every write one allocation needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub sales_order_id: Uuid,
    pub new_status: SalesOrderStatus,
    /// One entry per product, quantities summed across lines
    pub stock_decrements: Vec<StockDecrement>,
    pub line_updates: Vec<LineUpdate>,
    pub purchase_orders: Vec<PurchaseOrder>,
}

impl AllocationPlan {
    pub fn allocated_lines(&self) -> usize {
        self.line_updates.iter().filter(|l| l.allocated).count()
    }

    pub fn backordered_lines(&self) -> usize {
        self.line_updates.iter().filter(|l| l.is_backorder).count()
    }

    pub fn summary(&self) -> AllocationSummary {
        AllocationSummary {
            sales_order_id: self.sales_order_id,
            status: self.new_status,
            allocated_lines: self.allocated_lines(),
            backordered_lines: self.backordered_lines(),
            purchase_orders: self.purchase_orders.iter().map(|po| po.id).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSummary {
    pub sales_order_id: Uuid,
    pub status: SalesOrderStatus,
    pub allocated_lines: usize,
    pub backordered_lines: usize,
    pub purchase_orders: Vec<Uuid>,
}

/// Build the allocation plan for one sales order
pub fn plan_allocation(
    order: &SalesOrder,
    items: &[SalesOrderItem],
    products: &[Product],
    now: DateTime<Utc>,
) -> AppResult<AllocationPlan> {
    if order.status != SalesOrderStatus::Pending {
        return Err(AppError::conflict(format!(
            "Sales order {} is {}, only pending orders can be allocated",
            order.id,
            order.status.as_str()
        )));
    }

    let catalog: HashMap<&str, &Product> = products.iter().map(|p| (p.code.as_str(), p)).collect();
    // Stock still free after the lines planned so far
    let mut remaining: HashMap<&str, i64> = HashMap::new();
    let mut decrements: Vec<StockDecrement> = Vec::new();
    let mut line_updates = Vec::new();
    let mut purchase_orders = Vec::new();
    let mut any_backorder = false;

    for item in items.iter().filter(|i| i.sales_order_id == order.id) {
        if item.is_backorder {
            any_backorder = true;
            continue;
        }
        if item.allocated {
            continue;
        }

        let product = catalog.get(item.product_code.as_str()).copied();
        let available = match product {
            Some(p) => *remaining
                .entry(p.code.as_str())
                .or_insert_with(|| i64::from(p.stock.max(0))),
            None => 0,
        };

        if product.is_some() && available >= i64::from(item.quantity) {
            if let Some(p) = product {
                remaining.insert(p.code.as_str(), available - i64::from(item.quantity));
                if item.quantity > 0 {
                    match decrements.iter_mut().find(|d| d.product_code == p.code) {
                        Some(d) => d.quantity += item.quantity,
                        None => decrements.push(StockDecrement {
                            product_code: p.code.clone(),
                            quantity: item.quantity,
                        }),
                    }
                }
            }
            line_updates.push(LineUpdate {
                item_id: item.id,
                allocated: true,
                is_backorder: false,
                purchase_order_id: None,
            });
            continue;
        }

        if product.is_none() {
            warn!(product_code = %item.product_code, sales_order = %order.id, "line references unknown product, backordering");
        }

        let po = PurchaseOrder {
            id: Uuid::new_v4(),
            supplier_id: product.and_then(|p| p.supplier_id.clone()),
            product_code: item.product_code.clone(),
            quantity: item.quantity,
            status: PurchaseOrderStatus::Draft,
            source_sales_order_id: Some(order.id),
            is_cross_dock: true,
            notes: Some(format!(
                "Cross-dock for sales order {} (line {}), {} in stock",
                order.id, item.id, available
            )),
            created_at: now,
        };
        line_updates.push(LineUpdate {
            item_id: item.id,
            allocated: false,
            is_backorder: true,
            purchase_order_id: Some(po.id),
        });
        purchase_orders.push(po);
        any_backorder = true;
    }

    Ok(AllocationPlan {
        sales_order_id: order.id,
        new_status: if any_backorder {
            SalesOrderStatus::Backordered
        } else {
            SalesOrderStatus::Allocated
        },
        stock_decrements: decrements,
        line_updates,
        purchase_orders,
    })
}

/// Load, plan and atomically apply the allocation of one sales order
pub async fn allocate_sales_order(
    store: &dyn Store,
    sales_order_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<AllocationSummary> {
    let order = store
        .get_sales_order(sales_order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Sales order {} not found", sales_order_id)))?;

    let items = store.list_sales_order_items(sales_order_id).await?;
    if items.is_empty() {
        return Err(AppError::bad_request(format!(
            "Sales order {} has no items",
            sales_order_id
        )));
    }

    let products = store.list_products().await?;
    let plan = plan_allocation(&order, &items, &products, now)?;
    store.apply_allocation(&plan).await?;

    let summary = plan.summary();
    info!(
        sales_order = %sales_order_id,
        status = summary.status.as_str(),
        allocated = summary.allocated_lines,
        backordered = summary.backordered_lines,
        purchase_orders = summary.purchase_orders.len(),
        "sales order allocated"
    );
    Ok(summary)
}
