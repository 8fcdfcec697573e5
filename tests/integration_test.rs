//! Integration tests for the core flows over the in-memory store

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use medicomp::core::{forecast, recommend, reorder, similarity};
use medicomp::models::{
    InteractionKind, Product, SaleLine, SalesOrder, SalesOrderItem, SalesOrderStatus, UserFavorite,
};
use medicomp::providers::{MemoryStore, Seed, Store};
use medicomp::{allocate_sales_order, compute_similarities, AppConfig, ErrorCode};

fn product(code: &str, category: &str, price: f64, stock: i32) -> Product {
    Product {
        code: code.to_string(),
        name: format!("Garment {}", code),
        category: category.to_string(),
        price,
        stock,
        is_discontinued: false,
        supplier_id: None,
        lead_time_days: None,
        image_url: None,
        updated_at: None,
    }
}

/// One sales order per basket, `days_ago` apart
fn orders(baskets: &[(&[&str], i64)]) -> (Vec<SalesOrder>, Vec<SalesOrderItem>) {
    let now = Utc::now();
    let mut sales = Vec::new();
    let mut items = Vec::new();
    for (codes, days_ago) in baskets {
        let id = Uuid::new_v4();
        sales.push(SalesOrder {
            id,
            customer_id: None,
            status: SalesOrderStatus::Shipped,
            total: 0.0,
            created_at: now - Duration::days(*days_ago),
        });
        for code in codes.iter() {
            items.push(SalesOrderItem {
                id: Uuid::new_v4(),
                sales_order_id: id,
                product_code: code.to_string(),
                quantity: 1,
                unit_price: 40.0,
                is_backorder: false,
                allocated: true,
                purchase_order_id: None,
            });
        }
    }
    (sales, items)
}

#[test]
fn test_similarity_never_pairs_self_and_stays_in_range() {
    let mut rng = StdRng::seed_from_u64(7);
    let categories = ["stockings", "sleeves", "gloves"];
    let products: Vec<Product> = (0..40)
        .map(|i| {
            product(
                &format!("MC-{:03}", i),
                categories[i % categories.len()],
                rng.gen_range(10.0..200.0),
                rng.gen_range(0..20),
            )
        })
        .collect();

    let now = Utc::now();
    let lines: Vec<SaleLine> = (0..120)
        .flat_map(|_| {
            let order = Uuid::new_v4();
            let size = rng.gen_range(1..4);
            (0..size)
                .map(|_| SaleLine {
                    sales_order_id: order,
                    product_code: format!("MC-{:03}", rng.gen_range(0..40)),
                    quantity: rng.gen_range(1..3),
                    sold_at: now,
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let pairs = compute_similarities(&products, &lines, now);
    assert!(!pairs.is_empty());
    for pair in &pairs {
        assert_ne!(pair.product_code, pair.similar_product_code, "self pair emitted");
        assert!((0.0..=1.0).contains(&pair.score), "score out of range: {}", pair.score);
    }

    // Symmetric
    for pair in &pairs {
        assert!(pairs
            .iter()
            .any(|p| p.product_code == pair.similar_product_code && p.similar_product_code == pair.product_code));
    }
}

#[tokio::test]
async fn test_recompute_then_recommend_for_user() {
    let (sales_orders, sales_order_items) = orders(&[
        (&["MC-1", "MC-2"], 1),
        (&["MC-1", "MC-2"], 3),
        (&["MC-1", "MC-3"], 5),
    ]);
    let store = MemoryStore::from_seed(Seed {
        products: vec![
            product("MC-1", "stockings", 45.0, 5),
            product("MC-2", "stockings", 48.0, 5),
            product("MC-3", "gloves", 90.0, 5),
        ],
        sales_orders,
        sales_order_items,
        user_favorites: vec![UserFavorite {
            user_id: "user-1".to_string(),
            product_code: "MC-1".to_string(),
            created_at: Utc::now(),
        }],
        ..Seed::default()
    });

    let run = similarity::recompute(&store, None, Utc::now()).await.unwrap();
    assert_eq!(run.products, 3);
    assert!(run.pairs > 0);

    let recs = recommend::for_user(&store, "user-1", None).await.unwrap();
    assert!(!recs.is_empty());
    assert_eq!(recs[0].product_code, "MC-2");
    assert!(recs.iter().all(|r| r.product_code != "MC-1"));

    // Recorded interactions feed the next recommendation
    let req = recommend::InteractionRequest {
        user_id: "user-1".to_string(),
        product_code: "MC-3".to_string(),
        kind: InteractionKind::Purchase,
    };
    recommend::record_interaction(&store, &req, Utc::now()).await.unwrap();
    assert_eq!(store.list_interactions("user-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_forecast_and_reorder_from_store() {
    let baskets: Vec<(&[&str], i64)> = (0..10).map(|d| (&["MC-1"] as &[&str], d)).collect();
    let (sales_orders, sales_order_items) = orders(&baskets);
    let store = MemoryStore::from_seed(Seed {
        products: vec![product("MC-1", "stockings", 45.0, 2), product("MC-2", "sleeves", 30.0, 50)],
        sales_orders,
        sales_order_items,
        ..Seed::default()
    });

    let now = Utc::now();
    let forecasts = forecast::load_forecasts(&store, now).await.unwrap();
    assert_eq!(forecasts.len(), 2);
    assert_eq!(forecasts[0].product_code, "MC-1");
    assert!(forecasts[0].daily_forecast > 0.0);
    assert_eq!(forecasts[1].daily_forecast, 0.0);

    let suggestions = reorder::load_suggestions(&store, now).await.unwrap();
    let mc1 = suggestions.iter().find(|s| s.product_code == "MC-1").unwrap();
    assert!(mc1.needs_reorder);
    assert!(mc1.suggested_quantity >= 1);
    assert!(!suggestions.iter().find(|s| s.product_code == "MC-2").unwrap().needs_reorder);

    let drafts = reorder::create_drafts(&store, now).await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert!(!drafts[0].is_cross_dock);

    // An open draft blocks the next run
    assert!(reorder::create_drafts(&store, now).await.unwrap().is_empty());
    assert_eq!(store.list_purchase_orders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_allocation_accumulates_per_product() {
    let order_id = Uuid::new_v4();
    let line = |quantity| SalesOrderItem {
        id: Uuid::new_v4(),
        sales_order_id: order_id,
        product_code: "MC-1".to_string(),
        quantity,
        unit_price: 45.0,
        is_backorder: false,
        allocated: false,
        purchase_order_id: None,
    };
    let store = MemoryStore::from_seed(Seed {
        products: vec![product("MC-1", "stockings", 45.0, 5)],
        sales_orders: vec![SalesOrder {
            id: order_id,
            customer_id: None,
            status: SalesOrderStatus::Pending,
            total: 0.0,
            created_at: Utc::now(),
        }],
        sales_order_items: vec![line(3), line(3)],
        ..Seed::default()
    });

    let summary = allocate_sales_order(&store, order_id, Utc::now()).await.unwrap();
    assert_eq!(summary.allocated_lines, 1);
    assert_eq!(summary.backordered_lines, 1);
    assert_eq!(summary.status, SalesOrderStatus::Backordered);

    let tables = store.snapshot().unwrap();
    assert_eq!(tables.products[0].stock, 2);
    assert_eq!(tables.purchase_orders.len(), 1);
    assert_eq!(tables.purchase_orders[0].quantity, 3);

    let err = allocate_sales_order(&store, order_id, Utc::now()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::OrderConflict);
}

#[test]
fn test_config_from_lookup() {
    let env = |key: &str| match key {
        "MEDICOMP_SEED_FILE" => Some("seed.json".to_string()),
        "PORT" => Some("9000".to_string()),
        "ORDER_RATE_LIMIT" => Some("3".to_string()),
        _ => None,
    };
    let config = AppConfig::from_lookup(env).unwrap();
    assert_eq!(config.port, 9000);
    assert_eq!(config.order_rate_limit.max_orders, 3);
    assert!(config.supabase.is_none());

    let bad = AppConfig::from_lookup(|key| match key {
        "MEDICOMP_SEED_FILE" => Some("seed.json".to_string()),
        "ORDER_RATE_LIMIT" => Some("many".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert_eq!(bad.code, ErrorCode::ConfigInvalidValue);

    let missing = AppConfig::from_lookup(|_| None).unwrap_err();
    assert_eq!(missing.code, ErrorCode::ConfigMissingEnv);
}
