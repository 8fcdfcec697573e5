//! Router tests against a seeded in-memory store

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use medicomp::api::{create_router, AppState};
use medicomp::models::{
    Product, PurchaseOrderStatus, SalesOrder, SalesOrderItem, SalesOrderStatus, Supplier,
};
use medicomp::providers::{MemoryStore, RecordingMailer, Seed};
use medicomp::{AppConfig, TelemetryCollector};

const ADMIN_KEY: &str = "test-admin-key";
const SHORT_ORDER: &str = "5f0c1a9e-8a55-4c1e-9a57-0d3c3f4a2b11";
const STOCKED_ORDER: &str = "7b2e4d61-1c3f-4e8a-b6d2-9a0f5e7c3d22";

fn product(code: &str, price: f64, stock: i32, discontinued: bool) -> Product {
    Product {
        code: code.to_string(),
        name: format!("Garment {}", code),
        category: "stockings".to_string(),
        price,
        stock,
        is_discontinued: discontinued,
        supplier_id: Some("SUP-1".to_string()),
        lead_time_days: None,
        image_url: None,
        updated_at: None,
    }
}

fn sales_order(id: &str, code: &str, quantity: u32) -> (SalesOrder, SalesOrderItem) {
    let id = Uuid::parse_str(id).unwrap();
    (
        SalesOrder {
            id,
            customer_id: None,
            status: SalesOrderStatus::Pending,
            total: 0.0,
            created_at: Utc::now(),
        },
        SalesOrderItem {
            id: Uuid::new_v4(),
            sales_order_id: id,
            product_code: code.to_string(),
            quantity,
            unit_price: 45.0,
            is_backorder: false,
            allocated: false,
            purchase_order_id: None,
        },
    )
}

fn seed() -> Seed {
    let (short, short_item) = sales_order(SHORT_ORDER, "MC-200", 2);
    let (stocked, stocked_item) = sales_order(STOCKED_ORDER, "MC-100", 3);
    Seed {
        products: vec![
            product("MC-100", 45.0, 10, false),
            product("MC-200", 60.0, 0, false),
            product("MC-300", 30.0, 5, true),
        ],
        suppliers: vec![Supplier {
            id: "SUP-1".to_string(),
            name: "Textiles Norte".to_string(),
            email: None,
            lead_time_days: Some(10),
        }],
        sales_orders: vec![short, stocked],
        sales_order_items: vec![short_item, stocked_item],
        auth_users: vec!["ana@example.com".to_string()],
        ..Seed::default()
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
}

/// Router behind one reverse proxy, the usual deployment
fn test_app() -> TestApp {
    app_behind_proxies(1)
}

fn app_behind_proxies(trusted_proxy_hops: usize) -> TestApp {
    let store = Arc::new(MemoryStore::from_seed(seed()));
    let mailer = Arc::new(RecordingMailer::new());
    let config = AppConfig {
        admin_api_key: Some(ADMIN_KEY.to_string()),
        whatsapp_number: "+54 9 11 5555-0000".to_string(),
        site_url: "https://medicomp.example".to_string(),
        trusted_proxy_hops,
        ..AppConfig::default()
    };
    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        store.clone(),
        mailer.clone(),
        Arc::new(TelemetryCollector::new()),
    ));
    TestApp {
        router: create_router(state),
        store,
        mailer,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap()
}

fn order_body(phone: &str) -> Value {
    json!({
        "customer_name": "Ana María López",
        "phone": phone,
        "product_code": "MC-100",
        "size": "M",
        "quantity": 2,
        "unit_price": 45.0
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_order_accepted() {
    let app = test_app();
    let (status, body) = send(&app, post_json("/v1/orders", order_body("+54 9 11 4555-1234"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["total"], 90.0);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["whatsapp_url"]
        .as_str()
        .unwrap()
        .starts_with("https://wa.me/5491155550000?text="));

    let orders = app.store.snapshot().unwrap().orders;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].client_ip, "203.0.113.7");
}

#[tokio::test]
async fn test_malformed_phone_is_rejected() {
    let app = test_app();
    let (status, body) = send(&app, post_json("/v1/orders", order_body("call me maybe"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert!(body["error"]["message"].as_str().unwrap().contains("phone"));
    assert!(app.store.snapshot().unwrap().orders.is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/orders")
        .header("content-type", "application/json")
        .body(Body::from("{\"customer_name\": "))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "API_BAD_REQUEST");
}

#[tokio::test]
async fn test_order_rate_limit() {
    let app = test_app();
    for _ in 0..5 {
        let (status, _) = send(&app, post_json("/v1/orders", order_body("+54 9 11 4555-1234"))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, post_json("/v1/orders", order_body("+54 9 11 4555-1234"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(app.store.snapshot().unwrap().orders.len(), 5);
}

#[tokio::test]
async fn test_order_rate_limit_ignores_forged_forwarding_behind_proxy() {
    let app = test_app();
    for n in 1..=6 {
        let mut request = post_json("/v1/orders", order_body("+54 9 11 4555-1234"));
        let chain = format!("198.51.100.{}, 10.0.0.1", n);
        request.headers_mut().insert("x-forwarded-for", chain.parse().unwrap());
        let (status, _) = send(&app, request).await;
        let expected = if n <= 5 { StatusCode::CREATED } else { StatusCode::TOO_MANY_REQUESTS };
        assert_eq!(status, expected, "order {}", n);
    }
    let orders = app.store.snapshot().unwrap().orders;
    assert_eq!(orders.len(), 5);
    assert!(orders.iter().all(|o| o.client_ip == "10.0.0.1"));
}

#[tokio::test]
async fn test_order_rate_limit_keys_on_peer_without_proxy() {
    let app = app_behind_proxies(0);
    let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    for n in 1..=6 {
        let mut request = post_json("/v1/orders", order_body("+54 9 11 4555-1234"));
        let chain = format!("198.51.100.{}", n);
        request.headers_mut().insert("x-forwarded-for", chain.parse().unwrap());
        request.extensions_mut().insert(ConnectInfo(peer));
        let (status, _) = send(&app, request).await;
        let expected = if n <= 5 { StatusCode::CREATED } else { StatusCode::TOO_MANY_REQUESTS };
        assert_eq!(status, expected, "order {}", n);
    }
    let orders = app.store.snapshot().unwrap().orders;
    assert!(orders.iter().all(|o| o.client_ip == "192.0.2.10"));
}

#[tokio::test]
async fn test_price_mismatch() {
    let app = test_app();
    let mut body = order_body("+54 9 11 4555-1234");
    body["unit_price"] = json!(19.99);
    let (status, body) = send(&app, post_json("/v1/orders", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PRICE_MISMATCH");
}

#[tokio::test]
async fn test_admin_requires_key() {
    let app = test_app();
    let (status, body) = send(&app, Request::get("/v1/admin/kpis").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "API_UNAUTHORIZED");

    let wrong = Request::get("/v1/admin/kpis")
        .header("x-admin-key", "nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, admin("GET", "/v1/admin/kpis")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["period_days"], 30);
}

#[tokio::test]
async fn test_zero_stock_line_creates_one_purchase_order() {
    let app = test_app();
    let uri = format!("/v1/admin/sales-orders/{}/allocate", SHORT_ORDER);
    let (status, body) = send(&app, admin("POST", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "backordered");
    assert_eq!(body["data"]["backordered_lines"], 1);
    assert_eq!(body["data"]["purchase_orders"].as_array().unwrap().len(), 1);

    let tables = app.store.snapshot().unwrap();
    let order_id = Uuid::parse_str(SHORT_ORDER).unwrap();
    assert_eq!(tables.purchase_orders.len(), 1);
    let po = &tables.purchase_orders[0];
    assert_eq!(po.source_sales_order_id, Some(order_id));
    assert_eq!(po.status, PurchaseOrderStatus::Draft);
    assert_eq!(po.quantity, 2);
    assert!(po.is_cross_dock);

    let line = tables
        .sales_order_items
        .iter()
        .find(|i| i.sales_order_id == order_id)
        .unwrap();
    assert!(line.is_backorder);
    assert_eq!(line.purchase_order_id, Some(po.id));
    assert_eq!(tables.products.iter().find(|p| p.code == "MC-200").unwrap().stock, 0);
}

#[tokio::test]
async fn test_sufficient_stock_is_decremented() {
    let app = test_app();
    let uri = format!("/v1/admin/sales-orders/{}/allocate", STOCKED_ORDER);
    let (status, body) = send(&app, admin("POST", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "allocated");
    assert_eq!(body["data"]["allocated_lines"], 1);

    let tables = app.store.snapshot().unwrap();
    assert!(tables.purchase_orders.is_empty());
    assert_eq!(tables.products.iter().find(|p| p.code == "MC-100").unwrap().stock, 7);

    // Already allocated
    let (status, body) = send(&app, admin("POST", &uri)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ORDER_CONFLICT");
}

#[tokio::test]
async fn test_allocation_clears_recommendation_cache() {
    let app = test_app();
    let request = Request::get("/v1/products/MC-100/recommendations").body(Body::empty()).unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, admin("GET", "/v1/admin/stats")).await;
    assert_eq!(body["data"]["cache"]["entries"], 1);

    let uri = format!("/v1/admin/sales-orders/{}/allocate", STOCKED_ORDER);
    let (status, _) = send(&app, admin("POST", &uri)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, admin("GET", "/v1/admin/stats")).await;
    assert_eq!(body["data"]["cache"]["entries"], 0);
}

#[tokio::test]
async fn test_allocate_bad_id() {
    let app = test_app();
    let (status, _) = send(&app, admin("POST", "/v1/admin/sales-orders/not-a-uuid/allocate")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/v1/admin/sales-orders/{}/allocate", Uuid::new_v4());
    let (status, _) = send(&app, admin("POST", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sitemap_counts_sellable_products() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/sitemap.xml").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/xml"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    // 6 static routes + MC-100 (MC-200 out of stock, MC-300 discontinued)
    assert_eq!(xml.matches("<url>").count(), 7);
    assert!(xml.contains("https://medicomp.example/product/MC-100"));
    assert!(!xml.contains("MC-200"));
}

#[tokio::test]
async fn test_catalog_hides_discontinued() {
    let app = test_app();
    let (status, body) = send(&app, Request::get("/v1/products").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes.len(), 2);
    assert!(!codes.contains(&"MC-300"));

    let in_stock = |code: &str| {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["code"] == code)
            .map(|p| p["in_stock"].clone())
    };
    assert_eq!(in_stock("MC-100"), Some(json!(true)));
    assert_eq!(in_stock("MC-200"), Some(json!(false)));

    let (status, _) = send(&app, Request::get("/v1/products/MC-300").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_password_reset_never_reveals_accounts() {
    let app = test_app();
    let (status, _) = send(&app, post_json("/v1/auth/password-reset", json!({ "email": "ana@example.com" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(app.mailer.sent().len(), 1);

    let (status, body) = send(&app, post_json("/v1/auth/password-reset", json!({ "email": "ghost@example.com" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(app.mailer.sent().len(), 1);

    let (status, _) = send(&app, post_json("/v1/auth/password-reset", json!({ "email": "not-an-email" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_password_reset_keeps_link_on_storefront() {
    let app = test_app();
    let (status, _) = send(
        &app,
        post_json(
            "/v1/auth/password-reset",
            json!({ "email": "ana@example.com", "redirect_to": "https://evil.example/steal" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].html.contains("evil.example"));
    assert!(sent[0].html.contains("https://medicomp.example/reset-password"));
}

#[tokio::test]
async fn test_referral_created() {
    let app = test_app();
    let (status, body) = send(
        &app,
        post_json(
            "/v1/referrals",
            json!({
                "referrer_name": "Ana López",
                "referrer_email": "ana@example.com",
                "referred_name": "Julia Pérez"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["code"].as_str().unwrap().len(), 8);
    assert_eq!(body["data"]["email_sent"], true);
    assert_eq!(app.store.snapshot().unwrap().referrals.len(), 1);
}

#[tokio::test]
async fn test_whatsapp_link() {
    let app = test_app();
    let request = Request::get("/v1/contact/whatsapp?product_code=MC-100&size=L")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["data"]["url"].as_str().unwrap();
    assert!(url.starts_with("https://wa.me/5491155550000?text="));
    assert!(url.contains("MC-100"));
}

#[tokio::test]
async fn test_reorder_drafts_skip_open_purchase_orders() {
    let app = test_app();
    // Backorder MC-200 first: its open PO blocks a second draft
    let uri = format!("/v1/admin/sales-orders/{}/allocate", SHORT_ORDER);
    send(&app, admin("POST", &uri)).await;

    let (status, body) = send(&app, admin("POST", "/v1/admin/reorder/drafts")).await;
    assert_eq!(status, StatusCode::CREATED);
    let drafts = body["data"].as_array().unwrap();
    assert!(drafts.iter().all(|po| po["product_code"] != "MC-200"));

    let (status, body) = send(&app, admin("GET", "/v1/admin/purchase-orders?status=draft")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1 + drafts.len());

    let (status, _) = send(&app, admin("GET", "/v1/admin/purchase-orders?status=lost")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
