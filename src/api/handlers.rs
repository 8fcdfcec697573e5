//! API Request Handlers

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use super::middleware::{client_ip, RateLimiter};
use super::types::*;
use crate::core::{
    catalog, cross_dock, forecast, intake, kpi, notifications, recommend, reorder, similarity,
    sitemap, whatsapp,
};
use crate::models::{
    AppConfig, AppError, ErrorCode, PurchaseOrder, PurchaseOrderStatus, Supplier,
};
use crate::providers::{AuthAdmin, EmailSender, Store};
use crate::utils::cache::RecommendationCache;
use crate::utils::constants::{APP_NAME, APP_VERSION};
use crate::utils::telemetry::{EventKind, TelemetryCollector, TelemetryEvent};

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn AuthAdmin>,
    pub mailer: Arc<dyn EmailSender>,
    pub cache: RecommendationCache,
    pub telemetry: Arc<TelemetryCollector>,
    pub rate_limiter: Arc<RateLimiter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        auth: Arc<dyn AuthAdmin>,
        mailer: Arc<dyn EmailSender>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::per_minute(config.api_rate_limit_per_minute));
        Self {
            config,
            store,
            auth,
            mailer,
            cache: RecommendationCache::new(),
            telemetry,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn intake_settings(&self) -> intake::IntakeSettings {
        intake::IntakeSettings {
            rate_limit: self.config.order_rate_limit,
            whatsapp_number: self.config.whatsapp_number.clone(),
        }
    }
}

type Shared = State<Arc<AppState>>;

fn body<T>(payload: Result<Json<T>, JsonRejection>, start: Instant) -> Result<T, ErrorResponse> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| error_response(&AppError::bad_request(rejection.body_text()), start))
}

fn created<T: Serialize>(data: T, start: Instant) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(data, start))
}

// ============================================
// Health & Stats
// ============================================

pub async fn health_check(State(state): Shared) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        service: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    ok(data, start)
}

pub async fn get_stats(State(state): Shared) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();
    ok(
        StatsData {
            uptime_seconds: state.uptime_seconds(),
            telemetry: state.telemetry.get_stats(),
            cache: state.cache.stats(),
        },
        start,
    )
}

// ============================================
// Catalog & Recommendations
// ============================================

pub async fn list_products(
    State(state): Shared,
    Query(q): Query<CatalogQuery>,
) -> ApiResult<Vec<catalog::CatalogItem>> {
    let start = Instant::now();
    let items = catalog::list(state.store.as_ref(), q.category.as_deref())
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(items, start))
}

pub async fn get_product(
    State(state): Shared,
    Path(code): Path<String>,
) -> ApiResult<catalog::CatalogItem> {
    let start = Instant::now();
    let item = catalog::get(state.store.as_ref(), &code)
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(item, start))
}

pub async fn product_recommendations(
    State(state): Shared,
    Path(code): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<recommend::Recommendation>> {
    let start = Instant::now();
    let recs = recommend::for_product(state.store.as_ref(), &state.cache, &code, q.limit)
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(recs, start))
}

pub async fn user_recommendations(
    State(state): Shared,
    Path(user_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<recommend::Recommendation>> {
    let start = Instant::now();
    let recs = recommend::for_user(state.store.as_ref(), &user_id, q.limit)
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(recs, start))
}

pub async fn record_interaction(
    State(state): Shared,
    payload: Result<Json<recommend::InteractionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<crate::models::UserInteraction>>), ErrorResponse> {
    let start = Instant::now();
    let req = body(payload, start)?;
    let interaction = recommend::record_interaction(state.store.as_ref(), &req, Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(created(interaction, start))
}

// ============================================
// Storefront orders
// ============================================

pub async fn create_order(
    State(state): Shared,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<intake::OrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<intake::OrderReceipt>>), ErrorResponse> {
    let start = Instant::now();
    let req = body(payload, start)?;
    let ip = client_ip(
        &headers,
        connect.map(|ConnectInfo(addr)| addr),
        state.config.trusted_proxy_hops,
    );

    match intake::place_order(state.store.as_ref(), &state.intake_settings(), &req, &ip, Utc::now()).await {
        Ok(receipt) => {
            state.telemetry.record(TelemetryEvent::new(
                EventKind::OrderAccepted,
                start.elapsed().as_millis() as u64,
                format!("order={}", receipt.order_id),
            ));
            Ok(created(receipt, start))
        }
        Err(e) => {
            let kind = match e.code {
                ErrorCode::ApiRateLimited => EventKind::OrderRateLimited,
                _ => EventKind::OrderRejected,
            };
            state.telemetry.record_kind(kind, start.elapsed().as_millis() as u64);
            Err(error_response(&e, start))
        }
    }
}

pub async fn whatsapp_link(
    State(state): Shared,
    Query(q): Query<WhatsAppQuery>,
) -> ApiResult<WhatsAppLink> {
    let start = Instant::now();
    let text = match q.product_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let product = state
                .store
                .get_product(code)
                .await
                .map_err(|e| error_response(&e, start))?
                .ok_or_else(|| error_response(&AppError::not_found(format!("Product {} not found", code)), start))?;
            whatsapp::inquiry_message(&product.name, &product.code, q.size.as_deref())
        }
        None => "Hello! I have a question about your products.".to_string(),
    };
    Ok(ok(
        WhatsAppLink {
            url: whatsapp::deep_link(&state.config.whatsapp_number, &text),
        },
        start,
    ))
}

// ============================================
// Accounts & Engagement
// ============================================

pub async fn password_reset(
    State(state): Shared,
    payload: Result<Json<notifications::PasswordResetRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<AcceptedData>>), ErrorResponse> {
    let start = Instant::now();
    let req = body(payload, start)?;

    match notifications::request_password_reset(
        state.auth.as_ref(),
        state.mailer.as_ref(),
        &req,
        &state.config.site_url,
    )
    .await
    {
        Ok(sent) => {
            if sent {
                state.telemetry.record_kind(EventKind::EmailSent, start.elapsed().as_millis() as u64);
            }
        }
        // Bad input is reported; anything else is hidden behind the same answer
        Err(e) if e.code == ErrorCode::ApiValidationFailed => return Err(error_response(&e, start)),
        Err(e) => {
            tracing::warn!(error = %e, "password reset failed");
            state.telemetry.record_kind(EventKind::EmailFailed, start.elapsed().as_millis() as u64);
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        ok(
            AcceptedData {
                message: "If an account exists for this email, a reset link has been sent".to_string(),
            },
            start,
        ),
    ))
}

pub async fn create_referral(
    State(state): Shared,
    payload: Result<Json<notifications::ReferralRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<notifications::ReferralReceipt>>), ErrorResponse> {
    let start = Instant::now();
    let req = body(payload, start)?;
    let receipt = notifications::create_referral(
        state.store.as_ref(),
        state.mailer.as_ref(),
        &req,
        &state.config.site_url,
        Utc::now(),
    )
    .await
    .map_err(|e| error_response(&e, start))?;

    let kind = if receipt.email_sent {
        EventKind::EmailSent
    } else {
        EventKind::EmailFailed
    };
    state.telemetry.record_kind(kind, start.elapsed().as_millis() as u64);
    Ok(created(receipt, start))
}

// ============================================
// Sitemap
// ============================================

pub async fn sitemap_xml(State(state): Shared) -> Response {
    let start = Instant::now();
    match state.store.list_products().await {
        Ok(products) => (
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            sitemap::generate(&state.config.site_url, &products),
        )
            .into_response(),
        Err(e) => error_response(&e, start).into_response(),
    }
}

// ============================================
// Admin: fulfilment
// ============================================

pub async fn allocate_sales_order(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<cross_dock::AllocationSummary> {
    let start = Instant::now();
    let id = Uuid::parse_str(&id)
        .map_err(|_| error_response(&AppError::bad_request(format!("Invalid sales order id: {}", id)), start))?;

    let summary = cross_dock::allocate_sales_order(state.store.as_ref(), id, Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    // Stock moved, cached recommendations may list sold-out products
    state.cache.clear();

    let latency = start.elapsed().as_millis() as u64;
    state.telemetry.record(TelemetryEvent::new(
        EventKind::SalesOrderAllocated,
        latency,
        format!("sales_order={}", id),
    ));
    for po in &summary.purchase_orders {
        state.telemetry.record(TelemetryEvent::new(
            EventKind::BackorderCreated,
            latency,
            format!("sales_order={} po={}", id, po),
        ));
    }
    Ok(ok(summary, start))
}

pub async fn list_purchase_orders(
    State(state): Shared,
    Query(q): Query<PurchaseOrderQuery>,
) -> ApiResult<Vec<PurchaseOrder>> {
    let start = Instant::now();
    let status = match q.status.as_deref() {
        Some(raw) => Some(PurchaseOrderStatus::parse(raw).ok_or_else(|| {
            error_response(&AppError::bad_request(format!("Unknown purchase order status: {}", raw)), start)
        })?),
        None => None,
    };
    let orders = state
        .store
        .list_purchase_orders()
        .await
        .map_err(|e| error_response(&e, start))?;
    let orders = orders
        .into_iter()
        .filter(|po| status.map_or(true, |s| po.status == s))
        .collect();
    Ok(ok(orders, start))
}

pub async fn list_suppliers(State(state): Shared) -> ApiResult<Vec<Supplier>> {
    let start = Instant::now();
    let suppliers = state
        .store
        .list_suppliers()
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(suppliers, start))
}

// ============================================
// Admin: analytics
// ============================================

pub async fn recompute_similarity(State(state): Shared) -> ApiResult<similarity::SimilarityRun> {
    let start = Instant::now();
    let run = similarity::recompute(state.store.as_ref(), Some(&state.cache), Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    state.telemetry.record(TelemetryEvent::new(
        EventKind::SimilarityRecomputed,
        run.duration_ms,
        format!("pairs={}", run.pairs),
    ));
    Ok(ok(run, start))
}

pub async fn get_forecast(State(state): Shared) -> ApiResult<Vec<forecast::Forecast>> {
    let start = Instant::now();
    let forecasts = forecast::load_forecasts(state.store.as_ref(), Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(forecasts, start))
}

pub async fn get_reorder(State(state): Shared) -> ApiResult<Vec<reorder::ReorderSuggestion>> {
    let start = Instant::now();
    let suggestions = reorder::load_suggestions(state.store.as_ref(), Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(suggestions, start))
}

pub async fn create_reorder_drafts(
    State(state): Shared,
) -> Result<(StatusCode, Json<ApiResponse<Vec<PurchaseOrder>>>), ErrorResponse> {
    let start = Instant::now();
    let drafts = reorder::create_drafts(state.store.as_ref(), Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    info!(drafts = drafts.len(), "reorder drafts requested");
    Ok(created(drafts, start))
}

pub async fn get_kpis(State(state): Shared, Query(q): Query<KpiQuery>) -> ApiResult<kpi::KpiReport> {
    let start = Instant::now();
    let days = kpi::validate_days(q.days).map_err(|e| error_response(&e, start))?;
    let report = kpi::load_report(state.store.as_ref(), days, Utc::now())
        .await
        .map_err(|e| error_response(&e, start))?;
    Ok(ok(report, start))
}
