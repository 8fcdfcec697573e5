//! API Route Configuration

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState};
use super::middleware::{admin_auth_middleware, logging_middleware, rate_limit_middleware};
use super::types::{ApiError, ApiResponse, ErrorResponse};
use crate::models::{AppError, ErrorCode};
use crate::utils::constants::REQUEST_TIMEOUT_SECS;

/// Map errors raised by the tower layers to the JSON envelope
async fn handle_layer_error(err: BoxError) -> ErrorResponse {
    let err = if err.is::<tower::timeout::error::Elapsed>() {
        AppError::new(
            ErrorCode::ApiTimeout,
            format!("Request exceeded {} seconds", REQUEST_TIMEOUT_SECS),
        )
    } else {
        AppError::internal(err.to_string())
    };
    let status = StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::warn!(code = err.code_str(), error = %err, "request aborted by service layer");
    (status, Json(ApiResponse::error(ApiError::from(&err), 0.0)))
}

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Back-office, behind X-Admin-Key
    let admin = Router::new()
        .route("/stats", get(handlers::get_stats))
        .route("/kpis", get(handlers::get_kpis))
        .route("/sales-orders/:id/allocate", post(handlers::allocate_sales_order))
        .route("/purchase-orders", get(handlers::list_purchase_orders))
        .route("/suppliers", get(handlers::list_suppliers))
        .route("/similarity/recompute", post(handlers::recompute_similarity))
        .route("/forecast", get(handlers::get_forecast))
        .route("/reorder", get(handlers::get_reorder))
        .route("/reorder/drafts", post(handlers::create_reorder_drafts))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    // Storefront
    let api_v1 = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/products", get(handlers::list_products))
        .route("/products/:code", get(handlers::get_product))
        .route("/products/:code/recommendations", get(handlers::product_recommendations))
        .route("/users/:user_id/recommendations", get(handlers::user_recommendations))
        .route("/interactions", post(handlers::record_interaction))
        .route("/orders", post(handlers::create_order))
        .route("/contact/whatsapp", get(handlers::whatsapp_link))
        .route("/auth/password-reset", post(handlers::password_reset))
        .route("/referrals", post(handlers::create_referral))
        .nest("/admin", admin);

    Router::new()
        .nest("/v1", api_v1)
        .route("/health", get(handlers::health_check))
        .route("/sitemap.xml", get(handlers::sitemap_xml))
        .with_state(state.clone())
        // Middleware (order matters - bottom runs first)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_layer_error))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS)),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_maps_to_request_timeout() {
        let (status, Json(body)) = handle_layer_error(Box::new(tower::timeout::error::Elapsed::new())).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body.error.unwrap().code, "API_TIMEOUT");

        let (status, Json(body)) = handle_layer_error("backend went away".into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.unwrap().code, "API_INTERNAL_ERROR");
    }
}
