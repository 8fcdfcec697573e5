//! API Request/Response Types

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::models::{AppError, ErrorCode};
use crate::utils::cache::CacheStats;
use crate::utils::telemetry::TelemetryStats;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ApiBadRequest.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            code: ErrorCode::ApiUnauthorized.as_str().to_string(),
            message: "Invalid or missing admin key".to_string(),
            details: None,
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            code: ErrorCode::ApiRateLimited.as_str().to_string(),
            message: format!("Rate limit exceeded. Retry after {} seconds", retry_after),
            details: Some(format!("retry_after: {}", retry_after)),
        }
    }
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        // Upstream details stay in the logs
        let message = match err.code.http_status() {
            500..=599 => "Internal error, please retry later".to_string(),
            _ => err.message.clone(),
        };
        Self {
            code: err.code.as_str().to_string(),
            message,
            details: None,
        }
    }
}

/// Error half of every handler result
pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

/// Handler result
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Map an `AppError` to status + envelope
pub fn error_response(err: &AppError, start: Instant) -> ErrorResponse {
    let status = StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(code = err.code_str(), error = %err, "request failed");
    }
    (
        status,
        Json(ApiResponse::error(ApiError::from(err), elapsed_ms(start))),
    )
}

pub fn ok<T: Serialize>(data: T, start: Instant) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Health & Stats
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub uptime_seconds: u64,
    pub telemetry: TelemetryStats,
    pub cache: CacheStats,
}

// ============================================
// Queries
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KpiQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseOrderQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsAppQuery {
    pub product_code: Option<String>,
    pub size: Option<String>,
}

// ============================================
// Responses
// ============================================

#[derive(Debug, Serialize)]
pub struct WhatsAppLink {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptedData {
    pub message: String,
}
