//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so handler logs and the JSON
//! error envelope can be matched up in production.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - API_xxx: request-level errors
//! - ORDER_xxx: order intake / allocation errors
//! - STORE_xxx: database platform errors
//! - EMAIL_xxx: transactional email errors
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // API Errors
    // ============================================
    /// Malformed request
    ApiBadRequest,
    /// Field validation failed
    ApiValidationFailed,
    /// Missing or wrong admin key
    ApiUnauthorized,
    /// Too many requests from one client
    ApiRateLimited,
    /// Resource not found
    ApiNotFound,
    /// Request took longer than the server allows
    ApiTimeout,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Order / Inventory Errors
    // ============================================
    /// Submitted price does not match the catalog
    OrderPriceMismatch,
    /// Product is discontinued
    OrderProductUnavailable,
    /// Allocation state changed underneath us (stock, order status)
    OrderConflict,

    // ============================================
    // Store Errors
    // ============================================
    /// Could not reach the database platform
    StoreConnectionFailed,
    /// Database request timed out
    StoreTimeout,
    /// Database platform throttled us (HTTP 429)
    StoreRateLimited,
    /// Database platform returned an error status
    StoreRequestFailed,
    /// Response body did not match the expected shape
    StoreInvalidResponse,

    // ============================================
    // Email Errors
    // ============================================
    /// Email API rejected or failed the send
    EmailSendFailed,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiValidationFailed => "VALIDATION_FAILED",
            Self::ApiUnauthorized => "API_UNAUTHORIZED",
            Self::ApiRateLimited => "RATE_LIMITED",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::OrderPriceMismatch => "PRICE_MISMATCH",
            Self::OrderProductUnavailable => "PRODUCT_UNAVAILABLE",
            Self::OrderConflict => "ORDER_CONFLICT",

            Self::StoreConnectionFailed => "STORE_CONNECTION_FAILED",
            Self::StoreTimeout => "STORE_TIMEOUT",
            Self::StoreRateLimited => "STORE_RATE_LIMITED",
            Self::StoreRequestFailed => "STORE_REQUEST_FAILED",
            Self::StoreInvalidResponse => "STORE_INVALID_RESPONSE",

            Self::EmailSendFailed => "EMAIL_SEND_FAILED",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest
            | Self::ApiValidationFailed
            | Self::OrderPriceMismatch
            | Self::OrderProductUnavailable => 400,
            Self::ApiUnauthorized => 401,
            Self::ApiNotFound => 404,
            Self::ApiTimeout => 408,
            Self::OrderConflict => 409,
            Self::ApiRateLimited => 429,
            Self::StoreConnectionFailed | Self::StoreTimeout | Self::StoreRateLimited => 503,
            _ => 500,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreConnectionFailed | Self::StoreTimeout | Self::StoreRateLimited
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// Field validation failed
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiValidationFailed, msg)
    }

    /// Client exceeded a rate limit
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::ApiRateLimited,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
    }

    /// Resource not found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }

    /// Missing or invalid admin key
    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::ApiUnauthorized, "Invalid or missing admin key")
    }

    /// Allocation/state conflict
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OrderConflict, msg)
    }

    /// Database request failed
    pub fn store(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreRequestFailed, msg)
    }

    /// Missing environment variable
    pub fn missing_env(name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", name),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(name: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {:?}", name, value),
        )
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::StoreTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::StoreConnectionFailed, "Connection failed")
        } else if err.is_decode() {
            Self::with_source(ErrorCode::StoreInvalidResponse, "Invalid response body", err)
        } else {
            Self::new(ErrorCode::StoreRequestFailed, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::StoreInvalidResponse, "JSON parse error", err)
    }
}
