//! Constants Module - Single Source of Truth
//!
//! Tunables shared across the service. Modules import from here instead of
//! hardcoding numbers inline.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "medicomp";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outbound HTTP requests
pub const USER_AGENT: &str = concat!("medicomp/", env!("CARGO_PKG_VERSION"));

// ============================================
// SERVER / CONFIG DEFAULTS
// ============================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SITE_URL: &str = "http://localhost:5173";
pub const DEFAULT_EMAIL_FROM: &str = "Medicomp <no-reply@medicomp.shop>";

/// Requests still running after this are answered with 408
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Generic API limit per client per minute
pub const DEFAULT_API_RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Storefront orders allowed per IP inside the window
pub const DEFAULT_ORDER_RATE_LIMIT: u32 = 5;
pub const DEFAULT_ORDER_RATE_WINDOW_MINUTES: u64 = 60;

/// Reverse proxies trusted to append `X-Forwarded-For`
pub const DEFAULT_TRUSTED_PROXY_HOPS: usize = 0;

// ============================================
// DATABASE CLIENT
// ============================================

/// Request timeout for database calls (seconds)
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Retries for throttled / unavailable database calls
pub const STORE_MAX_RETRIES: u32 = 4;
pub const STORE_BASE_RETRY_MS: u64 = 250;
pub const STORE_MAX_RETRY_MS: u64 = 4_000;
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Rows per bulk insert request
pub const STORE_INSERT_CHUNK: usize = 500;

/// Recommendation cache TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

// ============================================
// ORDER INTAKE
// ============================================

pub const MAX_ORDER_QUANTITY: u32 = 50;
pub const MIN_UNIT_PRICE: f64 = 0.01;
pub const MAX_UNIT_PRICE: f64 = 10_000.0;
/// Accepted drift between submitted and catalog price (fraction)
pub const PRICE_TOLERANCE: f64 = 0.01;
pub const MAX_NOTES_LEN: usize = 500;

// ============================================
// SIMILARITY
// ============================================

pub const SIMILARITY_WEIGHT_COPURCHASE: f64 = 0.5;
pub const SIMILARITY_WEIGHT_CATEGORY: f64 = 0.3;
pub const SIMILARITY_WEIGHT_PRICE: f64 = 0.2;
/// Pairs scoring below this are not stored
pub const MIN_SIMILARITY_SCORE: f64 = 0.05;
/// Neighbours kept per product before symmetrization
pub const SIMILARITY_TOP_K: usize = 8;
/// Sales history window feeding co-purchase baskets
pub const SIMILARITY_HISTORY_DAYS: i64 = 365;

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 6;
pub const MAX_RECOMMENDATION_LIMIT: usize = 20;

// ============================================
// FORECAST / REORDER
// ============================================

pub const FORECAST_WINDOW_DAYS: usize = 30;
pub const FORECAST_WEIGHT_7D: f64 = 0.5;
pub const FORECAST_WEIGHT_14D: f64 = 0.3;
pub const FORECAST_WEIGHT_30D: f64 = 0.2;
pub const TREND_MIN: f64 = 0.7;
pub const TREND_MAX: f64 = 1.5;

/// z-score for a ~95% service level
pub const SAFETY_STOCK_Z: f64 = 1.65;
pub const DEFAULT_LEAD_TIME_DAYS: u32 = 14;
/// Days of demand a reorder should cover on top of the reorder point
pub const REVIEW_PERIOD_DAYS: f64 = 30.0;

/// Stock at or below this counts as "low" on the KPI board
pub const LOW_STOCK_THRESHOLD: i32 = 5;

// ============================================
// SITEMAP
// ============================================

/// (path, changefreq, priority)
pub const STATIC_ROUTES: [(&str, &str, &str); 6] = [
    ("/", "daily", "1.0"),
    ("/catalog", "daily", "0.9"),
    ("/size-guide", "monthly", "0.6"),
    ("/about", "monthly", "0.5"),
    ("/contact", "monthly", "0.5"),
    ("/faq", "monthly", "0.5"),
];

pub const PRODUCT_CHANGEFREQ: &str = "weekly";
pub const PRODUCT_PRIORITY: &str = "0.8";

// ============================================
// EXTERNAL SERVICES
// ============================================

pub const RESEND_API_URL: &str = "https://api.resend.com";
pub const WHATSAPP_BASE_URL: &str = "https://wa.me";
