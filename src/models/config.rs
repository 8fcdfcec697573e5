//! Configuration module
//!
//! Everything comes from the environment (optionally a `.env` file).
//! Defaults live in utils/constants.rs.

use std::time::Duration;
use tracing::info;

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    DEFAULT_API_RATE_LIMIT_PER_MINUTE, DEFAULT_EMAIL_FROM, DEFAULT_HOST, DEFAULT_ORDER_RATE_LIMIT,
    DEFAULT_ORDER_RATE_WINDOW_MINUTES, DEFAULT_PORT, DEFAULT_SITE_URL, DEFAULT_TRUSTED_PROXY_HOPS,
};

/// Hosted database platform credentials
#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    /// Service role key. Never logged.
    pub service_key: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_key", &"***HIDDEN***")
            .finish()
    }
}

/// Order intake rate limit (enforced through the database)
#[derive(Debug, Clone, Copy)]
pub struct OrderRateLimit {
    pub max_orders: u32,
    pub window: Duration,
}

impl Default for OrderRateLimit {
    fn default() -> Self {
        Self {
            max_orders: DEFAULT_ORDER_RATE_LIMIT,
            window: Duration::from_secs(DEFAULT_ORDER_RATE_WINDOW_MINUTES * 60),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` when running against a seed file instead of the platform
    pub supabase: Option<SupabaseConfig>,
    pub seed_file: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    /// Public storefront origin, used for sitemap and email links
    pub site_url: String,
    /// Business WhatsApp number (any formatting)
    pub whatsapp_number: String,
    pub admin_api_key: Option<String>,
    pub order_rate_limit: OrderRateLimit,
    pub api_rate_limit_per_minute: u32,
    /// Reverse proxies in front of the API; 0 keys clients on the socket peer
    pub trusted_proxy_hops: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            supabase: None,
            seed_file: None,
            resend_api_key: None,
            email_from: DEFAULT_EMAIL_FROM.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            whatsapp_number: String::new(),
            admin_api_key: None,
            order_rate_limit: OrderRateLimit::default(),
            api_rate_limit_per_minute: DEFAULT_API_RATE_LIMIT_PER_MINUTE,
            trusted_proxy_hops: DEFAULT_TRUSTED_PROXY_HOPS,
        }
    }
}

impl AppConfig {
    /// Load from process environment (after `.env`, if present)
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        // Railway-style PORT wins over the service-specific variable
        let port = match get("PORT").or_else(|| get("MEDICOMP_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::invalid_config("PORT", &raw))?,
            None => defaults.port,
        };

        let seed_file = get("MEDICOMP_SEED_FILE");
        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            (Some(_), None) => return Err(AppError::missing_env("SUPABASE_SERVICE_ROLE_KEY")),
            (None, Some(_)) => return Err(AppError::missing_env("SUPABASE_URL")),
            (None, None) => None,
        };
        if supabase.is_none() && seed_file.is_none() {
            return Err(AppError::missing_env("SUPABASE_URL"));
        }

        let max_orders = parse_or("ORDER_RATE_LIMIT", get("ORDER_RATE_LIMIT"), DEFAULT_ORDER_RATE_LIMIT)?;
        let window_minutes = parse_or(
            "ORDER_RATE_WINDOW_MINUTES",
            get("ORDER_RATE_WINDOW_MINUTES"),
            DEFAULT_ORDER_RATE_WINDOW_MINUTES,
        )?;
        let api_rate_limit_per_minute = parse_or(
            "API_RATE_LIMIT_PER_MINUTE",
            get("API_RATE_LIMIT_PER_MINUTE"),
            DEFAULT_API_RATE_LIMIT_PER_MINUTE,
        )?;
        let trusted_proxy_hops = parse_or(
            "TRUSTED_PROXY_HOPS",
            get("TRUSTED_PROXY_HOPS"),
            DEFAULT_TRUSTED_PROXY_HOPS,
        )?;

        Ok(Self {
            host: get("MEDICOMP_HOST").unwrap_or(defaults.host),
            port,
            supabase,
            seed_file,
            resend_api_key: get("RESEND_API_KEY"),
            email_from: get("EMAIL_FROM").unwrap_or(defaults.email_from),
            site_url: get("SITE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.site_url),
            whatsapp_number: get("WHATSAPP_NUMBER").unwrap_or_default(),
            admin_api_key: get("ADMIN_API_KEY"),
            order_rate_limit: OrderRateLimit {
                max_orders,
                window: Duration::from_secs(window_minutes * 60),
            },
            api_rate_limit_per_minute,
            trusted_proxy_hops,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> AppResult<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::invalid_config(name, &raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_seed_file() {
        let config = AppConfig::from_lookup(lookup(&[("MEDICOMP_SEED_FILE", "seed.json")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.supabase.is_none());
        assert_eq!(config.order_rate_limit.max_orders, DEFAULT_ORDER_RATE_LIMIT);
        assert_eq!(config.trusted_proxy_hops, 0);
    }

    #[test]
    fn test_supabase_and_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co/"),
            ("SUPABASE_SERVICE_ROLE_KEY", "secret"),
            ("PORT", "9000"),
            ("ORDER_RATE_LIMIT", "3"),
            ("ORDER_RATE_WINDOW_MINUTES", "10"),
            ("SITE_URL", "https://shop.example/"),
            ("TRUSTED_PROXY_HOPS", "1"),
        ]))
        .unwrap();
        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.url, "https://abc.supabase.co");
        assert_eq!(config.port, 9000);
        assert_eq!(config.order_rate_limit.max_orders, 3);
        assert_eq!(config.order_rate_limit.window, Duration::from_secs(600));
        assert_eq!(config.site_url, "https://shop.example");
        assert_eq!(config.trusted_proxy_hops, 1);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("MEDICOMP_SEED_FILE", "seed.json"),
            ("ORDER_RATE_LIMIT", "many"),
        ]))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn test_missing_backend() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissingEnv);
    }

    #[test]
    fn test_service_key_hidden_in_debug() {
        let cfg = SupabaseConfig {
            url: "https://x".to_string(),
            service_key: "super-secret".to_string(),
        };
        assert!(!format!("{:?}", cfg).contains("super-secret"));
    }
}
