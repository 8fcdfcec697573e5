//! Storefront order intake
//!
//! Validates the order modal payload, enforces the per-IP order limit with a
//! single count query, checks the product against the catalog and stores the
//! order as `pending`. The customer then continues on WhatsApp.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::whatsapp;
use crate::models::{
    AppError, AppResult, ErrorCode, Order, OrderRateLimit, OrderStatus,
};
use crate::providers::store::Store;
use crate::utils::constants::{
    MAX_NOTES_LEN, MAX_ORDER_QUANTITY, MAX_UNIT_PRICE, MIN_UNIT_PRICE, PRICE_TOLERANCE,
};

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[\p{L}][\p{L} .'\-]*$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-()]{6,19}$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap();
    static ref PRODUCT_CODE_RE: Regex = Regex::new(r"^[A-Za-z0-9_\-]{1,40}$").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub product_code: String,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub order_id: Uuid,
    pub total: f64,
    pub status: OrderStatus,
    pub whatsapp_url: String,
}

/// Intake settings taken from the service config
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub rate_limit: OrderRateLimit,
    pub whatsapp_number: String,
}

pub fn is_valid_phone(phone: &str) -> bool {
    let phone = phone.trim();
    if !PHONE_RE.is_match(phone) {
        return false;
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

pub fn is_valid_name(name: &str) -> bool {
    let name = name.trim();
    let len = name.chars().count();
    (2..=80).contains(&len) && NAME_RE.is_match(name)
}

pub fn is_valid_product_code(code: &str) -> bool {
    PRODUCT_CODE_RE.is_match(code.trim())
}

/// Shape checks only; every failing field is reported
pub fn validate(req: &OrderRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !is_valid_name(&req.customer_name) {
        errors.push(FieldError::new(
            "customer_name",
            "must be 2-80 letters, spaces, dots, apostrophes or hyphens",
        ));
    }
    if !is_valid_phone(&req.phone) {
        errors.push(FieldError::new("phone", "must be a phone number with 7-15 digits"));
    }
    if let Some(email) = non_empty(&req.email) {
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "is not a valid email address"));
        }
    }
    if !is_valid_product_code(&req.product_code) {
        errors.push(FieldError::new("product_code", "must be 1-40 letters, digits, '-' or '_'"));
    }
    if let Some(size) = non_empty(&req.size) {
        if size.chars().count() > 10 {
            errors.push(FieldError::new("size", "must be at most 10 characters"));
        }
    }
    if req.quantity == 0 || req.quantity > MAX_ORDER_QUANTITY {
        errors.push(FieldError::new(
            "quantity",
            format!("must be between 1 and {}", MAX_ORDER_QUANTITY),
        ));
    }
    if !req.unit_price.is_finite() || req.unit_price < MIN_UNIT_PRICE || req.unit_price > MAX_UNIT_PRICE {
        errors.push(FieldError::new(
            "unit_price",
            format!("must be between {} and {}", MIN_UNIT_PRICE, MAX_UNIT_PRICE),
        ));
    }
    if let Some(notes) = non_empty(&req.notes) {
        if notes.chars().count() > MAX_NOTES_LEN {
            errors.push(FieldError::new(
                "notes",
                format!("must be at most {} characters", MAX_NOTES_LEN),
            ));
        }
    }

    errors
}

/// Turn field errors into one `VALIDATION_FAILED` error
pub fn validation_error(errors: &[FieldError]) -> AppError {
    let summary = errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    AppError::validation(summary)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Validate, rate limit, price-check and store one storefront order
pub async fn place_order(
    store: &dyn Store,
    settings: &IntakeSettings,
    req: &OrderRequest,
    client_ip: &str,
    now: DateTime<Utc>,
) -> AppResult<OrderReceipt> {
    let errors = validate(req);
    if !errors.is_empty() {
        warn!(ip = %client_ip, fields = errors.len(), "order rejected by validation");
        return Err(validation_error(&errors));
    }

    let window = chrono::Duration::from_std(settings.rate_limit.window)
        .map_err(|_| AppError::internal("order rate window out of range"))?;
    let recent = store.count_orders_from_ip_since(client_ip, now - window).await?;
    if recent >= settings.rate_limit.max_orders {
        warn!(ip = %client_ip, recent, "order rate limit reached");
        return Err(AppError::rate_limited(settings.rate_limit.window.as_secs()));
    }

    let code = req.product_code.trim();
    let product = store
        .get_product(code)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Product {} not found", code)))?;
    if product.is_discontinued {
        return Err(AppError::new(
            ErrorCode::OrderProductUnavailable,
            format!("Product {} is discontinued", product.code),
        ));
    }

    let drift = (req.unit_price - product.price).abs();
    if drift > product.price.abs() * PRICE_TOLERANCE {
        return Err(AppError::new(
            ErrorCode::OrderPriceMismatch,
            format!(
                "Submitted price {:.2} does not match catalog price {:.2}",
                req.unit_price, product.price
            ),
        ));
    }

    let total = round_cents(f64::from(req.quantity) * req.unit_price);
    let order = Order {
        id: Uuid::new_v4(),
        customer_name: req.customer_name.trim().to_string(),
        phone: req.phone.trim().to_string(),
        email: non_empty(&req.email).map(str::to_string),
        product_code: product.code.clone(),
        product_name: product.name.clone(),
        size: non_empty(&req.size).map(str::to_string),
        quantity: req.quantity,
        unit_price: req.unit_price,
        total,
        notes: non_empty(&req.notes).map(str::to_string),
        client_ip: client_ip.to_string(),
        status: OrderStatus::Pending,
        created_at: now,
    };
    store.insert_order(&order).await?;

    info!(order_id = %order.id, product = %order.product_code, quantity = order.quantity, "order accepted");

    let message = whatsapp::order_message(
        &order.id.to_string(),
        &order.product_name,
        order.size.as_deref(),
        order.quantity,
        order.total,
    );
    Ok(OrderReceipt {
        order_id: order.id,
        total,
        status: order.status,
        whatsapp_url: whatsapp::deep_link(&settings.whatsapp_number, &message),
    })
}
