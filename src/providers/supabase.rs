//! Hosted database client
//!
//! Talks to the platform's PostgREST endpoint (`/rest/v1`) and its auth admin
//! API (`/auth/v1/admin`) with the service role key.
//!
//! - gzip responses, per-request timeout
//! - exponential backoff with ±20% jitter on 429 / 502-504 / timeouts
//! - exact counts through `Prefer: count=exact` + `Content-Range`
//! - allocation runs inside one database function so it commits or not at all

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::cross_dock::AllocationPlan;
use crate::models::{
    AppError, AppResult, ErrorCode, Order, Product, ProductSimilarity, PurchaseOrder, Referral,
    SaleLine, SalesOrder, SalesOrderItem, Supplier, SupabaseConfig, UserFavorite, UserInteraction,
};
use crate::providers::store::{tables, AuthAdmin, Store};
use crate::utils::constants::{
    DEFAULT_STORE_TIMEOUT_SECS, RETRY_JITTER_PERCENT, STORE_BASE_RETRY_MS, STORE_INSERT_CHUNK,
    STORE_MAX_RETRIES, STORE_MAX_RETRY_MS, USER_AGENT as USER_AGENT_CONST,
};

/// Never matches a real code; PostgREST refuses unfiltered deletes
const DELETE_ALL_FILTER: (&str, &str) = ("product_code", "neq.__none__");

pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> AppResult<Self> {
        let client = Self::build_client(&config.service_key)?;
        info!(url = %config.url, "database client ready (key hidden)");
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn build_client(service_key: &str) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let bad_key = || AppError::invalid_config("SUPABASE_SERVICE_ROLE_KEY", "<hidden>");
        let mut apikey = HeaderValue::from_str(service_key).map_err(|_| bad_key())?;
        apikey.set_sensitive(true);
        headers.insert("apikey", apikey);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", service_key)).map_err(|_| bad_key())?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        Ok(reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS))
            .gzip(true)
            .build()?)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    // ============================================
    // Transport
    // ============================================

    /// Send with retries on throttling and gateway errors. Any other
    /// response, success or not, is handed back as is.
    async fn execute_raw<F>(&self, op: &str, build: F) -> AppResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error = None;

        for attempt in 0..STORE_MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(op, attempt = attempt + 1, delay_ms = delay, "retrying database call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !is_retryable_status(status) {
                        return Ok(resp);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    warn!(op, status = %status, attempt = attempt + 1, "database call throttled or unavailable");
                    last_error = Some(status_error(op, status, &body));
                }
                Err(e) => {
                    let err = AppError::from(e);
                    if !err.code.is_retryable() {
                        return Err(err);
                    }
                    warn!(op, error = %err, attempt = attempt + 1, "database call failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::new(ErrorCode::StoreConnectionFailed, format!("{}: retries exhausted", op))
        }))
    }

    /// Like `execute_raw`, but any non-2xx answer becomes an error
    async fn execute<F>(&self, op: &str, build: F) -> AppResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let resp = self.execute_raw(op, build).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(op, status, &body))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> AppResult<Vec<T>> {
        let url = self.rest_url(table);
        let resp = self
            .execute(table, || self.client.get(&url).query(query))
            .await?;
        Ok(resp.json::<Vec<T>>().await?)
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, rows: &[T]) -> AppResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.rest_url(table);
        for chunk in rows.chunks(STORE_INSERT_CHUNK) {
            self.execute(table, || {
                self.client
                    .post(&url)
                    .header("Prefer", "return=minimal")
                    .json(chunk)
            })
            .await?;
        }
        Ok(())
    }

    /// Exact row count for a filtered table
    async fn count(&self, table: &str, query: &[(&str, String)]) -> AppResult<u64> {
        let url = self.rest_url(table);
        let resp = self
            .execute(table, || {
                self.client
                    .get(&url)
                    .query(query)
                    .query(&[("limit", "1")])
                    .header("Prefer", "count=exact")
            })
            .await?;

        resp.headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::StoreInvalidResponse,
                    format!("{}: missing or malformed Content-Range", table),
                )
            })
    }
}

fn backoff_delay(attempt: u32) -> u64 {
    let base = STORE_BASE_RETRY_MS.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = base.min(STORE_MAX_RETRY_MS);
    let range = (capped * RETRY_JITTER_PERCENT / 100) as i64;
    let jitter: i64 = rand::thread_rng().gen_range(-range..=range);
    (capped as i64 + jitter).max(50) as u64
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn status_error(op: &str, status: StatusCode, body: &str) -> AppError {
    let snippet: String = body.chars().take(300).collect();
    if status == StatusCode::CONFLICT || body.contains("ORDER_CONFLICT") {
        return AppError::conflict(format!("{}: {}", op, snippet));
    }
    let code = match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::StoreRateLimited,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ErrorCode::StoreConnectionFailed
        }
        _ => ErrorCode::StoreRequestFailed,
    };
    AppError::new(code, format!("{} returned {}: {}", op, status, snippet))
}

/// `0-0/42` or `*/0` -> total
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Deserialize)]
struct SaleLineRow {
    sales_order_id: Uuid,
    product_code: String,
    quantity: u32,
    sales_orders: OrderDate,
}

#[derive(Deserialize)]
struct OrderDate {
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GenerateLinkResponse {
    #[serde(default)]
    action_link: Option<String>,
    #[serde(default)]
    properties: Option<LinkProperties>,
}

#[derive(Deserialize)]
struct LinkProperties {
    #[serde(default)]
    action_link: Option<String>,
}

#[async_trait]
impl Store for SupabaseClient {
    async fn list_products(&self) -> AppResult<Vec<Product>> {
        self.select(tables::PRODUCTS, &[("select", "*".to_string()), ("order", "code.asc".to_string())])
            .await
    }

    async fn get_product(&self, code: &str) -> AppResult<Option<Product>> {
        let rows: Vec<Product> = self
            .select(
                tables::PRODUCTS,
                &[("select", "*".to_string()), ("code", format!("eq.{}", code)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_suppliers(&self) -> AppResult<Vec<Supplier>> {
        self.select(tables::SUPPLIERS, &[("select", "*".to_string())]).await
    }

    async fn count_orders_from_ip_since(&self, ip: &str, since: DateTime<Utc>) -> AppResult<u32> {
        let n = self
            .count(
                tables::ORDERS,
                &[
                    ("select", "id".to_string()),
                    ("client_ip", format!("eq.{}", ip)),
                    ("created_at", format!("gte.{}", ts(since))),
                ],
            )
            .await?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    async fn insert_order(&self, order: &Order) -> AppResult<()> {
        self.insert(tables::ORDERS, std::slice::from_ref(order)).await
    }

    async fn get_sales_order(&self, id: Uuid) -> AppResult<Option<SalesOrder>> {
        let rows: Vec<SalesOrder> = self
            .select(
                tables::SALES_ORDERS,
                &[("select", "*".to_string()), ("id", format!("eq.{}", id)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_sales_order_items(&self, sales_order_id: Uuid) -> AppResult<Vec<SalesOrderItem>> {
        self.select(
            tables::SALES_ORDER_ITEMS,
            &[
                ("select", "*".to_string()),
                ("sales_order_id", format!("eq.{}", sales_order_id)),
                ("order", "id.asc".to_string()),
            ],
        )
        .await
    }

    async fn list_sales_orders_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SalesOrder>> {
        self.select(
            tables::SALES_ORDERS,
            &[("select", "*".to_string()), ("created_at", format!("gte.{}", ts(since)))],
        )
        .await
    }

    async fn list_sale_lines_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SaleLine>> {
        let rows: Vec<SaleLineRow> = self
            .select(
                tables::SALES_ORDER_ITEMS,
                &[
                    (
                        "select",
                        "sales_order_id,product_code,quantity,sales_orders!inner(created_at)".to_string(),
                    ),
                    ("sales_orders.created_at", format!("gte.{}", ts(since))),
                    ("sales_orders.status", "neq.cancelled".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| SaleLine {
                sales_order_id: r.sales_order_id,
                product_code: r.product_code,
                quantity: r.quantity,
                sold_at: r.sales_orders.created_at,
            })
            .collect())
    }

    async fn apply_allocation(&self, plan: &AllocationPlan) -> AppResult<()> {
        let url = format!("{}/rest/v1/rpc/allocate_sales_order", self.base_url);
        let body = serde_json::json!({ "plan": plan });
        self.execute("allocate_sales_order", || self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_purchase_orders(&self) -> AppResult<Vec<PurchaseOrder>> {
        self.select(
            tables::PURCHASE_ORDERS,
            &[("select", "*".to_string()), ("order", "created_at.desc".to_string())],
        )
        .await
    }

    async fn insert_purchase_orders(&self, orders: &[PurchaseOrder]) -> AppResult<()> {
        self.insert(tables::PURCHASE_ORDERS, orders).await
    }

    async fn replace_similarities(&self, rows: &[ProductSimilarity]) -> AppResult<()> {
        let url = self.rest_url(tables::PRODUCT_SIMILARITY);
        self.execute(tables::PRODUCT_SIMILARITY, || {
            self.client.delete(&url).query(&[DELETE_ALL_FILTER])
        })
        .await?;
        self.insert(tables::PRODUCT_SIMILARITY, rows).await?;
        info!(rows = rows.len(), "similarity rows replaced");
        Ok(())
    }

    async fn list_similar(&self, code: &str, limit: usize) -> AppResult<Vec<ProductSimilarity>> {
        self.select(
            tables::PRODUCT_SIMILARITY,
            &[
                ("select", "*".to_string()),
                ("product_code", format!("eq.{}", code)),
                ("order", "score.desc,similar_product_code.asc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn list_favorites(&self, user_id: &str) -> AppResult<Vec<UserFavorite>> {
        self.select(
            tables::USER_FAVORITES,
            &[("select", "*".to_string()), ("user_id", format!("eq.{}", user_id))],
        )
        .await
    }

    async fn list_interactions(&self, user_id: &str) -> AppResult<Vec<UserInteraction>> {
        self.select(
            tables::USER_INTERACTIONS,
            &[("select", "*".to_string()), ("user_id", format!("eq.{}", user_id))],
        )
        .await
    }

    async fn insert_interaction(&self, interaction: &UserInteraction) -> AppResult<()> {
        self.insert(tables::USER_INTERACTIONS, std::slice::from_ref(interaction))
            .await
    }

    async fn insert_referral(&self, referral: &Referral) -> AppResult<()> {
        self.insert(tables::REFERRALS, std::slice::from_ref(referral)).await
    }

    async fn table_counts(&self) -> AppResult<Vec<(String, u64)>> {
        let mut out = Vec::with_capacity(tables::ALL.len());
        for table in tables::ALL {
            let n = self.count(table, &[("select", "*".to_string())]).await?;
            out.push((table.to_string(), n));
        }
        Ok(out)
    }
}

#[async_trait]
impl AuthAdmin for SupabaseClient {
    async fn generate_recovery_link(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> AppResult<Option<String>> {
        let url = format!("{}/auth/v1/admin/generate_link", self.base_url);
        let mut body = serde_json::json!({ "type": "recovery", "email": email });
        if let Some(redirect) = redirect_to {
            body["redirect_to"] = serde_json::Value::String(redirect.to_string());
        }

        let resp = self
            .execute_raw("generate_link", || self.client.post(&url).json(&body))
            .await?;
        let status = resp.status();
        // Unknown account
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error("generate_link", status, &text));
        }

        let parsed: GenerateLinkResponse = resp.json().await?;
        let link = parsed
            .action_link
            .or_else(|| parsed.properties.and_then(|p| p.action_link))
            .ok_or_else(|| {
                AppError::new(ErrorCode::StoreInvalidResponse, "generate_link returned no action_link")
            })?;
        Ok(Some(link))
    }
}
