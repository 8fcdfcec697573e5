//! Transactional email
//!
//! `ResendMailer` posts to the Resend HTTP API. Without an API key the
//! service falls back to `LogMailer`, which only writes the message to the log.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{DEFAULT_STORE_TIMEOUT_SECS, RESEND_API_URL, USER_AGENT as USER_AGENT_CONST};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns the provider's message id when it gives one
    async fn send(&self, email: &OutgoingEmail) -> AppResult<Option<String>>;
}

// ============================================
// Resend
// ============================================

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

pub struct ResendMailer {
    client: reqwest::Client,
    base_url: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: &str, from: impl Into<String>) -> AppResult<Self> {
        Self::with_base_url(api_key, from, RESEND_API_URL)
    }

    /// Point at another host (tests use a mock server)
    pub fn with_base_url(api_key: &str, from: impl Into<String>, base_url: &str) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| AppError::invalid_config("RESEND_API_KEY", "<hidden>"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl EmailSender for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<Option<String>> {
        let payload = ResendPayload {
            from: &self.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::with_source(ErrorCode::EmailSendFailed, "Email API unreachable", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "email API rejected message");
            return Err(AppError::new(
                ErrorCode::EmailSendFailed,
                format!("Email API returned {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let parsed: ResendResponse = response
            .json()
            .await
            .map_err(|e| AppError::with_source(ErrorCode::EmailSendFailed, "Unreadable email API response", e))?;
        info!(id = ?parsed.id, subject = %email.subject, "email sent");
        Ok(parsed.id)
    }
}

// ============================================
// Fallbacks
// ============================================

/// Logs instead of sending
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<Option<String>> {
        info!(subject = %email.subject, bytes = email.html.len(), "email API not configured, message logged only");
        Ok(None)
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailer whose every send fails
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<Option<String>> {
        if self.fail {
            return Err(AppError::new(ErrorCode::EmailSendFailed, "recording mailer set to fail"));
        }
        self.sent
            .lock()
            .map_err(|_| AppError::internal("mailer lock poisoned"))?
            .push(email.clone());
        Ok(None)
    }
}
