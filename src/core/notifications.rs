//! Password reset and referral emails

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::intake::{is_valid_email, is_valid_name};
use crate::models::{AppError, AppResult, Referral};
use crate::providers::email::{EmailSender, OutgoingEmail};
use crate::providers::store::{AuthAdmin, Store};

/// Escape user-supplied text for HTML bodies
pub fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif;max-width:560px;margin:auto\">\
         <h2>{}</h2>{}<p style=\"color:#888;font-size:12px\">Medicomp</p></body></html>",
        html_escape(title),
        body
    )
}

pub fn password_reset_email(to: &str, link: &str) -> OutgoingEmail {
    let body = format!(
        "<p>We received a request to reset your password.</p>\
         <p><a href=\"{link}\">Choose a new password</a></p>\
         <p>If you did not ask for this, you can ignore this email.</p>",
        link = html_escape(link)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        html: layout("Password reset", &body),
    }
}

pub fn referral_email(referral: &Referral, site_url: &str) -> OutgoingEmail {
    let link = format!(
        "{}/?ref={}",
        site_url.trim_end_matches('/'),
        urlencoding::encode(&referral.code)
    );
    let body = format!(
        "<p>Hi {referrer},</p>\
         <p>Thanks for recommending us to {referred}. Share your code <strong>{code}</strong> \
         or this link: <a href=\"{link}\">{link}</a></p>",
        referrer = html_escape(&referral.referrer_name),
        referred = html_escape(&referral.referred_name),
        code = html_escape(&referral.code),
        link = html_escape(&link),
    );
    OutgoingEmail {
        to: referral.referrer_email.clone(),
        subject: "Your referral code".to_string(),
        html: layout("Thanks for your referral", &body),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// Redirect for the recovery link. Only URLs on the storefront's own origin
/// are honoured; anything else falls back to `{site}/reset-password`.
pub fn reset_redirect(requested: Option<&str>, site_url: &str) -> String {
    let fallback = format!("{}/reset-password", site_url.trim_end_matches('/'));
    let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) else {
        return fallback;
    };
    match (Url::parse(requested), Url::parse(site_url)) {
        (Ok(target), Ok(site)) if target.origin() == site.origin() => requested.to_string(),
        _ => {
            warn!(redirect = %requested, "ignoring password reset redirect outside the storefront");
            fallback
        }
    }
}

/// Send a reset link if the account exists. The caller answers the same way
/// either way; the bool says whether an email went out.
pub async fn request_password_reset(
    auth: &dyn AuthAdmin,
    mailer: &dyn EmailSender,
    req: &PasswordResetRequest,
    site_url: &str,
) -> AppResult<bool> {
    let email = req.email.trim();
    if !is_valid_email(email) {
        return Err(AppError::validation("email is not a valid email address"));
    }
    let redirect = reset_redirect(req.redirect_to.as_deref(), site_url);

    let link = match auth.generate_recovery_link(email, Some(&redirect)).await? {
        Some(link) => link,
        None => {
            info!("password reset requested for unknown account");
            return Ok(false);
        }
    };
    mailer.send(&password_reset_email(email, &link)).await?;
    Ok(true)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralRequest {
    pub referrer_name: String,
    pub referrer_email: String,
    pub referred_name: String,
    #[serde(default)]
    pub referred_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralReceipt {
    pub referral_id: Uuid,
    pub code: String,
    pub email_sent: bool,
}

/// 8 uppercase hex characters
pub fn referral_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

/// Store the referral and mail the code to the referrer. A mail failure is
/// reported in the receipt, the referral is kept.
pub async fn create_referral(
    store: &dyn Store,
    mailer: &dyn EmailSender,
    req: &ReferralRequest,
    site_url: &str,
    now: DateTime<Utc>,
) -> AppResult<ReferralReceipt> {
    let mut problems = Vec::new();
    if !is_valid_name(&req.referrer_name) {
        problems.push("referrer_name is not a valid name");
    }
    if !is_valid_email(&req.referrer_email) {
        problems.push("referrer_email is not a valid email address");
    }
    if !is_valid_name(&req.referred_name) {
        problems.push("referred_name is not a valid name");
    }
    let referred_email = req
        .referred_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    if referred_email.is_some_and(|e| !is_valid_email(e)) {
        problems.push("referred_email is not a valid email address");
    }
    if !problems.is_empty() {
        return Err(AppError::validation(problems.join("; ")));
    }

    let referral = Referral {
        id: Uuid::new_v4(),
        code: referral_code(),
        referrer_name: req.referrer_name.trim().to_string(),
        referrer_email: req.referrer_email.trim().to_string(),
        referred_name: req.referred_name.trim().to_string(),
        referred_email: referred_email.map(str::to_string),
        status: "pending".to_string(),
        created_at: now,
    };
    store.insert_referral(&referral).await?;

    let email_sent = match mailer.send(&referral_email(&referral, site_url)).await {
        Ok(_) => true,
        Err(e) => {
            warn!(referral = %referral.id, error = %e, "referral email failed");
            false
        }
    };

    Ok(ReferralReceipt {
        referral_id: referral.id,
        code: referral.code,
        email_sent,
    })
}
