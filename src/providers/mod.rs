//! Providers Module - External systems
//!
//! Storage seam plus its implementations, and transactional email.

pub mod email;
pub mod memory;
pub mod store;
pub mod supabase;

pub use email::{EmailSender, LogMailer, OutgoingEmail, RecordingMailer, ResendMailer};
pub use memory::{MemoryStore, Seed};
pub use store::{AuthAdmin, Store};
pub use supabase::SupabaseClient;

use std::sync::Arc;
use tracing::info;

use crate::models::{AppConfig, AppError, AppResult};

/// Store and auth admin picked from configuration
pub struct Backend {
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn AuthAdmin>,
}

/// A seed file wins over the platform so local runs never touch production
pub fn connect(config: &AppConfig) -> AppResult<Backend> {
    if let Some(path) = config.seed_file.as_deref() {
        let memory = Arc::new(MemoryStore::from_file(path)?);
        return Ok(Backend {
            store: memory.clone(),
            auth: memory,
        });
    }

    let supabase = config
        .supabase
        .as_ref()
        .ok_or_else(|| AppError::missing_env("SUPABASE_URL"))?;
    let client = Arc::new(SupabaseClient::new(supabase)?);
    info!(url = %supabase.url, "using Supabase store");
    Ok(Backend {
        store: client.clone(),
        auth: client,
    })
}

/// Resend when an API key is configured, otherwise log only
pub fn mailer(config: &AppConfig) -> AppResult<Arc<dyn EmailSender>> {
    match config.resend_api_key.as_deref() {
        Some(key) => Ok(Arc::new(ResendMailer::new(key, config.email_from.clone())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
