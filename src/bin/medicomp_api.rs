//! Medicomp API Server
//!
//! JSON API for the storefront and the back-office
//!
//! Usage:
//!   cargo run --bin medicomp_api
//!
//! Environment:
//!   PORT / MEDICOMP_PORT        - Server port (default: 8080)
//!   MEDICOMP_HOST               - Server host (default: 0.0.0.0)
//!   SUPABASE_URL                - Database platform URL
//!   SUPABASE_SERVICE_ROLE_KEY   - Service key for the platform
//!   MEDICOMP_SEED_FILE          - JSON seed for an in-memory store instead
//!   ADMIN_API_KEY               - Enables /v1/admin
//!   RUST_LOG                    - Log level (default: info)

use medicomp::api::{create_router, start_cleanup_task, AppState};
use medicomp::providers;
use medicomp::utils::constants::APP_VERSION;
use medicomp::{AppConfig, TelemetryCollector};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    print_banner();

    let config = AppConfig::from_env()?;
    let backend = providers::connect(&config)?;
    let mailer = providers::mailer(&config)?;
    if config.resend_api_key.is_none() {
        warn!("RESEND_API_KEY not set, emails are only logged");
    }
    if config.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY not set, /v1/admin rejects every request");
    }

    // Initialize telemetry
    let telemetry = Arc::new(TelemetryCollector::new());
    let telemetry_for_shutdown = telemetry.clone();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let state = Arc::new(AppState::new(
        config,
        backend.store,
        backend.auth,
        mailer,
        telemetry,
    ));

    // Rate limiter and cache housekeeping
    start_cleanup_task(state.clone());
    info!("Background cleanup task started");

    let app = create_router(state);

    info!("Medicomp API starting on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /v1/products                      - Catalog");
    info!("  POST /v1/orders                        - Order intake");
    info!("  GET  /v1/products/:code/recommendations - Similar products");
    info!("  POST /v1/admin/sales-orders/:id/allocate - Cross-docking allocation");
    info!("  GET  /v1/admin/reorder                 - Reorder points");
    info!("  GET  /sitemap.xml                      - Sitemap");
    info!("  GET  /health                           - Health check");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    // Graceful shutdown sequence
    info!("Shutdown signal received, cleaning up...");

    let stats = telemetry_for_shutdown.get_stats();
    info!(
        events = stats.total_events,
        orders_accepted = stats.orders_accepted,
        orders_rejected = stats.orders_rejected,
        backorders = stats.backorders_created,
        "Final telemetry"
    );

    if let Err(e) = telemetry_for_shutdown.flush() {
        warn!("Failed to flush telemetry events: {}", e);
    }
    match telemetry_for_shutdown.export_stats_json() {
        Ok(path) => info!("Stats exported to: {}", path.display()),
        Err(e) => warn!("Failed to export stats: {}", e),
    }
    if let Err(e) = telemetry_for_shutdown.export_stats_csv() {
        warn!("Failed to export CSV stats: {}", e);
    }

    info!("Medicomp API shutdown complete");

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    +--------------------------------------------------------------+
    |                                                              |
    |   M E D I C O M P                                            |
    |                                                              |
    |   Compression garments storefront API   v{:<20}|
    |   orders / cross-docking / recommendations / forecast       |
    |                                                              |
    +--------------------------------------------------------------+
    "#,
        APP_VERSION
    );
}
