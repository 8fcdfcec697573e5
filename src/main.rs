//! Medicomp operations CLI
//!
//! Batch jobs that run outside the API: sitemap generation, similarity
//! recompute, forecast and reorder reports, database inspection.

use chrono::Utc;
use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use medicomp::core::{forecast, reorder, similarity, sitemap};
use medicomp::providers::{self, Store};
use medicomp::AppConfig;

#[derive(Parser)]
#[command(name = "medicomp", version, about = "Medicomp back-office jobs")]
struct Cli {
    /// JSON seed for an in-memory store instead of the database platform
    #[arg(long, global = true, env = "MEDICOMP_SEED_FILE")]
    seed: Option<PathBuf>,

    /// Public storefront origin
    #[arg(long, global = true, env = "SITE_URL")]
    site_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write sitemap.xml
    Sitemap {
        /// Output file, stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Recompute the product similarity table
    Similarity,
    /// Print the 30-day demand forecast
    Forecast {
        #[arg(long)]
        json: bool,
    },
    /// Print reorder points
    Reorder {
        /// Also insert draft purchase orders
        #[arg(long)]
        drafts: bool,
        #[arg(long)]
        json: bool,
    },
    /// Row count per table
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let seed = cli.seed.as_ref().map(|p| p.display().to_string());
    let site_url = cli.site_url.clone();
    let config = AppConfig::from_lookup(|key| match key {
        "MEDICOMP_SEED_FILE" if seed.is_some() => seed.clone(),
        "SITE_URL" if site_url.is_some() => site_url.clone(),
        _ => std::env::var(key).ok(),
    })?;
    let backend = providers::connect(&config)?;
    let store = backend.store.as_ref();
    let now = Utc::now();

    match cli.command {
        Command::Sitemap { out } => {
            let products = store.list_products().await?;
            let xml = sitemap::generate(&config.site_url, &products);
            match out {
                Some(path) => {
                    std::fs::write(&path, &xml)?;
                    info!(path = %path.display(), bytes = xml.len(), "sitemap written");
                }
                None => print!("{}", xml),
            }
        }
        Command::Similarity => {
            let run = similarity::recompute(store, None, now).await?;
            println!(
                "products: {}  sale lines: {}  pairs: {}  ({} ms)",
                run.products, run.sale_lines, run.pairs, run.duration_ms
            );
        }
        Command::Forecast { json } => {
            let forecasts = forecast::load_forecasts(store, now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forecasts)?);
            } else {
                println!(
                    "{:<16} {:>6} {:>8} {:>8} {:>6} {:>8}  {}",
                    "product", "stock", "daily", "30d", "trend", "cover", "confidence"
                );
                for f in &forecasts {
                    let cover = f
                        .days_of_cover
                        .map(|d| format!("{:.1}", d))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<16} {:>6} {:>8.2} {:>8} {:>6.2} {:>8}  {:?}",
                        f.product_code, f.stock, f.daily_forecast, f.forecast_30d, f.trend, cover, f.confidence
                    );
                }
            }
        }
        Command::Reorder { drafts, json } => {
            let suggestions = reorder::load_suggestions(store, now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else {
                println!(
                    "{:<16} {:>6} {:>5} {:>7} {:>6} {:>6}  {}",
                    "product", "stock", "lead", "safety", "rop", "order", "reorder"
                );
                for s in &suggestions {
                    println!(
                        "{:<16} {:>6} {:>5} {:>7} {:>6} {:>6}  {}",
                        s.product_code,
                        s.stock,
                        s.lead_time_days,
                        s.safety_stock,
                        s.reorder_point,
                        s.suggested_quantity,
                        if s.needs_reorder { "yes" } else { "" }
                    );
                }
            }
            if drafts {
                let created = reorder::create_drafts(store, now).await?;
                println!("draft purchase orders created: {}", created.len());
            }
        }
        Command::Inspect => {
            for (table, rows) in store.table_counts().await? {
                println!("{:<22} {:>8}", table, rows);
            }
        }
    }

    Ok(())
}
