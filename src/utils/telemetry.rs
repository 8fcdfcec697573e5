//! Telemetry Module
//!
//! Operational counters for the storefront service: how many orders were
//! accepted or turned away, how many sales orders went to backorder, how many
//! emails went out. Exported as JSON/CSV on shutdown.
//!
//! No customer data is stored here: events carry ids, never names or phones.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OrderAccepted,
    OrderRejected,
    OrderRateLimited,
    SalesOrderAllocated,
    BackorderCreated,
    SimilarityRecomputed,
    EmailSent,
    EmailFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderAccepted => "order_accepted",
            Self::OrderRejected => "order_rejected",
            Self::OrderRateLimited => "order_rate_limited",
            Self::SalesOrderAllocated => "sales_order_allocated",
            Self::BackorderCreated => "backorder_created",
            Self::SimilarityRecomputed => "similarity_recomputed",
            Self::EmailSent => "email_sent",
            Self::EmailFailed => "email_failed",
        }
    }
}

/// Single telemetry event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Unix timestamp
    pub timestamp: u64,
    pub kind: EventKind,
    pub latency_ms: u64,
    /// Free-form context (ids only)
    pub context: String,
}

impl TelemetryEvent {
    pub fn new(kind: EventKind, latency_ms: u64, context: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            kind,
            latency_ms,
            context: context.into(),
        }
    }
}

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub total_events: u64,
    pub events_by_kind: HashMap<String, u64>,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
    pub orders_rate_limited: u64,
    pub backorders_created: u64,
    pub avg_latency_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    /// Export as CSV row
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{:.2}\n",
            self.period_start,
            self.period_end,
            self.total_events,
            self.orders_accepted,
            self.orders_rejected,
            self.orders_rate_limited,
            self.backorders_created,
            self.avg_latency_ms,
        )
    }
}

/// Main telemetry collector
pub struct TelemetryCollector {
    /// Event buffer, flushed to disk when full
    events: RwLock<Vec<TelemetryEvent>>,
    total_events: AtomicU64,
    total_latency_ms: AtomicU64,
    counts: RwLock<HashMap<EventKind, u64>>,
    session_start: u64,
    export_dir: PathBuf,
    max_buffer_size: usize,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::with_config(PathBuf::from("./telemetry"), 1000)
    }

    pub fn with_config(export_dir: PathBuf, max_buffer_size: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(max_buffer_size.min(1024))),
            total_events: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            counts: RwLock::new(HashMap::new()),
            session_start: current_timestamp(),
            export_dir,
            max_buffer_size: max_buffer_size.max(1),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(event.latency_ms, Ordering::Relaxed);

        if let Ok(mut counts) = self.counts.write() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }

        if let Ok(mut events) = self.events.write() {
            events.push(event);

            if events.len() >= self.max_buffer_size {
                let to_flush = std::mem::take(&mut *events);
                drop(events); // release lock before I/O
                if let Err(e) = self.flush_events(&to_flush) {
                    tracing::warn!(error = %e, "telemetry flush failed");
                }
            }
        }
    }

    /// Shorthand for events without context
    pub fn record_kind(&self, kind: EventKind, latency_ms: u64) {
        self.record(TelemetryEvent::new(kind, latency_ms, String::new()));
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts
            .read()
            .map(|c| c.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn get_stats(&self) -> TelemetryStats {
        let total_events = self.total_events.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency_ms = if total_events > 0 {
            total_latency as f64 / total_events as f64
        } else {
            0.0
        };

        let events_by_kind = self
            .counts
            .read()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        TelemetryStats {
            total_events,
            events_by_kind,
            orders_accepted: self.count(EventKind::OrderAccepted),
            orders_rejected: self.count(EventKind::OrderRejected),
            orders_rate_limited: self.count(EventKind::OrderRateLimited),
            backorders_created: self.count(EventKind::BackorderCreated),
            avg_latency_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Export current stats to a JSON file
    pub fn export_stats_json(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self
            .export_dir
            .join(format!("stats_{}.json", current_timestamp()));

        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(&path, json)?;

        Ok(path)
    }

    /// Append stats to the CSV history
    pub fn export_stats_csv(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self.export_dir.join("telemetry_history.csv");

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "period_start,period_end,total_events,orders_accepted,orders_rejected,orders_rate_limited,backorders_created,avg_latency_ms")?;
        }

        write!(file, "{}", stats.to_csv_row())?;

        Ok(path)
    }

    /// Flush buffered events (also called on shutdown)
    pub fn flush(&self) -> Result<(), std::io::Error> {
        let to_flush = match self.events.write() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => return Ok(()),
        };
        self.flush_events(&to_flush)
    }

    fn flush_events(&self, events: &[TelemetryEvent]) -> Result<(), std::io::Error> {
        if events.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.export_dir)?;

        let path = self
            .export_dir
            .join(format!("events_{}.jsonl", current_timestamp()));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        for event in events {
            writeln!(file, "{}", serde_json::to_string(event)?)?;
        }

        Ok(())
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
