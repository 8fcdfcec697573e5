//! In-Memory Recommendation Cache
//!
//! Thread-safe TTL cache for "similar products" lookups. Backed by DashMap
//! so concurrent storefront requests never contend on a global lock.
//!
//! - TTL-based expiration (5 minutes default)
//! - Key normalization (product codes are case-insensitive)
//! - Cleared wholesale after every similarity recompute

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::core::recommend::Recommendation;
use crate::utils::constants::DEFAULT_CACHE_TTL_SECS;

/// Cache entry with creation time for TTL checks
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub recommendations: Vec<Recommendation>,
    pub created_at: Instant,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > Duration::from_secs(self.ttl_secs)
    }

    /// Seconds left before expiry
    pub fn remaining_ttl(&self) -> u64 {
        let elapsed = self.created_at.elapsed().as_secs();
        self.ttl_secs.saturating_sub(elapsed)
    }
}

#[derive(Clone)]
pub struct RecommendationCache {
    /// normalized product code -> entry
    store: Arc<DashMap<String, CacheEntry>>,
    ttl_secs: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl Default for RecommendationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL_SECS)
    }

    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl_secs,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn normalize(key: &str) -> String {
        key.trim().to_uppercase()
    }

    /// Key for one product's neighbours at a given limit
    pub fn key(product_code: &str, limit: usize) -> String {
        format!("{}:{}", Self::normalize(product_code), limit)
    }

    /// Returns the cached list while it is still fresh
    pub fn get(&self, key: &str) -> Option<Vec<Recommendation>> {
        let key = Self::normalize(key);

        if let Some(entry) = self.store.get(&key) {
            if entry.is_expired() {
                drop(entry); // release the shard read lock before removing
                self.store.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss (expired)");
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl_remaining = entry.remaining_ttl(), "cache hit");
                Some(entry.recommendations.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache miss");
            None
        }
    }

    pub fn set(&self, key: &str, recommendations: Vec<Recommendation>) {
        let key = Self::normalize(key);
        let entry = CacheEntry {
            recommendations,
            created_at: Instant::now(),
            ttl_secs: self.ttl_secs,
        };
        self.store.insert(key, entry);
    }

    /// Drop expired entries, returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before - self.store.len()
    }

    pub fn clear(&self) {
        let removed = self.store.len();
        self.store.clear();
        info!(removed, "recommendation cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl_secs,
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}
