//! Product Similarity Calculator
//!
//! Scores every pair of active products by blending:
//! - co-purchase overlap (Jaccard index of the sales orders containing each)
//! - same category
//! - price closeness
//!
//! The whole table is rebuilt on each run. Pairs are pruned per product and
//! then mirrored so `a -> b` exists whenever `b -> a` does.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::models::{AppResult, Product, ProductSimilarity, SaleLine};
use crate::providers::store::Store;
use crate::utils::cache::RecommendationCache;
use crate::utils::constants::{
    MIN_SIMILARITY_SCORE, SIMILARITY_HISTORY_DAYS, SIMILARITY_TOP_K, SIMILARITY_WEIGHT_CATEGORY,
    SIMILARITY_WEIGHT_COPURCHASE, SIMILARITY_WEIGHT_PRICE,
};

/// Jaccard index of two baskets; 0 when both are empty
pub fn jaccard(a: &HashSet<Uuid>, b: &HashSet<Uuid>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// `1 - |a - b| / max(a, b)`, 0 when neither price is positive
pub fn price_closeness(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if !max.is_finite() || max <= 0.0 {
        return 0.0;
    }
    (1.0 - (a - b).abs() / max).clamp(0.0, 1.0)
}

fn pair_score(a: &Product, b: &Product, baskets: &HashMap<&str, HashSet<Uuid>>) -> f64 {
    let empty = HashSet::new();
    let co = jaccard(
        baskets.get(a.code.as_str()).unwrap_or(&empty),
        baskets.get(b.code.as_str()).unwrap_or(&empty),
    );
    let category = if !a.category.is_empty() && a.category.eq_ignore_ascii_case(&b.category) {
        1.0
    } else {
        0.0
    };
    let raw = SIMILARITY_WEIGHT_COPURCHASE * co
        + SIMILARITY_WEIGHT_CATEGORY * category
        + SIMILARITY_WEIGHT_PRICE * price_closeness(a.price, b.price);
    (raw.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

/// Compute the full similarity table
pub fn compute_similarities(
    products: &[Product],
    sale_lines: &[SaleLine],
    now: DateTime<Utc>,
) -> Vec<ProductSimilarity> {
    // Deduplicate by code; discontinued items never get recommended
    let mut active: Vec<&Product> = Vec::new();
    let mut seen = HashSet::new();
    for p in products.iter().filter(|p| !p.is_discontinued) {
        if seen.insert(p.code.as_str()) {
            active.push(p);
        }
    }

    let mut baskets: HashMap<&str, HashSet<Uuid>> = HashMap::new();
    for line in sale_lines {
        baskets
            .entry(line.product_code.as_str())
            .or_default()
            .insert(line.sales_order_id);
    }

    // O(n²) pass, scores kept per product
    let mut neighbours: Vec<Vec<(usize, f64)>> = vec![Vec::new(); active.len()];
    for i in 0..active.len() {
        for j in (i + 1)..active.len() {
            let score = pair_score(active[i], active[j], &baskets);
            if score >= MIN_SIMILARITY_SCORE {
                neighbours[i].push((j, score));
                neighbours[j].push((i, score));
            }
        }
    }

    // Top-k per product, then mirror
    let mut kept: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, list) in neighbours.iter_mut().enumerate() {
        list.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| active[a.0].code.cmp(&active[b.0].code))
        });
        for &(j, score) in list.iter().take(SIMILARITY_TOP_K) {
            kept.insert((i, j), score);
            kept.insert((j, i), score);
        }
    }

    kept.into_iter()
        .filter(|((i, j), _)| i != j)
        .map(|((i, j), score)| ProductSimilarity {
            product_code: active[i].code.clone(),
            similar_product_code: active[j].code.clone(),
            score,
            computed_at: now,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityRun {
    pub products: usize,
    pub sale_lines: usize,
    pub pairs: usize,
    pub duration_ms: u64,
}

/// Recompute and replace the stored table, then drop cached recommendations
pub async fn recompute(
    store: &dyn Store,
    cache: Option<&RecommendationCache>,
    now: DateTime<Utc>,
) -> AppResult<SimilarityRun> {
    let start = Instant::now();
    let products = store.list_products().await?;
    let lines = store
        .list_sale_lines_since(now - chrono::Duration::days(SIMILARITY_HISTORY_DAYS))
        .await?;

    let rows = compute_similarities(&products, &lines, now);
    store.replace_similarities(&rows).await?;
    if let Some(cache) = cache {
        cache.clear();
    }

    let run = SimilarityRun {
        products: products.len(),
        sale_lines: lines.len(),
        pairs: rows.len(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        products = run.products,
        sale_lines = run.sale_lines,
        pairs = run.pairs,
        duration_ms = run.duration_ms,
        "similarity table rebuilt"
    );
    Ok(run)
}
