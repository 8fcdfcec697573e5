//! Recommendations
//!
//! Reads the precomputed similarity table. Product pages get their nearest
//! neighbours; signed-in users get a KNN blend seeded by what they favourited
//! or interacted with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{AppError, AppResult, InteractionKind, Product, UserInteraction};
use crate::providers::store::Store;
use crate::utils::cache::RecommendationCache;
use crate::utils::constants::{DEFAULT_RECOMMENDATION_LIMIT, MAX_RECOMMENDATION_LIMIT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_code: String,
    pub name: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub score: f64,
}

impl Recommendation {
    fn from_product(p: &Product, score: f64) -> Self {
        Self {
            product_code: p.code.clone(),
            name: p.name.clone(),
            price: p.price,
            image_url: p.image_url.clone(),
            score: (score * 10_000.0).round() / 10_000.0,
        }
    }
}

/// Clamp a caller-supplied limit into 1..=MAX
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)
        .clamp(1, MAX_RECOMMENDATION_LIMIT)
}

/// Similar products to `code`, available ones only
pub async fn for_product(
    store: &dyn Store,
    cache: &RecommendationCache,
    code: &str,
    limit: Option<usize>,
) -> AppResult<Vec<Recommendation>> {
    let limit = clamp_limit(limit);
    let key = RecommendationCache::key(code, limit);
    if let Some(hit) = cache.get(&key) {
        return Ok(hit);
    }

    if store.get_product(code).await?.is_none() {
        return Err(AppError::not_found(format!("Product {} not found", code)));
    }

    // Over-fetch: some neighbours may be out of stock
    let similar = store.list_similar(code, MAX_RECOMMENDATION_LIMIT * 2).await?;
    let catalog = catalog_by_code(store.list_products().await?);

    let recs: Vec<Recommendation> = similar
        .iter()
        .filter_map(|s| {
            catalog
                .get(&s.similar_product_code)
                .filter(|p| p.is_available())
                .map(|p| Recommendation::from_product(p, s.score))
        })
        .take(limit)
        .collect();

    cache.set(&key, recs.clone());
    Ok(recs)
}

/// Seed weights from favourites and interactions
pub fn user_seeds(
    favorites: &[String],
    interactions: &[UserInteraction],
) -> HashMap<String, f64> {
    let mut seeds: HashMap<String, f64> = HashMap::new();
    for code in favorites {
        *seeds.entry(code.clone()).or_insert(0.0) += InteractionKind::Favorite.weight();
    }
    for i in interactions {
        *seeds.entry(i.product_code.clone()).or_insert(0.0) += i.kind.weight();
    }
    seeds
}

/// Personal recommendations for one user
pub async fn for_user(
    store: &dyn Store,
    user_id: &str,
    limit: Option<usize>,
) -> AppResult<Vec<Recommendation>> {
    let limit = clamp_limit(limit);
    let favorites: Vec<String> = store
        .list_favorites(user_id)
        .await?
        .into_iter()
        .map(|f| f.product_code)
        .collect();
    let interactions = store.list_interactions(user_id).await?;
    let seeds = user_seeds(&favorites, &interactions);
    if seeds.is_empty() {
        debug!(user_id, "no seeds for personal recommendations");
        return Ok(Vec::new());
    }

    let mut scores: HashMap<String, f64> = HashMap::new();
    for (seed, weight) in &seeds {
        for s in store.list_similar(seed, MAX_RECOMMENDATION_LIMIT).await? {
            if seeds.contains_key(&s.similar_product_code) {
                continue;
            }
            *scores.entry(s.similar_product_code).or_insert(0.0) += weight * s.score;
        }
    }

    let catalog = catalog_by_code(store.list_products().await?);
    let mut recs: Vec<Recommendation> = scores
        .iter()
        .filter_map(|(code, score)| {
            catalog
                .get(code)
                .filter(|p| p.is_available())
                .map(|p| Recommendation::from_product(p, *score))
        })
        .collect();
    recs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
    recs.truncate(limit);
    Ok(recs)
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionRequest {
    pub user_id: String,
    pub product_code: String,
    pub kind: InteractionKind,
}

/// Store a user interaction; the product must exist
pub async fn record_interaction(
    store: &dyn Store,
    req: &InteractionRequest,
    now: DateTime<Utc>,
) -> AppResult<UserInteraction> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() || user_id.len() > 64 {
        return Err(AppError::validation("user_id must be 1-64 characters"));
    }
    if store.get_product(&req.product_code).await?.is_none() {
        return Err(AppError::not_found(format!("Product {} not found", req.product_code)));
    }
    let interaction = UserInteraction {
        user_id: user_id.to_string(),
        product_code: req.product_code.clone(),
        kind: req.kind,
        created_at: now,
    };
    store.insert_interaction(&interaction).await?;
    Ok(interaction)
}

fn catalog_by_code(products: Vec<Product>) -> HashMap<String, Product> {
    products.into_iter().map(|p| (p.code.clone(), p)).collect()
}
