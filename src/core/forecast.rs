//! Demand forecast
//!
//! Weighted moving average over the last 7/14/30 days of sales with a trend
//! multiplier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::{AppResult, Product, SaleLine};
use crate::providers::Store;
use crate::utils::constants::{
    FORECAST_WEIGHT_14D, FORECAST_WEIGHT_30D, FORECAST_WEIGHT_7D, FORECAST_WINDOW_DAYS, TREND_MAX,
    TREND_MIN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// From the number of days with at least one sale
    pub fn from_selling_days(days: usize) -> Self {
        match days {
            0..=6 => Self::Low,
            7..=14 => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub product_code: String,
    pub name: String,
    pub stock: i32,
    pub avg_7d: f64,
    pub avg_14d: f64,
    pub avg_30d: f64,
    pub trend: f64,
    pub daily_forecast: f64,
    pub forecast_30d: u32,
    /// `None` when there is no demand
    pub days_of_cover: Option<f64>,
    pub confidence: Confidence,
}

/// Units sold per day, oldest first, last element is `today`
pub fn daily_series(lines: &[SaleLine], product_code: &str, today: NaiveDate) -> Vec<f64> {
    let mut series = vec![0.0; FORECAST_WINDOW_DAYS];
    for line in lines.iter().filter(|l| l.product_code == product_code) {
        let age = (today - line.sold_at.date_naive()).num_days();
        if (0..FORECAST_WINDOW_DAYS as i64).contains(&age) {
            series[FORECAST_WINDOW_DAYS - 1 - age as usize] += f64::from(line.quantity);
        }
    }
    series
}

/// Mean of the last `days` entries
pub fn trailing_average(series: &[f64], days: usize) -> f64 {
    let days = days.min(series.len());
    if days == 0 {
        return 0.0;
    }
    series[series.len() - days..].iter().sum::<f64>() / days as f64
}

/// Population standard deviation
pub fn std_dev(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    let var = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / series.len() as f64;
    var.sqrt()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Ceil to whole units, ignoring float noise from the weighted sum
pub fn ceil_units(v: f64) -> u32 {
    (v - 1e-9).ceil().max(0.0) as u32
}

/// Forecast one product from its daily series
pub fn forecast_from_series(product: &Product, series: &[f64]) -> Forecast {
    let avg_7d = trailing_average(series, 7);
    let avg_14d = trailing_average(series, 14);
    let avg_30d = trailing_average(series, 30);

    let weighted = FORECAST_WEIGHT_7D * avg_7d + FORECAST_WEIGHT_14D * avg_14d + FORECAST_WEIGHT_30D * avg_30d;
    let trend = if avg_30d > 0.0 {
        (avg_7d / avg_30d).clamp(TREND_MIN, TREND_MAX)
    } else {
        1.0
    };
    let daily = weighted * trend;
    let days_of_cover = if daily > 0.0 {
        Some(round2(f64::from(product.stock.max(0)) / daily))
    } else {
        None
    };
    let selling_days = series.iter().filter(|v| **v > 0.0).count();

    Forecast {
        product_code: product.code.clone(),
        name: product.name.clone(),
        stock: product.stock,
        avg_7d: round2(avg_7d),
        avg_14d: round2(avg_14d),
        avg_30d: round2(avg_30d),
        trend: round2(trend),
        daily_forecast: round2(daily),
        forecast_30d: ceil_units(daily * FORECAST_WINDOW_DAYS as f64),
        days_of_cover,
        confidence: Confidence::from_selling_days(selling_days),
    }
}

/// Forecast every non-discontinued product, highest demand first
pub fn forecast_all(products: &[Product], lines: &[SaleLine], now: DateTime<Utc>) -> Vec<Forecast> {
    let today = now.date_naive();
    let mut by_code: HashMap<&str, Vec<SaleLine>> = HashMap::new();
    for line in lines {
        by_code.entry(line.product_code.as_str()).or_default().push(line.clone());
    }

    let mut out: Vec<Forecast> = products
        .iter()
        .filter(|p| !p.is_discontinued)
        .map(|p| {
            let own = by_code.get(p.code.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            forecast_from_series(p, &daily_series(own, &p.code, today))
        })
        .collect();
    out.sort_by(|a, b| {
        b.daily_forecast
            .partial_cmp(&a.daily_forecast)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
    out
}

/// Forecast from the last 30 days of stored sales
pub async fn load_forecasts(store: &dyn Store, now: DateTime<Utc>) -> AppResult<Vec<Forecast>> {
    let products = store.list_products().await?;
    let lines = store
        .list_sale_lines_since(now - chrono::Duration::days(FORECAST_WINDOW_DAYS as i64))
        .await?;
    Ok(forecast_all(&products, &lines, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn product(stock: i32) -> Product {
        Product {
            code: "A".to_string(),
            name: "A".to_string(),
            category: String::new(),
            price: 10.0,
            stock,
            is_discontinued: false,
            supplier_id: None,
            lead_time_days: None,
            image_url: None,
            updated_at: None,
        }
    }

    fn sold(days_ago: i64, quantity: u32, now: DateTime<Utc>) -> SaleLine {
        SaleLine {
            sales_order_id: Uuid::new_v4(),
            product_code: "A".to_string(),
            quantity,
            sold_at: now - chrono::Duration::days(days_ago),
        }
    }

    #[test]
    fn test_series_window() {
        let now = Utc::now();
        let lines = vec![sold(0, 2, now), sold(29, 1, now), sold(30, 5, now)];
        let series = daily_series(&lines, "A", now.date_naive());
        assert_eq!(series.len(), 30);
        assert_eq!(series[29], 2.0);
        assert_eq!(series[0], 1.0);
        assert_eq!(series.iter().sum::<f64>(), 3.0);
    }

    #[test]
    fn test_flat_demand() {
        let series = vec![1.0; 30];
        let f = forecast_from_series(&product(20), &series);
        assert_eq!(f.trend, 1.0);
        assert_eq!(f.daily_forecast, 1.0);
        assert_eq!(f.forecast_30d, 30);
        assert_eq!(f.days_of_cover, Some(20.0));
        assert_eq!(f.confidence, Confidence::High);
    }

    #[test]
    fn test_trend_is_clamped() {
        // Everything sold in the last week
        let mut series = vec![0.0; 30];
        for v in series.iter_mut().skip(23) {
            *v = 3.0;
        }
        let f = forecast_from_series(&product(0), &series);
        assert_eq!(f.trend, TREND_MAX);
        assert_eq!(f.confidence, Confidence::Medium);
    }

    #[test]
    fn test_no_demand() {
        let f = forecast_from_series(&product(5), &[0.0; 30]);
        assert_eq!(f.daily_forecast, 0.0);
        assert_eq!(f.forecast_30d, 0);
        assert!(f.days_of_cover.is_none());
        assert_eq!(f.confidence, Confidence::Low);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(std_dev(&[2.0, 2.0]), 0.0);
        assert!((std_dev(&[0.0, 2.0]) - 1.0).abs() < 1e-9);
    }
}
