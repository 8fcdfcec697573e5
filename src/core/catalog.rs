//! Public catalog views

use serde::Serialize;

use crate::models::{AppError, AppResult, Product};
use crate::providers::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    pub code: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl From<&Product> for CatalogItem {
    fn from(p: &Product) -> Self {
        Self {
            code: p.code.clone(),
            name: p.name.clone(),
            category: p.category.clone(),
            price: p.price,
            in_stock: p.is_available(),
            image_url: p.image_url.clone(),
        }
    }
}

/// Non-discontinued products sorted by name, optionally one category
pub fn catalog_view(products: &[Product], category: Option<&str>) -> Vec<CatalogItem> {
    let mut items: Vec<CatalogItem> = products
        .iter()
        .filter(|p| !p.is_discontinued)
        .filter(|p| category.map_or(true, |c| p.category.eq_ignore_ascii_case(c)))
        .map(CatalogItem::from)
        .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.code.cmp(&b.code)));
    items
}

pub async fn list(store: &dyn Store, category: Option<&str>) -> AppResult<Vec<CatalogItem>> {
    Ok(catalog_view(&store.list_products().await?, category))
}

/// One product; discontinued ones read as missing
pub async fn get(store: &dyn Store, code: &str) -> AppResult<CatalogItem> {
    store
        .get_product(code)
        .await?
        .filter(|p| !p.is_discontinued)
        .map(|p| CatalogItem::from(&p))
        .ok_or_else(|| AppError::not_found(format!("Product {} not found", code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(code: &str, name: &str, category: &str, stock: i32, discontinued: bool) -> Product {
        Product {
            code: code.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price: 20.0,
            stock,
            is_discontinued: discontinued,
            supplier_id: None,
            lead_time_days: None,
            image_url: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_catalog_sorted_and_filtered() {
        let products = vec![
            product("3", "Zip sleeve", "sleeves", 1, false),
            product("1", "Ankle sock", "socks", 0, false),
            product("2", "Old sock", "socks", 9, true),
        ];
        let all = catalog_view(&products, None);
        assert_eq!(all.iter().map(|i| i.code.as_str()).collect::<Vec<_>>(), vec!["1", "3"]);
        assert!(!all[0].in_stock);

        let socks = catalog_view(&products, Some("SOCKS"));
        assert_eq!(socks.len(), 1);
    }
}
