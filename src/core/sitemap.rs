//! Sitemap generation
//!
//! sitemaps.org 0.9 `urlset` with the static storefront pages plus one entry
//! per sellable product.

use crate::models::Product;
use crate::utils::constants::{PRODUCT_CHANGEFREQ, PRODUCT_PRIORITY, STATIC_ROUTES};

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    /// Absolute URL, not yet escaped
    pub loc: String,
    /// YYYY-MM-DD
    pub lastmod: Option<String>,
    pub changefreq: &'static str,
    pub priority: &'static str,
}

pub fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Entries for the static routes and every available product
pub fn entries(site_url: &str, products: &[Product]) -> Vec<SitemapEntry> {
    let base = site_url.trim_end_matches('/');
    let mut out: Vec<SitemapEntry> = STATIC_ROUTES
        .iter()
        .map(|&(path, changefreq, priority)| SitemapEntry {
            loc: format!("{}{}", base, path),
            lastmod: None,
            changefreq,
            priority,
        })
        .collect();

    let mut sellable: Vec<&Product> = products.iter().filter(|p| p.is_available()).collect();
    sellable.sort_by(|a, b| a.code.cmp(&b.code));
    out.extend(sellable.into_iter().map(|p| SitemapEntry {
        loc: format!("{}/product/{}", base, urlencoding::encode(&p.code)),
        lastmod: p.updated_at.map(|d| d.format("%Y-%m-%d").to_string()),
        changefreq: PRODUCT_CHANGEFREQ,
        priority: PRODUCT_PRIORITY,
    }));
    out
}

pub fn render(entries: &[SitemapEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for e in entries {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", xml_escape(&e.loc)));
        if let Some(lastmod) = &e.lastmod {
            xml.push_str(&format!("    <lastmod>{}</lastmod>\n", lastmod));
        }
        xml.push_str(&format!("    <changefreq>{}</changefreq>\n", e.changefreq));
        xml.push_str(&format!("    <priority>{}</priority>\n", e.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

pub fn generate(site_url: &str, products: &[Product]) -> String {
    render(&entries(site_url, products))
}
