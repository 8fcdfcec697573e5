//! WhatsApp handoff links
//!
//! Orders and product questions are finished by chat; these helpers build the
//! prefilled `wa.me` link the storefront redirects to.

use crate::utils::constants::WHATSAPP_BASE_URL;

/// `https://wa.me/{digits}?text={message}`. Any formatting in `number` is dropped.
pub fn deep_link(number: &str, text: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    format!(
        "{}/{}?text={}",
        WHATSAPP_BASE_URL,
        digits,
        urlencoding::encode(text)
    )
}

/// Message confirming a freshly placed storefront order
pub fn order_message(
    order_ref: &str,
    product_name: &str,
    size: Option<&str>,
    quantity: u32,
    total: f64,
) -> String {
    let mut text = format!(
        "Hello! I just placed order {}: {} x {}",
        short_ref(order_ref),
        quantity,
        product_name
    );
    if let Some(size) = size.filter(|s| !s.is_empty()) {
        text.push_str(&format!(" (size {})", size));
    }
    text.push_str(&format!(", total {:.2}.", total));
    text
}

/// Message asking about a product before ordering
pub fn inquiry_message(product_name: &str, product_code: &str, size: Option<&str>) -> String {
    match size.filter(|s| !s.is_empty()) {
        Some(size) => format!(
            "Hello! I'd like to know more about {} ({}) in size {}.",
            product_name, product_code, size
        ),
        None => format!(
            "Hello! I'd like to know more about {} ({}).",
            product_name, product_code
        ),
    }
}

fn short_ref(order_ref: &str) -> &str {
    order_ref.get(..8).unwrap_or(order_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_link_strips_formatting_and_encodes() {
        let link = deep_link("+34 (600) 123-456", "Hi & bye");
        assert_eq!(link, "https://wa.me/34600123456?text=Hi%20%26%20bye");
    }

    #[test]
    fn test_order_message() {
        let msg = order_message("0123456789abcdef", "Knee sock", Some("M"), 2, 91.0);
        assert_eq!(msg, "Hello! I just placed order 01234567: 2 x Knee sock (size M), total 91.00.");
    }

    #[test]
    fn test_inquiry_without_size() {
        let msg = inquiry_message("Sleeve", "MC-9", None);
        assert!(msg.contains("Sleeve (MC-9)."));
    }
}
