use serde::{Deserialize, Serialize};

/// Placeholder for a field no strategy could resolve.
pub const NOT_INDICATED: &str = "Not indicated";

/// Placeholder written into every data field when the product page could not be fetched.
pub const FETCH_ERROR: &str = "Error fetching page";

/// Export column labels, in output order.
pub const COLUMNS: [&str; 8] = [
    "Product Title",
    "SKU",
    "Seller",
    "Price",
    "Warranty Title",
    "Warranty (Specs)",
    "Warranty Address",
    "Product URL",
];

/// One flat row per scraped product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub title: String,
    pub price: String,
    pub sku: String,
    pub seller: String,
    pub warranty_in_title: String,
    pub warranty_specs: String,
    pub warranty_address: String,
    pub source_url: String,
}

impl ProductRecord {
    pub fn new(source_url: String) -> Self {
        Self {
            title: NOT_INDICATED.to_string(),
            price: NOT_INDICATED.to_string(),
            sku: NOT_INDICATED.to_string(),
            seller: NOT_INDICATED.to_string(),
            warranty_in_title: NOT_INDICATED.to_string(),
            warranty_specs: NOT_INDICATED.to_string(),
            warranty_address: NOT_INDICATED.to_string(),
            source_url,
        }
    }

    pub fn fetch_error(source_url: String) -> Self {
        Self {
            title: FETCH_ERROR.to_string(),
            price: FETCH_ERROR.to_string(),
            sku: FETCH_ERROR.to_string(),
            seller: FETCH_ERROR.to_string(),
            warranty_in_title: FETCH_ERROR.to_string(),
            warranty_specs: FETCH_ERROR.to_string(),
            warranty_address: FETCH_ERROR.to_string(),
            source_url,
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        self.title == FETCH_ERROR
    }

    /// Replace blank or whitespace-only values with the sentinel and trim the rest.
    pub fn sanitized(mut self) -> Self {
        for value in [
            &mut self.title,
            &mut self.price,
            &mut self.sku,
            &mut self.seller,
            &mut self.warranty_in_title,
            &mut self.warranty_specs,
            &mut self.warranty_address,
            &mut self.source_url,
        ] {
            let trimmed = value.trim();
            *value = if trimmed.is_empty() {
                NOT_INDICATED.to_string()
            } else {
                trimmed.to_string()
            };
        }
        self
    }

    /// `(column label, value)` pairs in export order.
    pub fn fields(&self) -> [(&'static str, &str); 8] {
        [
            (COLUMNS[0], self.title.as_str()),
            (COLUMNS[1], self.sku.as_str()),
            (COLUMNS[2], self.seller.as_str()),
            (COLUMNS[3], self.price.as_str()),
            (COLUMNS[4], self.warranty_in_title.as_str()),
            (COLUMNS[5], self.warranty_specs.as_str()),
            (COLUMNS[6], self.warranty_address.as_str()),
            (COLUMNS[7], self.source_url.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_all_sentinel() {
        let record = ProductRecord::new("https://shop.test/p.html".into());
        for (label, value) in record.fields().iter().take(7) {
            assert_eq!(*value, NOT_INDICATED, "{} should default to the sentinel", label);
        }
        assert_eq!(record.source_url, "https://shop.test/p.html");
    }

    #[test]
    fn test_fetch_error_keeps_url() {
        let record = ProductRecord::fetch_error("https://shop.test/broken.html".into());
        assert!(record.is_fetch_error());
        assert_eq!(record.warranty_address, FETCH_ERROR);
        assert_eq!(record.source_url, "https://shop.test/broken.html");
    }

    #[test]
    fn test_sanitized_replaces_blank_values() {
        let mut record = ProductRecord::new("https://shop.test/p.html".into());
        record.title = "   ".into();
        record.price = "  KSh 1,999 \n".into();
        record.sku = String::new();

        let record = record.sanitized();
        assert_eq!(record.title, NOT_INDICATED);
        assert_eq!(record.price, "KSh 1,999");
        assert_eq!(record.sku, NOT_INDICATED);
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = ProductRecord::new("https://shop.test/p.html".into());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("warrantyInTitle").is_some());
        assert!(json.get("sourceUrl").is_some());
    }
}
