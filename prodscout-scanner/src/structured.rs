//! Reader for JSON-LD product records embedded in a page.

use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});

/// A product-shaped JSON object recovered from a structured metadata block.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord(Map<String, Value>);

impl StructuredRecord {
    pub fn new(object: Map<String, Value>) -> Self {
        Self(object)
    }

    pub fn name(&self) -> Option<String> {
        self.0.get("name").and_then(scalar_text)
    }

    pub fn sku(&self) -> Option<String> {
        self.0
            .get("sku")
            .and_then(scalar_text)
            .or_else(|| self.0.get("mpn").and_then(scalar_text))
    }

    pub fn price(&self) -> Option<String> {
        self.offers().find_map(|offer| {
            offer
                .get("price")
                .and_then(scalar_text)
                .or_else(|| offer.get("lowPrice").and_then(scalar_text))
        })
    }

    pub fn seller(&self) -> Option<String> {
        self.offers().find_map(|offer| match offer.get("seller") {
            Some(Value::Object(seller)) => seller.get("name").and_then(scalar_text),
            Some(other) => scalar_text(other),
            None => None,
        })
    }

    /// Warranty text from the record itself or from its offers.
    pub fn warranty(&self) -> Option<String> {
        self.0
            .get("warranty")
            .and_then(warranty_text)
            .or_else(|| self.offers().find_map(|offer| offer.get("warranty").and_then(warranty_text)))
    }

    /// `offers` may be a single object or a list of them.
    fn offers(&self) -> impl Iterator<Item = &Map<String, Value>> {
        let offers: Vec<&Map<String, Value>> = match self.0.get("offers") {
            Some(Value::Object(offer)) => vec![offer],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        };
        offers.into_iter()
    }
}

/// Collect every product-like record from the page's JSON-LD blocks.
///
/// Each block is parsed on its own; a block that is not valid JSON is skipped
/// and the rest of the page is still read. Records are returned in document
/// order, so the first entry is the one the extractor prefers.
pub fn read_structured_records(document: &Html) -> Vec<StructuredRecord> {
    let mut records = Vec::new();

    for (index, script) in document.select(&LD_JSON).enumerate() {
        let text: String = script.text().collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(value) => collect_products(&value, &mut records),
            Err(e) => {
                debug!("Skipping malformed JSON-LD block #{}: {}", index, e);
            }
        }
    }

    records
}

/// Walk the known nesting shapes: direct record, top-level list, `@graph`
/// container and `mainEntity` attachment.
fn collect_products(value: &Value, out: &mut Vec<StructuredRecord>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_products(item, out);
            }
        }
        Value::Object(object) => {
            if looks_like_product(object) {
                out.push(StructuredRecord::new(object.clone()));
            }
            if let Some(graph) = object.get("@graph") {
                collect_products(graph, out);
            }
            if let Some(entity) = object.get("mainEntity") {
                collect_products(entity, out);
            }
        }
        _ => {}
    }
}

fn looks_like_product(object: &Map<String, Value>) -> bool {
    let typed_product = match object.get("@type") {
        Some(Value::String(t)) => is_product_type(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_product_type),
        _ => false,
    };

    if typed_product {
        return object.contains_key("name") || object.contains_key("offers");
    }

    object.contains_key("name") && object.contains_key("offers")
}

fn is_product_type(t: &str) -> bool {
    let t = t.rsplit('/').next().unwrap_or(t);
    t.eq_ignore_ascii_case("Product") || t.eq_ignore_ascii_case("ProductModel")
}

/// Strings are trimmed, numbers are rendered as written. Anything else is not text.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn warranty_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(promise) => ["description", "name", "durationOfWarranty"]
            .iter()
            .find_map(|key| match promise.get(*key) {
                Some(Value::Object(duration)) => {
                    let amount = duration.get("value").and_then(scalar_text)?;
                    let unit = duration
                        .get("unitText")
                        .or_else(|| duration.get("unitCode"))
                        .and_then(scalar_text)
                        .unwrap_or_default();
                    Some(format!("{} {}", amount, unit).trim().to_string())
                }
                Some(other) => scalar_text(other),
                None => None,
            }),
        other => scalar_text(other),
    }
}
