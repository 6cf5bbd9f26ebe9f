//! Data-driven scraper configuration.
//!
//! Every selector, keyword and pattern the extractor and the link collector
//! use lives here, so one engine can be pointed at a different storefront by
//! loading a JSON file instead of editing code. All structs use
//! `#[serde(default)]`, which lets a config file override only the parts it
//! names.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Highest configuration schema version this build understands.
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub version: u32,
    /// Region of a product page that heuristics are scoped to. Falls back to
    /// the whole document when nothing matches.
    pub main_content: String,
    pub fields: FieldRules,
    pub links: LinkRules,
    pub limits: Limits,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            main_content: "main[role=main]".to_string(),
            fields: FieldRules::default(),
            links: LinkRules::default(),
            limits: Limits::default(),
        }
    }
}

impl ScraperConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ScraperConfig = serde_json::from_str(json)
            .map_err(|e| ScanError::Config(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ScanError::Other(e.to_string()))
    }

    /// Structural checks that do not need selectors to be compiled.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ScanError::Config(format!(
                "unsupported config version {} (supported: 1..={})",
                self.version, CONFIG_VERSION
            )));
        }
        if self.links.pagination.is_empty() {
            return Err(ScanError::Config("at least one pagination style is required".into()));
        }
        if self.limits.max_pages == 0 {
            return Err(ScanError::Config("max_pages must be at least 1".into()));
        }
        if self.limits.workers == 0 {
            return Err(ScanError::Config("workers must be at least 1".into()));
        }
        if self.limits.page_delay.min_ms > self.limits.page_delay.max_ms {
            return Err(ScanError::Config("page_delay.min_ms exceeds page_delay.max_ms".into()));
        }
        if self.limits.retry.attempts == 0 {
            return Err(ScanError::Config("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Keys the structured-data strategy can read from a product record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredKey {
    Name,
    Price,
    Sku,
    Seller,
    Warranty,
}

/// One way of resolving a field. Strategies are tried in list order and the
/// first accepted, non-empty result wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Read a key from the first structured product record on the page.
    Structured { key: StructuredKey },
    /// Text (or `content` attribute) of the first element matching `css`.
    Selector { css: String },
    /// Find a heading whose text contains `contains`, then read the first
    /// element inside the heading's next sibling matching one of `content`,
    /// trying the selectors in order.
    SectionAfterHeading {
        headings: String,
        contains: String,
        content: Vec<String>,
    },
    /// Value of the first label/value row whose label is exactly one of
    /// `keywords`. Keywords are tried in order over all rows.
    LabelValue { keywords: Vec<String> },
    /// Next sibling of an element whose own text equals `label`.
    LabelSibling { candidates: String, label: String },
    /// Warranty slot of the shared warranty row scan.
    WarrantyRows,
    /// First regex match in the main content text.
    Pattern { regex: String },
    /// Literal `value` when an element matching `css` is present.
    Badge { css: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRule {
    pub strategies: Vec<StrategySpec>,
    /// Candidates matching one of these tokens are discarded.
    pub reject: Vec<String>,
}

impl FieldRule {
    fn of(strategies: Vec<StrategySpec>) -> Self {
        Self {
            strategies,
            reject: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRules {
    pub title: FieldRule,
    pub price: FieldRule,
    pub sku: FieldRule,
    pub seller: FieldRule,
    pub warranty_specs: FieldRule,
    pub warranty_address: FieldRule,
    /// Titles matching this pattern are copied into the warranty-in-title column.
    pub title_warranty_pattern: String,
    /// Row labels containing this go to the warranty address slot. Checked first.
    pub warranty_address_label: String,
    /// Remaining row labels containing this go to the warranty specs slot.
    pub warranty_label: String,
}

impl Default for FieldRules {
    fn default() -> Self {
        use StrategySpec::*;

        Self {
            title: FieldRule::of(vec![
                Structured { key: StructuredKey::Name },
                Selector { css: "h1".into() },
            ]),
            price: FieldRule::of(vec![
                Structured { key: StructuredKey::Price },
                Selector {
                    css: "span.-b, [itemprop=price], .price".into(),
                },
            ]),
            sku: FieldRule::of(vec![
                Structured { key: StructuredKey::Sku },
                Selector { css: "[itemprop=sku]".into() },
                LabelValue {
                    keywords: vec!["sku".into()],
                },
            ]),
            seller: FieldRule {
                strategies: vec![
                    Structured { key: StructuredKey::Seller },
                    SectionAfterHeading {
                        headings: "h2, h3".into(),
                        contains: "seller information".into(),
                        content: vec!["a".into(), "p, div, h3".into()],
                    },
                    LabelValue {
                        keywords: vec!["sold by".into(), "seller".into()],
                    },
                    Badge {
                        css: r#"img[alt*="Jumia Express"]"#.into(),
                        value: "Jumia".into(),
                    },
                ],
                reject: vec!["follow".into()],
            },
            warranty_specs: FieldRule::of(vec![
                Structured { key: StructuredKey::Warranty },
                LabelSibling {
                    candidates: "p, div, span".into(),
                    label: "warranty".into(),
                },
                WarrantyRows,
                Pattern {
                    regex: r"(?i)\b\d+\s?years?.warranty\b".into(),
                },
            ]),
            warranty_address: FieldRule::of(vec![WarrantyRows]),
            title_warranty_pattern: r"(?i)warranty|\d+\s?(yr|yrs|year|years)".into(),
            warranty_address_label: "warranty address".into(),
            warranty_label: "warranty".into(),
        }
    }
}

/// Ways of finding product cards on a listing page, tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkStrategySpec {
    /// First element matching `container`; its direct children of the first
    /// tag in `cards` that has any are the product cards.
    Grid { container: String, cards: Vec<String> },
    /// Every element matching `css` is a product card.
    Cards { css: String },
    /// Every anchor matching `css` is a product link.
    Anchors { css: String },
}

/// How the page number is put into a listing URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pagination {
    /// `category/?page=N`, replacing any existing value for `param`.
    Query { param: String },
    /// `category/page/N/`
    PathSegment { segment: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRules {
    pub strategies: Vec<LinkStrategySpec>,
    /// An href is product-like when it contains one of these (case-insensitive)...
    pub product_href_contains: Vec<String>,
    /// ...or its path ends with one of these.
    pub product_href_suffixes: Vec<String>,
    /// Tried in order for every page until one fetch succeeds.
    pub pagination: Vec<Pagination>,
}

impl Default for LinkRules {
    fn default() -> Self {
        Self {
            strategies: vec![
                LinkStrategySpec::Grid {
                    container: "div[class*='-p-grid'], div.product-list, section.products, \
                                div[class*='products'], div[class*='item']"
                        .into(),
                    cards: vec!["article".into(), "div".into()],
                },
                LinkStrategySpec::Cards {
                    css: "article[class*='prd'], div[class*='product'], div[class*='item']".into(),
                },
                LinkStrategySpec::Anchors {
                    css: "a[href*='product'], a[href$='.html']".into(),
                },
            ],
            product_href_contains: vec!["product".into()],
            product_href_suffixes: vec![".html".into()],
            pagination: vec![
                Pagination::Query { param: "page".into() },
                Pagination::PathSegment { segment: "page".into() },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_ms: 1000,
            max_ms: 2000,
        }
    }
}

impl DelayRange {
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// A uniformly random duration inside the range.
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(fastrand::u64(self.min_ms..=self.max_ms))
    }
}

/// Bounded retry with exponential backoff for the fetch wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling each time up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Hard cap on listing pages per crawl.
    pub max_pages: usize,
    /// Concurrent product fetches.
    pub workers: usize,
    pub page_delay: DelayRange,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    pub user_agents: Vec<String>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_pages: 200,
            workers: 4,
            page_delay: DelayRange::default(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/124.0.0.0 Safari/537.36"
                    .into(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/124.0.0.0 Safari/537.36"
                    .into(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/124.0.0.0 Safari/537.36"
                    .into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScraperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.workers, 4);
        assert_eq!(config.links.pagination.len(), 2);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = ScraperConfig::from_json_str(
            r#"{ "version": 1, "limits": { "max_pages": 7 } }"#,
        )
        .unwrap();
        assert_eq!(config.limits.max_pages, 7);
        assert_eq!(config.limits.workers, 4);
        assert_eq!(config.fields, FieldRules::default());
    }

    #[test]
    fn test_strategy_json_shape() {
        let config = ScraperConfig::from_json_str(
            r#"{
                "fields": {
                    "title": { "strategies": [ { "kind": "selector", "css": "h2.name" } ] }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.fields.title.strategies,
            vec![StrategySpec::Selector { css: "h2.name".into() }]
        );
    }

    #[test]
    fn test_rejects_future_version() {
        let err = ScraperConfig::from_json_str(r#"{ "version": 99 }"#).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_delay() {
        let err = ScraperConfig::from_json_str(
            r#"{ "limits": { "page_delay": { "min_ms": 500, "max_ms": 100 } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("page_delay"));
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = ScraperConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(ScraperConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff(4), Duration::from_millis(10_000));
    }

    #[test]
    fn test_delay_sample_within_range() {
        let range = DelayRange { min_ms: 10, max_ms: 20 };
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(DelayRange::none().sample(), Duration::ZERO);
    }
}
