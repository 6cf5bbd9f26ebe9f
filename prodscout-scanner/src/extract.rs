//! Field extraction for product pages.
//!
//! Every output field has an ordered list of strategies compiled from
//! [`ScraperConfig`]. Strategies run in order and the first one producing a
//! non-empty value the field does not reject wins; later strategies are never
//! consulted. A field nothing resolves keeps the [`NOT_INDICATED`] sentinel.

use crate::config::{FieldRule, ScraperConfig, StrategySpec, StructuredKey};
use crate::error::{Result, ScanError};
use crate::record::{NOT_INDICATED, ProductRecord};
use crate::structured::{StructuredRecord, read_structured_records};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::cell::OnceCell;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static LABEL_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr, li, dt").expect("static selector"));

/// Everything known about one fetched product page. Built per fetch and
/// dropped once its record has been produced.
pub struct ExtractionContext {
    document: Html,
    records: Vec<StructuredRecord>,
    url: Url,
}

impl ExtractionContext {
    pub fn parse(html: &str, url: Url) -> Self {
        let document = Html::parse_document(html);
        let records = read_structured_records(&document);
        Self { document, records, url }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    pub fn records(&self) -> &[StructuredRecord] {
        &self.records
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Price,
    Sku,
    Seller,
    WarrantySpecs,
    WarrantyAddress,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Title => "title",
            Field::Price => "price",
            Field::Sku => "sku",
            Field::Seller => "seller",
            Field::WarrantySpecs => "warranty specs",
            Field::WarrantyAddress => "warranty address",
        };
        f.write_str(name)
    }
}

enum Strategy {
    Structured(StructuredKey),
    Css(Selector),
    SectionAfterHeading {
        headings: Selector,
        contains: String,
        content: Vec<Selector>,
    },
    LabelValue(Vec<String>),
    LabelSibling { candidates: Selector, label: String },
    WarrantyRows,
    Pattern(Regex),
    Badge { css: Selector, value: String },
}

impl Strategy {
    fn kind(&self) -> &'static str {
        match self {
            Strategy::Structured(_) => "structured",
            Strategy::Css(_) => "selector",
            Strategy::SectionAfterHeading { .. } => "section_after_heading",
            Strategy::LabelValue(_) => "label_value",
            Strategy::LabelSibling { .. } => "label_sibling",
            Strategy::WarrantyRows => "warranty_rows",
            Strategy::Pattern(_) => "pattern",
            Strategy::Badge { .. } => "badge",
        }
    }
}

struct FieldResolver {
    field: Field,
    strategies: Vec<Strategy>,
    reject: Vec<String>,
}

impl FieldResolver {
    fn compile(field: Field, rule: &FieldRule) -> Result<Self> {
        let strategies = rule
            .strategies
            .iter()
            .map(compile_strategy)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            field,
            strategies,
            reject: rule.reject.iter().map(|r| r.trim().to_lowercase()).collect(),
        })
    }

    /// A rejected candidate is either the token itself or starts with it as a
    /// separate word ("Follow", "follow this seller").
    fn rejects(&self, candidate: &str) -> bool {
        let lower = candidate.to_lowercase();
        self.reject.iter().any(|token| {
            lower == *token
                || lower
                    .strip_prefix(token.as_str())
                    .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        })
    }
}

fn compile_strategy(spec: &StrategySpec) -> Result<Strategy> {
    Ok(match spec {
        StrategySpec::Structured { key } => Strategy::Structured(*key),
        StrategySpec::Selector { css } => Strategy::Css(compile_selector(css)?),
        StrategySpec::SectionAfterHeading {
            headings,
            contains,
            content,
        } => Strategy::SectionAfterHeading {
            headings: compile_selector(headings)?,
            contains: contains.to_lowercase(),
            content: content
                .iter()
                .map(|css| compile_selector(css))
                .collect::<Result<Vec<_>>>()?,
        },
        StrategySpec::LabelValue { keywords } => {
            Strategy::LabelValue(keywords.iter().map(|k| k.to_lowercase()).collect())
        }
        StrategySpec::LabelSibling { candidates, label } => Strategy::LabelSibling {
            candidates: compile_selector(candidates)?,
            label: label.to_lowercase(),
        },
        StrategySpec::WarrantyRows => Strategy::WarrantyRows,
        StrategySpec::Pattern { regex } => Strategy::Pattern(compile_regex(regex)?),
        StrategySpec::Badge { css, value } => Strategy::Badge {
            css: compile_selector(css)?,
            value: value.clone(),
        },
    })
}

pub(crate) fn compile_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::Config(format!("invalid selector '{}': {:?}", css, e)))
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ScanError::Config(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Resolves the product fields of a page through the configured strategies.
pub struct ProductExtractor {
    main_content: Selector,
    title: FieldResolver,
    price: FieldResolver,
    sku: FieldResolver,
    seller: FieldResolver,
    warranty_specs: FieldResolver,
    warranty_address: FieldResolver,
    title_warranty: Regex,
    warranty_address_label: String,
    warranty_label: String,
}

impl ProductExtractor {
    pub fn new() -> Result<Self> {
        Self::from_config(&ScraperConfig::default())
    }

    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        let fields = &config.fields;
        Ok(Self {
            main_content: compile_selector(&config.main_content)?,
            title: FieldResolver::compile(Field::Title, &fields.title)?,
            price: FieldResolver::compile(Field::Price, &fields.price)?,
            sku: FieldResolver::compile(Field::Sku, &fields.sku)?,
            seller: FieldResolver::compile(Field::Seller, &fields.seller)?,
            warranty_specs: FieldResolver::compile(Field::WarrantySpecs, &fields.warranty_specs)?,
            warranty_address: FieldResolver::compile(
                Field::WarrantyAddress,
                &fields.warranty_address,
            )?,
            title_warranty: compile_regex(&fields.title_warranty_pattern)?,
            warranty_address_label: fields.warranty_address_label.to_lowercase(),
            warranty_label: fields.warranty_label.to_lowercase(),
        })
    }

    /// Parse `html` and extract its record in one go.
    pub fn extract_html(&self, html: &str, url: Url) -> ProductRecord {
        let context = ExtractionContext::parse(html, url);
        self.extract(&context)
    }

    pub fn extract(&self, context: &ExtractionContext) -> ProductRecord {
        let document = context.document();
        let scope = document
            .select(&self.main_content)
            .next()
            .unwrap_or_else(|| document.root_element());
        let page = PageScan::new(scope);

        let mut source = context.url().clone();
        source.set_fragment(None);
        let mut record = ProductRecord::new(source.to_string());

        if let Some(title) = self.resolve(&self.title, context, &page) {
            if self.title_warranty.is_match(&title) {
                record.warranty_in_title = title.clone();
            }
            record.title = title;
        }
        if let Some(price) = self.resolve(&self.price, context, &page) {
            record.price = price;
        }
        if let Some(sku) = self.resolve(&self.sku, context, &page) {
            record.sku = sku;
        }
        if let Some(seller) = self.resolve(&self.seller, context, &page) {
            record.seller = seller;
        }
        if let Some(specs) = self.resolve(&self.warranty_specs, context, &page) {
            record.warranty_specs = specs;
        }
        if let Some(address) = self.resolve(&self.warranty_address, context, &page) {
            record.warranty_address = address;
        }

        record.sanitized()
    }

    fn resolve(
        &self,
        resolver: &FieldResolver,
        context: &ExtractionContext,
        page: &PageScan<'_>,
    ) -> Option<String> {
        for (index, strategy) in resolver.strategies.iter().enumerate() {
            let Some(candidate) = self.apply(strategy, resolver.field, context, page) else {
                continue;
            };
            let candidate = collapse_whitespace(&candidate);
            if candidate.is_empty() || candidate == NOT_INDICATED {
                continue;
            }
            if resolver.rejects(&candidate) {
                debug!("Rejected {} candidate '{}' from {}", resolver.field, candidate, strategy.kind());
                continue;
            }
            debug!("Resolved {} via strategy #{} ({})", resolver.field, index, strategy.kind());
            return Some(candidate);
        }
        None
    }

    fn apply(
        &self,
        strategy: &Strategy,
        field: Field,
        context: &ExtractionContext,
        page: &PageScan<'_>,
    ) -> Option<String> {
        match strategy {
            Strategy::Structured(key) => {
                let record = context.records().first()?;
                match key {
                    StructuredKey::Name => record.name(),
                    StructuredKey::Price => record.price(),
                    StructuredKey::Sku => record.sku(),
                    StructuredKey::Seller => record.seller(),
                    StructuredKey::Warranty => record.warranty(),
                }
            }
            Strategy::Css(selector) => page.scope.select(selector).find_map(|el| {
                let text = element_text(el);
                if !text.is_empty() {
                    return Some(text);
                }
                el.value().attr("content").map(str::to_string)
            }),
            Strategy::SectionAfterHeading {
                headings,
                contains,
                content,
            } => {
                let heading = page
                    .scope
                    .select(headings)
                    .find(|h| element_text(*h).to_lowercase().contains(contains.as_str()))?;
                let section = next_element_sibling(heading)?;
                content
                    .iter()
                    .find_map(|selector| section.select(selector).next())
                    .map(element_text)
            }
            Strategy::LabelValue(keywords) => keywords.iter().find_map(|keyword| {
                page.rows()
                    .iter()
                    .find(|row| row.label == *keyword)
                    .map(|row| row.value.clone())
            }),
            Strategy::LabelSibling { candidates, label } => page
                .scope
                .select(candidates)
                .find(|el| element_text(*el).to_lowercase() == *label)
                .and_then(next_element_sibling)
                .map(element_text),
            Strategy::WarrantyRows => {
                let slots = page.warranty(&self.warranty_address_label, &self.warranty_label);
                match field {
                    Field::WarrantySpecs => slots.specs.clone(),
                    Field::WarrantyAddress => slots.address.clone(),
                    _ => None,
                }
            }
            Strategy::Pattern(regex) => regex
                .find(page.text())
                .map(|m| m.as_str().to_string()),
            Strategy::Badge { css, value } => {
                page.scope.select(css).next().map(|_| value.clone())
            }
        }
    }
}

/// A label/value pair found in a table row, list item or definition list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    /// Lowercased label text.
    pub label: String,
    pub value: String,
}

#[derive(Debug, Default)]
struct WarrantySlots {
    specs: Option<String>,
    address: Option<String>,
}

/// Lazily computed, per-page scan results shared by all field resolvers.
struct PageScan<'a> {
    scope: ElementRef<'a>,
    rows: OnceCell<Vec<LabelRow>>,
    warranty: OnceCell<WarrantySlots>,
    text: OnceCell<String>,
}

impl<'a> PageScan<'a> {
    fn new(scope: ElementRef<'a>) -> Self {
        Self {
            scope,
            rows: OnceCell::new(),
            warranty: OnceCell::new(),
            text: OnceCell::new(),
        }
    }

    fn rows(&self) -> &[LabelRow] {
        self.rows.get_or_init(|| label_rows(self.scope))
    }

    fn text(&self) -> &str {
        self.text.get_or_init(|| element_text(self.scope))
    }

    /// Single pass over the label rows filling both warranty slots. The
    /// address label is tested first because it also contains the plain
    /// warranty label; each slot keeps its first value.
    fn warranty(&self, address_label: &str, warranty_label: &str) -> &WarrantySlots {
        self.warranty.get_or_init(|| {
            let mut slots = WarrantySlots::default();
            for row in self.rows() {
                if !address_label.is_empty() && row.label.contains(address_label) {
                    if slots.address.is_none() {
                        slots.address = Some(row.value.clone());
                    }
                } else if !warranty_label.is_empty()
                    && row.label.contains(warranty_label)
                    && slots.specs.is_none()
                {
                    slots.specs = Some(row.value.clone());
                }
            }
            slots
        })
    }
}

/// Collect label/value rows under `scope` in document order.
pub fn label_rows(scope: ElementRef<'_>) -> Vec<LabelRow> {
    let mut rows = Vec::new();

    for element in scope.select(&LABEL_ROWS) {
        let pair = match element.value().name() {
            "tr" => table_row(element),
            "li" => list_item(element),
            "dt" => definition_term(element),
            _ => None,
        };

        if let Some((label, value)) = pair
            && !label.is_empty()
            && !value.is_empty()
        {
            rows.push(LabelRow {
                label: label.to_lowercase(),
                value,
            });
        }
    }

    rows
}

fn table_row(row: ElementRef<'_>) -> Option<(String, String)> {
    let cells: Vec<ElementRef<'_>> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect();

    match cells.as_slice() {
        [] => None,
        [single] => split_label(&element_text(*single)),
        [label, rest @ ..] => {
            let value = rest.iter().map(|c| element_text(*c)).collect::<Vec<_>>().join(" ");
            Some((trim_label(&element_text(*label)), collapse_whitespace(&value)))
        }
    }
}

fn list_item(item: ElementRef<'_>) -> Option<(String, String)> {
    let text = element_text(item);
    if let Some(pair) = split_label(&text) {
        return Some(pair);
    }

    // <li><strong>Seller</strong> Acme</li>
    let first = item.children().filter_map(ElementRef::wrap).next()?;
    if !matches!(first.value().name(), "strong" | "b" | "span" | "label") {
        return None;
    }
    let label = element_text(first);
    let value = text.strip_prefix(label.as_str())?.trim().to_string();
    Some((trim_label(&label), value))
}

fn definition_term(term: ElementRef<'_>) -> Option<(String, String)> {
    let definition = next_element_sibling(term).filter(|el| el.value().name() == "dd")?;
    Some((trim_label(&element_text(term)), element_text(definition)))
}

fn split_label(text: &str) -> Option<(String, String)> {
    let (label, value) = text.split_once(':')?;
    Some((trim_label(label), value.trim().to_string()))
}

fn trim_label(label: &str) -> String {
    label.trim().trim_end_matches(':').trim().to_string()
}

fn next_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// Descendant text joined with single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
