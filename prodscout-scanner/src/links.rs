//! Product link collection over a paginated category listing.

use crate::config::{DelayRange, LinkRules, LinkStrategySpec, Pagination, ScraperConfig};
use crate::error::{Result, ScanError};
use crate::extract::compile_selector;
use crate::fetch::Fetch;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// Deduplicated product URLs gathered during one crawl, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the link was not already present.
    pub fn insert(&mut self, link: String) -> bool {
        if self.seen.contains(&link) {
            return false;
        }
        self.seen.insert(link.clone());
        self.ordered.push(link);
        true
    }

    pub fn contains(&self, link: &str) -> bool {
        self.seen.contains(link)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ordered.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

impl FromIterator<String> for LinkSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for link in iter {
            set.insert(link);
        }
        set
    }
}

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every pagination style failed to fetch the page.
    FetchFailed,
    /// The page had no product links at all.
    NoLinks,
    /// The page only repeated links already collected.
    NoNewLinks,
    PageLimit,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::FetchFailed => "fetch_failed",
            StopReason::NoLinks => "no_links",
            StopReason::NoNewLinks => "no_new_links",
            StopReason::PageLimit => "page_limit",
            StopReason::Cancelled => "cancelled",
        }
    }
}

/// Emitted after every listing page that was fetched.
#[derive(Debug, Clone)]
pub struct PageReport {
    pub page: usize,
    pub url: String,
    pub found: usize,
    pub new: usize,
    pub total: usize,
}

pub type PageCallback = Arc<dyn Fn(&PageReport) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub links: LinkSet,
    pub stop: StopReason,
    pub pages_fetched: usize,
}

enum LinkStrategy {
    Grid { container: Selector, cards: Vec<String> },
    Cards(Selector),
    Anchors(Selector),
}

/// Pulls product links out of one listing page.
pub struct LinkExtractor {
    strategies: Vec<LinkStrategy>,
    href_contains: Vec<String>,
    href_suffixes: Vec<String>,
}

impl LinkExtractor {
    pub fn from_rules(rules: &LinkRules) -> Result<Self> {
        let strategies = rules
            .strategies
            .iter()
            .map(|spec| {
                Ok(match spec {
                    LinkStrategySpec::Grid { container, cards } => LinkStrategy::Grid {
                        container: compile_selector(container)?,
                        cards: cards.iter().map(|c| c.to_lowercase()).collect(),
                    },
                    LinkStrategySpec::Cards { css } => LinkStrategy::Cards(compile_selector(css)?),
                    LinkStrategySpec::Anchors { css } => {
                        LinkStrategy::Anchors(compile_selector(css)?)
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            strategies,
            href_contains: rules.product_href_contains.iter().map(|s| s.to_lowercase()).collect(),
            href_suffixes: rules.product_href_suffixes.iter().map(|s| s.to_lowercase()).collect(),
        })
    }

    /// Links from the first strategy that yields any, resolved against
    /// `page_url`, fragment-free and deduplicated in page order.
    pub fn extract(&self, html: &str, page_url: &Url) -> Vec<String> {
        let document = Html::parse_document(html);

        for (index, strategy) in self.strategies.iter().enumerate() {
            let hrefs = match strategy {
                LinkStrategy::Grid { container, cards } => grid_hrefs(&document, container, cards),
                LinkStrategy::Cards(selector) => document
                    .select(selector)
                    .filter_map(first_anchor_href)
                    .collect(),
                LinkStrategy::Anchors(selector) => document
                    .select(selector)
                    .filter_map(|a| a.value().attr("href"))
                    .collect(),
            };

            let mut seen = HashSet::new();
            let links: Vec<String> = hrefs
                .into_iter()
                .filter(|href| self.is_product_href(href))
                .filter_map(|href| resolve_link(page_url, href))
                .filter(|link| seen.insert(link.clone()))
                .collect();

            if !links.is_empty() {
                debug!("Link strategy #{} found {} links on {}", index, links.len(), page_url);
                return links;
            }
        }

        Vec::new()
    }

    fn is_product_href(&self, href: &str) -> bool {
        let href = href.split('#').next().unwrap_or(href).to_lowercase();
        let path = href.split('?').next().unwrap_or(href.as_str());
        self.href_contains.iter().any(|needle| href.contains(needle.as_str()))
            || self.href_suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
    }
}

fn grid_hrefs<'a>(document: &'a Html, container: &Selector, cards: &[String]) -> Vec<&'a str> {
    let Some(grid) = document.select(container).next() else {
        return Vec::new();
    };

    let children: Vec<ElementRef<'a>> = grid.children().filter_map(ElementRef::wrap).collect();
    for tag in cards {
        let group: Vec<&'a str> = children
            .iter()
            .filter(|child| child.value().name() == tag)
            .filter_map(|child| first_anchor_href(*child))
            .collect();
        if !group.is_empty() {
            return group;
        }
    }
    Vec::new()
}

fn first_anchor_href(card: ElementRef<'_>) -> Option<&str> {
    if card.value().name() == "a" {
        return card.value().attr("href");
    }
    card.select(&ANCHOR).next().and_then(|a| a.value().attr("href"))
}

/// Resolve an href against the page it was found on, dropping the fragment.
/// Non-navigational and non-HTTP links yield `None`.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Listing URL for `page` under the given pagination style.
pub fn page_url(category: &Url, style: &Pagination, page: usize) -> Url {
    let mut url = category.clone();
    url.set_fragment(None);

    match style {
        Pagination::Query { param } => {
            let kept: Vec<(String, String)> = category
                .query_pairs()
                .filter(|(key, _)| key != param.as_str())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair(param, &page.to_string());
        }
        Pagination::PathSegment { segment } => {
            let base = category.path().trim_end_matches('/');
            url.set_path(&format!("{}/{}/{}/", base, segment, page));
        }
    }

    url
}

/// Walks listing pages until a stop condition is hit.
///
/// The collector owns no link state between calls: the caller passes a
/// [`LinkSet`] in and gets the extended set back in the [`CollectOutcome`].
pub struct LinkCollector<F> {
    fetcher: F,
    extractor: LinkExtractor,
    pagination: Vec<Pagination>,
    max_pages: usize,
    delay: DelayRange,
    page_callback: Option<PageCallback>,
    cancel: CancellationToken,
}

impl<F: Fetch> LinkCollector<F> {
    pub fn new(fetcher: F, config: &ScraperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fetcher,
            extractor: LinkExtractor::from_rules(&config.links)?,
            pagination: config.links.pagination.clone(),
            max_pages: config.limits.max_pages,
            delay: config.limits.page_delay,
            page_callback: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn collect(&self, category_url: &str, mut links: LinkSet) -> Result<CollectOutcome> {
        let category = Url::parse(category_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", category_url, e)))?;
        info!("Collecting product links from {}", category);

        let mut page = 1;
        let mut pages_fetched = 0;

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if page > self.max_pages {
                break StopReason::PageLimit;
            }

            let Some((page_url, html)) = self.fetch_page(&category, page).await else {
                if self.cancel.is_cancelled() {
                    break StopReason::Cancelled;
                }
                warn!("Listing page {} could not be fetched, stopping", page);
                break StopReason::FetchFailed;
            };
            pages_fetched += 1;

            let found = self.extractor.extract(&html, &page_url);
            if found.is_empty() {
                info!("No product links on page {} ({}), stopping", page, page_url);
                break StopReason::NoLinks;
            }

            let found_count = found.len();
            let new_count = found.into_iter().filter(|link| links.insert(link.clone())).count();

            if let Some(ref callback) = self.page_callback {
                callback(&PageReport {
                    page,
                    url: page_url.to_string(),
                    found: found_count,
                    new: new_count,
                    total: links.len(),
                });
            }

            if new_count == 0 {
                info!("No new links on page {} ({}), stopping", page, page_url);
                break StopReason::NoNewLinks;
            }
            debug!("Page {}: {} new links ({} total)", page, new_count, links.len());

            page += 1;
            if page <= self.max_pages {
                self.pause().await;
            }
        };

        info!(
            "Link collection finished after {} pages: {} links ({:?})",
            pages_fetched,
            links.len(),
            stop
        );

        Ok(CollectOutcome {
            links,
            stop,
            pages_fetched,
        })
    }

    /// Try each pagination style until one fetch succeeds. Gives up early
    /// once cancelled.
    async fn fetch_page(&self, category: &Url, page: usize) -> Option<(Url, String)> {
        for style in &self.pagination {
            if self.cancel.is_cancelled() {
                return None;
            }
            let url = page_url(category, style, page);
            debug!("Fetching listing page {}", url);
            match self.fetcher.fetch(url.as_str()).await {
                Ok(html) => return Some((url, html)),
                Err(e) => warn!("Listing fetch failed for {}: {}", url, e),
            }
        }
        None
    }

    /// Courtesy delay between listing pages, cut short by cancellation.
    async fn pause(&self) {
        let delay = self.delay.sample();
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
