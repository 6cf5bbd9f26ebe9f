use crate::extract::ProductExtractor;
use crate::fetch::Fetch;
use crate::record::ProductRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Outcome of scraping one product page.
///
/// A failed fetch still carries a record (the error record for the URL) so
/// the output keeps one row per input link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedProduct {
    pub record: ProductRecord,
    pub error: Option<String>,
    pub response_time: Duration,
}

impl ScrapedProduct {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Fetches a product page and runs the extractor over it.
#[derive(Clone)]
pub struct ProductScraper {
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<ProductExtractor>,
}

impl ProductScraper {
    pub fn new(fetcher: Arc<dyn Fetch>, extractor: Arc<ProductExtractor>) -> Self {
        Self { fetcher, extractor }
    }

    pub async fn scrape(&self, url: &str) -> ScrapedProduct {
        let start = Instant::now();

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return Self::failed(url, format!("invalid URL: {}", e), start),
        };

        match self.fetcher.fetch(url).await {
            Ok(html) => {
                // The parsed document is not Send; keep it inside this sync call.
                let record = self.extractor.extract_html(&html, parsed);
                debug!("Scraped {} in {:?}", url, start.elapsed());
                ScrapedProduct {
                    record,
                    error: None,
                    response_time: start.elapsed(),
                }
            }
            Err(e) => {
                warn!("Failed to fetch product page {}: {}", url, e);
                Self::failed(url, e.to_string(), start)
            }
        }
    }

    fn failed(url: &str, error: String, start: Instant) -> ScrapedProduct {
        ScrapedProduct {
            record: ProductRecord::fetch_error(url.to_string()),
            error: Some(error),
            response_time: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ScanError};
    use crate::record::{FETCH_ERROR, NOT_INDICATED};
    use async_trait::async_trait;

    struct StaticFetcher(Option<&'static str>);

    #[async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.0.map(str::to_string).ok_or(ScanError::Status {
                url: url.to_string(),
                status: 500,
            })
        }
    }

    fn scraper(body: Option<&'static str>) -> ProductScraper {
        ProductScraper::new(
            Arc::new(StaticFetcher(body)),
            Arc::new(ProductExtractor::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_scrape_extracts_record() {
        let result = scraper(Some("<html><body><h1>Desk Lamp</h1></body></html>"))
            .scrape("https://shop.test/lamp.html")
            .await;

        assert!(!result.is_error());
        assert_eq!(result.record.title, "Desk Lamp");
        assert_eq!(result.record.seller, NOT_INDICATED);
        assert_eq!(result.record.source_url, "https://shop.test/lamp.html");
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_error_record() {
        let result = scraper(None).scrape("https://shop.test/broken.html").await;

        assert!(result.is_error());
        assert!(result.record.is_fetch_error());
        assert_eq!(result.record.title, FETCH_ERROR);
        assert_eq!(result.record.source_url, "https://shop.test/broken.html");
    }

    #[tokio::test]
    async fn test_invalid_url_yields_error_record() {
        let result = scraper(Some("<h1>x</h1>")).scrape("not a url").await;

        assert!(result.record.is_fetch_error());
        assert!(result.error.unwrap().contains("invalid URL"));
    }
}
