use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use prodscout_scanner::config::ScraperConfig;
use prodscout_scanner::fetch::{Fetch, HttpFetcher, RetryingFetcher};
use prodscout_scanner::links::{CollectOutcome, LinkCollector, LinkSet, PageCallback, PageReport, StopReason};
use prodscout_scanner::{ProductExtractor, ProductRecord, ProductScraper, ScrapedProduct};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Options for configuring a scrape run
pub struct ScrapeOptions {
    pub category_url: String,
    pub config: ScraperConfig,
    pub proxy: Option<String>,
    pub show_progress_bars: bool,
    pub cancel: CancellationToken,
}

impl ScrapeOptions {
    pub fn new(category_url: impl Into<String>, config: ScraperConfig) -> Self {
        Self {
            category_url: category_url.into(),
            config,
            proxy: None,
            show_progress_bars: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Called with `(done, total)` after every product page
pub type ScrapeProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Called with each product result as it comes in
pub type ScrapeResultCallback = Arc<dyn Fn(&ScrapedProduct) + Send + Sync>;

/// Everything one run produced, plus the metadata the reports need.
#[derive(Debug, Clone)]
pub struct ScrapeRun {
    pub run_id: String,
    pub category_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub pages_fetched: usize,
    pub links_found: usize,
    pub products: Vec<ScrapedProduct>,
    pub cancelled: bool,
}

impl ScrapeRun {
    pub fn records(&self) -> impl Iterator<Item = &ProductRecord> {
        self.products.iter().map(|p| &p.record)
    }

    pub fn error_count(&self) -> usize {
        self.products.iter().filter(|p| p.is_error()).count()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Plain HTTP fetcher wrapped in the configured retry policy.
pub fn build_fetcher(config: &ScraperConfig, proxy: Option<String>) -> Result<Arc<dyn Fetch>, String> {
    let http = HttpFetcher::builder()
        .timeout_secs(config.limits.timeout_secs)
        .user_agents(config.limits.user_agents.clone())
        .proxy(proxy)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

    Ok(Arc::new(RetryingFetcher::new(http, config.limits.retry)))
}

/// Walk the category listing and return the product links it yields.
pub async fn collect_product_links(
    options: &ScrapeOptions,
    fetcher: Arc<dyn Fetch>,
    page_callback: Option<PageCallback>,
) -> Result<CollectOutcome, String> {
    let spinner = if options.show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Collecting product links...");
        Some(pb)
    } else {
        None
    };

    let spinner_clone = spinner.clone();
    let internal_callback: PageCallback = Arc::new(move |report: &PageReport| {
        if let Some(ref pb) = spinner_clone {
            pb.set_message(format!(
                "Page {}: {} new links ({} total)",
                report.page, report.new, report.total
            ));
            pb.tick();
        }
        if let Some(ref cb) = page_callback {
            cb(report);
        }
    });

    let collector = LinkCollector::new(fetcher, &options.config)
        .map_err(|e| format!("Invalid configuration: {}", e))?
        .with_page_callback(internal_callback)
        .with_cancellation(options.cancel.clone());

    let outcome = collector
        .collect(&options.category_url, LinkSet::new())
        .await
        .map_err(|e| format!("Failed to collect links: {}", e))?;

    if let Some(pb) = spinner {
        pb.finish_with_message(format!(
            "Link collection complete! {} links from {} pages",
            outcome.links.len(),
            outcome.pages_fetched
        ));
    }

    Ok(outcome)
}

/// Scrape every URL on a bounded worker pool.
///
/// Results come back in input order. URLs not yet started when `cancel`
/// fires produce no result; pages already in flight are finished.
pub async fn scrape_products(
    scraper: ProductScraper,
    urls: Vec<String>,
    workers: usize,
    cancel: CancellationToken,
    progress_callback: Option<ScrapeProgressCallback>,
    result_callback: Option<ScrapeResultCallback>,
) -> Result<Vec<ScrapedProduct>, String> {
    for url in &urls {
        Url::parse(url).map_err(|e| format!("Invalid product URL '{}': {}", url, e))?;
    }

    let total = urls.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut pending = urls.into_iter().enumerate();
    let mut tasks = JoinSet::new();
    let mut done = 0;
    let mut results = Vec::with_capacity(total);

    loop {
        // A task's permit is released before its result is joined, so the
        // callbacks below always run before the next dispatch.
        while !cancel.is_cancelled() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let Some((index, url)) = pending.next() else {
                break;
            };
            let scraper = scraper.clone();
            tasks.spawn(async move {
                let _permit = permit;
                (index, scraper.scrape(&url).await)
            });
        }

        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let (index, product) = joined.map_err(|e| format!("Worker task failed: {}", e))?;

        done += 1;
        if let Some(ref cb) = result_callback {
            cb(&product);
        }
        if let Some(ref cb) = progress_callback {
            cb(done, total);
        }
        results.push((index, product));
    }

    if done < total {
        warn!("Scrape cancelled: {} of {} product pages skipped", total - done, total);
    }

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, product)| product).collect())
}

/// Execute a full scrape: collect links, then scrape every product page.
pub async fn execute_scrape(
    options: ScrapeOptions,
    page_callback: Option<PageCallback>,
    progress_callback: Option<ScrapeProgressCallback>,
    result_callback: Option<ScrapeResultCallback>,
) -> Result<ScrapeRun, String> {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    info!("Starting scrape run {} for {}", run_id, options.category_url);

    let extractor = ProductExtractor::from_config(&options.config)
        .map_err(|e| format!("Invalid configuration: {}", e))?;
    let fetcher = build_fetcher(&options.config, options.proxy.clone())?;
    let outcome = collect_product_links(&options, fetcher.clone(), page_callback).await?;
    let links_found = outcome.links.len();

    let scraper = ProductScraper::new(fetcher, Arc::new(extractor));

    let progress_bar = if options.show_progress_bars && links_found > 0 {
        let pb = ProgressBar::new(links_found as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} products {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let errors = Arc::new(AtomicUsize::new(0));
    let pb_clone = progress_bar.clone();
    let errors_clone = errors.clone();
    let internal_progress: ScrapeProgressCallback = Arc::new(move |done: usize, total: usize| {
        if let Some(ref pb) = pb_clone {
            pb.set_position(done as u64);
            let failed = errors_clone.load(Ordering::Relaxed);
            if failed > 0 {
                pb.set_message(format!("({} errors)", failed));
            }
        }
        if let Some(ref cb) = progress_callback {
            cb(done, total);
        }
    });

    let errors_clone = errors.clone();
    let internal_result: ScrapeResultCallback = Arc::new(move |product: &ScrapedProduct| {
        if product.is_error() {
            errors_clone.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(ref cb) = result_callback {
            cb(product);
        }
    });

    let products = scrape_products(
        scraper,
        outcome.links.into_vec(),
        options.config.limits.workers,
        options.cancel.clone(),
        Some(internal_progress),
        Some(internal_result),
    )
    .await?;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("done, {} errors", errors.load(Ordering::Relaxed)));
    }

    let run = ScrapeRun {
        run_id,
        category_url: options.category_url,
        started_at,
        finished_at: Utc::now(),
        stop_reason: outcome.stop,
        pages_fetched: outcome.pages_fetched,
        links_found,
        cancelled: options.cancel.is_cancelled(),
        products,
    };

    info!(
        "Scrape run {} finished: {} products, {} errors",
        run.run_id,
        run.products.len(),
        run.error_count()
    );

    Ok(run)
}
