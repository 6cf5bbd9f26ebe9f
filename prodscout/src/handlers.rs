use clap::ArgMatches;
use colored::Colorize;
use prodscout_core::report::{ReportFormat, generate_report, save_report};
use prodscout_core::scrape::{
    ScrapeOptions, ScrapeRun, build_fetcher, collect_product_links, execute_scrape,
};
use prodscout_scanner::ProductExtractor;
use prodscout_scanner::config::{DelayRange, ScraperConfig};
use prodscout_scanner::links::LinkExtractor;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

// Helper functions for the listing handlers

/// Check that a URL can serve as a category listing: http(s), with a host,
/// and not a single product page.
pub fn validate_category_url(input: &str) -> Result<Url, String> {
    let url = Url::parse(input.trim()).map_err(|e| format!("Invalid URL '{}': {}", input, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Unsupported scheme '{}': use http or https", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("URL '{}' has no host", input));
    }
    if url.path().to_lowercase().contains("product") {
        return Err(format!(
            "'{}' looks like a product page; pass a category listing URL",
            input
        ));
    }

    Ok(url)
}

/// Parse `MIN-MAX` (or a single value) in milliseconds.
pub fn parse_delay_range(input: &str) -> Result<DelayRange, String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|_| format!("Invalid delay '{}': expected milliseconds", s.trim()))
    };

    let (min_ms, max_ms) = match input.split_once('-') {
        Some((min, max)) => (parse(min)?, parse(max)?),
        None => {
            let value = parse(input)?;
            (value, value)
        }
    };

    if min_ms > max_ms {
        return Err(format!("Invalid delay range {}-{}: minimum exceeds maximum", min_ms, max_ms));
    }

    Ok(DelayRange { min_ms, max_ms })
}

/// Load a configuration file (with `~` expansion), or the defaults when no
/// path is given.
pub fn load_config(path: Option<&PathBuf>) -> Result<ScraperConfig, String> {
    let Some(path) = path else {
        return Ok(ScraperConfig::default());
    };

    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    ScraperConfig::from_json_file(Path::new(&expanded))
        .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))
}

/// Compile every selector and pattern of `config` without fetching anything.
pub fn check_config(config: &ScraperConfig) -> Result<(), String> {
    config.validate().map_err(|e| e.to_string())?;
    ProductExtractor::from_config(config).map_err(|e| e.to_string())?;
    LinkExtractor::from_rules(&config.links).map_err(|e| e.to_string())?;
    Ok(())
}

/// Output path for a report: a path without an extension gets the
/// format's own.
pub fn report_path(path: &Path, format: ReportFormat) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default, Clone)]
pub struct ScrapeOverrides {
    pub workers: Option<usize>,
    pub max_pages: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub delay: Option<DelayRange>,
}

impl ScrapeOverrides {
    pub fn from_matches(sub_matches: &ArgMatches) -> Result<Self, String> {
        let delay = sub_matches
            .get_one::<String>("delay-ms")
            .map(|s| parse_delay_range(s))
            .transpose()?;

        Ok(Self {
            workers: sub_matches.try_get_one::<usize>("threads").ok().flatten().copied(),
            max_pages: sub_matches.get_one::<usize>("max-pages").copied(),
            timeout_secs: sub_matches.get_one::<u64>("timeout").copied(),
            retries: sub_matches.get_one::<u32>("retries").copied(),
            delay,
        })
    }
}

pub fn apply_overrides(
    mut config: ScraperConfig,
    overrides: &ScrapeOverrides,
) -> Result<ScraperConfig, String> {
    if let Some(workers) = overrides.workers {
        config.limits.workers = workers;
    }
    if let Some(max_pages) = overrides.max_pages {
        config.limits.max_pages = max_pages;
    }
    if let Some(timeout_secs) = overrides.timeout_secs {
        config.limits.timeout_secs = timeout_secs;
    }
    if let Some(retries) = overrides.retries {
        config.limits.retry.attempts = retries;
    }
    if let Some(delay) = overrides.delay {
        config.limits.page_delay = delay;
    }

    config.validate().map_err(|e| format!("Invalid settings: {}", e))?;
    Ok(config)
}

/// Turn the shared listing arguments into pipeline options.
pub fn build_scrape_options(sub_matches: &ArgMatches, quiet: bool) -> Result<ScrapeOptions, String> {
    let url = sub_matches
        .get_one::<String>("url")
        .ok_or_else(|| "A category URL is required (--url)".to_string())?;
    let url = validate_category_url(url)?;

    let config = load_config(sub_matches.get_one::<PathBuf>("config"))?;
    let config = apply_overrides(config, &ScrapeOverrides::from_matches(sub_matches)?)?;

    let mut options = ScrapeOptions::new(url.as_str(), config);
    options.proxy = sub_matches.get_one::<String>("proxy").cloned();
    options.show_progress_bars = !quiet && !sub_matches.get_flag("no-progress");
    Ok(options)
}

/// Logs go to stderr; `RUST_LOG` overrides the default level.
pub fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupted: finishing in-flight pages, no new work will start",
                "⚠".yellow().bold()
            );
            token.cancel();
        }
    });
}

fn fail(message: &str) -> ! {
    eprintln!("{} {}", "✗".red().bold(), message);
    std::process::exit(1);
}

/// Status output goes to stderr so reports can be piped.
fn print_divider() {
    eprintln!("{}", "═".repeat(60).bright_blue().bold());
}

pub fn print_banner() {
    print_divider();
    eprintln!(
        "{}",
        format!("  PRODSCOUT v{}", env!("CARGO_PKG_VERSION")).bright_white().bold()
    );
    print_divider();
}

pub fn print_run_summary(run: &ScrapeRun) {
    let errors = run.error_count();
    eprintln!();
    eprintln!("{} Scrape complete", "✓".green().bold());
    eprintln!("  {} {}", "Listing pages:".bright_white(), run.pages_fetched);
    eprintln!("  {} {}", "Links found:  ".bright_white(), run.links_found);
    eprintln!("  {} {}", "Products:     ".bright_white(), run.products.len());
    if errors > 0 {
        eprintln!("  {} {}", "Fetch errors: ".bright_white(), errors.to_string().red().bold());
    } else {
        eprintln!("  {} {}", "Fetch errors: ".bright_white(), "0".green());
    }
    if run.cancelled {
        eprintln!("  {}", "Run was cancelled before all pages were scraped".yellow());
    }
    eprintln!();
}

pub async fn handle_scrape(sub_matches: &ArgMatches, quiet: bool) {
    init_logging(quiet);

    let options = build_scrape_options(sub_matches, quiet).unwrap_or_else(|e| fail(&e));
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = sub_matches
        .get_one::<PathBuf>("output")
        .map(|path| report_path(path, format));

    if !quiet {
        eprintln!("\n{} Scraping {}", "→".blue(), options.category_url.bright_white());
        eprintln!("Workers: {}", options.config.limits.workers);
        eprintln!("Max listing pages: {}\n", options.config.limits.max_pages);
    }

    cancel_on_ctrl_c(options.cancel.clone());

    let run = match execute_scrape(options, None, None, None).await {
        Ok(run) => run,
        Err(e) => fail(&format!("Scrape failed: {}", e)),
    };

    if !quiet {
        print_run_summary(&run);
    }

    let report = generate_report(&run, format).unwrap_or_else(|e| fail(&e));
    match output {
        Some(path) => {
            if let Err(e) = save_report(&report, &path) {
                fail(&format!("Failed to write report to {}: {}", path.display(), e));
            }
            info!("Report written to {}", path.display());
            if !quiet {
                eprintln!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => print!("{}", report),
    }

    if run.error_count() > 0 && quiet {
        eprintln!("{} product pages could not be fetched", run.error_count());
    }
}

pub async fn handle_links(sub_matches: &ArgMatches, quiet: bool) {
    init_logging(quiet);

    let options = build_scrape_options(sub_matches, quiet).unwrap_or_else(|e| fail(&e));
    cancel_on_ctrl_c(options.cancel.clone());

    let fetcher = build_fetcher(&options.config, options.proxy.clone()).unwrap_or_else(|e| fail(&e));
    let outcome = match collect_product_links(&options, fetcher, None).await {
        Ok(outcome) => outcome,
        Err(e) => fail(&e),
    };

    if !quiet {
        eprintln!(
            "{} {} links from {} pages (stopped: {})",
            "✓".green().bold(),
            outcome.links.len(),
            outcome.pages_fetched,
            outcome.stop.as_str()
        );
    }

    let mut listing = outcome.links.into_vec().join("\n");
    if !listing.is_empty() {
        listing.push('\n');
    }

    match sub_matches.get_one::<PathBuf>("output") {
        Some(path) => {
            if let Err(e) = save_report(&listing, path) {
                fail(&format!("Failed to write links to {}: {}", path.display(), e));
            }
        }
        None => print!("{}", listing),
    }
}

pub fn handle_config(sub_matches: &ArgMatches) {
    if let Some(path) = sub_matches.get_one::<PathBuf>("validate") {
        match load_config(Some(path)).and_then(|config| check_config(&config)) {
            Ok(()) => println!("{} {} is valid", "✓".green().bold(), path.display()),
            Err(e) => fail(&e),
        }
        return;
    }

    match ScraperConfig::default().to_json_pretty() {
        Ok(json) => println!("{}", json),
        Err(e) => fail(&format!("Failed to render configuration: {}", e)),
    }
}
