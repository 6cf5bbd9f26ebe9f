pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod links;
pub mod product;
pub mod record;
pub mod structured;

pub use config::ScraperConfig;
pub use error::ScanError;
pub use extract::ProductExtractor;
pub use fetch::{Fetch, HttpFetcher, RetryingFetcher};
pub use links::{LinkCollector, LinkSet, StopReason};
pub use product::{ProductScraper, ScrapedProduct};
pub use record::ProductRecord;
