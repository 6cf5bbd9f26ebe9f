pub mod report;
pub mod scrape;

pub use report::ReportFormat;
pub use scrape::{ScrapeOptions, ScrapeRun, execute_scrape};
