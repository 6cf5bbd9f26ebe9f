// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    ScrapeOverrides, apply_overrides, check_config, load_config, parse_delay_range,
    validate_category_url,
};

// Re-export pipeline functionality from prodscout-core
pub use prodscout_core::report::{ReportFormat, generate_report, save_report};
pub use prodscout_core::scrape::{ScrapeOptions, ScrapeRun, execute_scrape};
