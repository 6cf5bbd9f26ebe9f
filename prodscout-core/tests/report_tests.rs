// Tests for report generation functionality

use chrono::{Duration as ChronoDuration, Utc};
use prodscout_core::report::{
    ReportFormat, generate_csv_report, generate_json_report, generate_report,
    generate_text_report, save_report,
};
use prodscout_core::scrape::ScrapeRun;
use prodscout_scanner::links::StopReason;
use prodscout_scanner::{ProductRecord, ScrapedProduct};
use std::time::Duration;
use tempfile::TempDir;

fn product(title: &str, price: &str) -> ScrapedProduct {
    let mut record = ProductRecord::new(format!("https://shop.test/{}.html", title.to_lowercase()));
    record.title = title.to_string();
    record.price = price.to_string();
    ScrapedProduct {
        record,
        error: None,
        response_time: Duration::from_millis(20),
    }
}

fn failed(url: &str) -> ScrapedProduct {
    ScrapedProduct {
        record: ProductRecord::fetch_error(url.to_string()),
        error: Some("HTTP 500 for ".to_string() + url),
        response_time: Duration::from_millis(5),
    }
}

fn sample_run() -> ScrapeRun {
    let started_at = Utc::now();
    ScrapeRun {
        run_id: "run-1234".to_string(),
        category_url: "https://shop.test/phones/".to_string(),
        started_at,
        finished_at: started_at + ChronoDuration::seconds(42),
        stop_reason: StopReason::NoNewLinks,
        pages_fetched: 3,
        links_found: 3,
        products: vec![
            product("Kettle", "KES 1,299"),
            failed("https://shop.test/broken.html"),
            product("Lamp", "500"),
        ],
        cancelled: false,
    }
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("txt"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("json"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("csv"), Some(ReportFormat::Csv));
}

#[test]
fn test_report_format_from_str_case_insensitive() {
    assert_eq!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("Csv"), Some(ReportFormat::Csv));
}

#[test]
fn test_report_format_from_str_invalid() {
    assert!(ReportFormat::from_str("xlsx").is_none());
    assert!(ReportFormat::from_str("").is_none());
}

#[test]
fn test_report_format_extension() {
    assert_eq!(ReportFormat::Csv.extension(), "csv");
    assert_eq!(ReportFormat::Json.extension(), "json");
    assert_eq!(ReportFormat::Text.extension(), "txt");
}

// ============================================================================
// CSV Tests
// ============================================================================

#[test]
fn test_csv_header_uses_export_column_order() {
    let csv = generate_csv_report(std::iter::empty()).unwrap();
    assert_eq!(
        csv,
        "Product Title,SKU,Seller,Price,Warranty Title,Warranty (Specs),Warranty Address,Product URL\r\n"
    );
}

#[test]
fn test_csv_rows_are_quoted_when_needed() {
    let run = sample_run();
    let csv = generate_csv_report(run.records()).unwrap();
    let lines: Vec<&str> = csv.split("\r\n").collect();

    // header, three rows, trailing empty string
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[1],
        "Kettle,Not indicated,Not indicated,\"KES 1,299\",Not indicated,Not indicated,Not indicated,https://shop.test/kettle.html"
    );
    assert!(lines[2].starts_with("Error fetching page,Error fetching page,"));
    assert!(lines[2].ends_with(",https://shop.test/broken.html"));
}

#[test]
fn test_csv_escapes_quotes_and_line_breaks() {
    let mut record = ProductRecord::new("https://shop.test/laptop.html".to_string());
    record.title = "15\" Laptop".to_string();
    record.warranty_address = "1 Main St\nNairobi".to_string();

    let csv = generate_csv_report([&record]).unwrap();
    let row = csv.strip_prefix(
        "Product Title,SKU,Seller,Price,Warranty Title,Warranty (Specs),Warranty Address,Product URL\r\n",
    );

    assert_eq!(
        row,
        Some(
            "\"15\"\" Laptop\",Not indicated,Not indicated,Not indicated,Not indicated,Not indicated,\"1 Main St\nNairobi\",https://shop.test/laptop.html\r\n"
        )
    );
}

#[test]
fn test_generate_report_csv_matches_direct_export() {
    let run = sample_run();
    assert_eq!(
        generate_report(&run, ReportFormat::Csv).unwrap(),
        generate_csv_report(run.records()).unwrap()
    );
}

// ============================================================================
// JSON Tests
// ============================================================================

#[test]
fn test_json_report_structure() {
    let run = sample_run();
    let json = generate_json_report(&run).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let report = &value["report"];

    assert_eq!(report["metadata"]["generator"], "prodscout");
    assert_eq!(report["run"]["id"], "run-1234");
    assert_eq!(report["run"]["category_url"], "https://shop.test/phones/");
    assert_eq!(report["run"]["duration_seconds"], 42);
    assert_eq!(report["run"]["stop_reason"], "no_new_links");
    assert_eq!(report["summary"]["products"], 3);
    assert_eq!(report["summary"]["fetch_errors"], 1);
    assert_eq!(report["errors"][0]["url"], "https://shop.test/broken.html");
}

#[test]
fn test_json_records_use_camel_case_fields() {
    let run = sample_run();
    let json = generate_json_report(&run).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let first = &value["report"]["records"][0];

    assert_eq!(first["title"], "Kettle");
    assert_eq!(first["price"], "KES 1,299");
    assert_eq!(first["warrantyInTitle"], "Not indicated");
    assert_eq!(first["sourceUrl"], "https://shop.test/kettle.html");
    assert!(first.get("source_url").is_none());
}

// ============================================================================
// Text Tests
// ============================================================================

#[test]
fn test_text_report_summary_and_rows() {
    let run = sample_run();
    let text = generate_text_report(&run);

    assert!(text.contains("PRODSCOUT SCRAPE REPORT"));
    assert!(text.contains("Run ID:       run-1234"));
    assert!(text.contains("Fetch errors: 1"));
    assert!(text.contains("Pages:        3 (no_new_links)"));
    assert!(text.contains("KES 1,299"));
    assert!(text.contains("HTTP 500 for https://shop.test/broken.html"));
    assert!(!text.contains("cancelled"));
}

#[test]
fn test_text_report_marks_cancelled_run() {
    let mut run = sample_run();
    run.cancelled = true;
    run.stop_reason = StopReason::Cancelled;

    let text = generate_text_report(&run);
    assert!(text.contains("Status:       cancelled"));
}

// ============================================================================
// Save Tests
// ============================================================================

#[test]
fn test_save_report_writes_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("products.csv");
    let run = sample_run();
    let content = generate_report(&run, ReportFormat::Csv).unwrap();

    save_report(&content, &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, content);
    assert!(written.starts_with("Product Title,"));
}

#[test]
fn test_save_report_to_missing_directory_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing").join("report.txt");

    assert!(save_report("x", &path).is_err());
}
