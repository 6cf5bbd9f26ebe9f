// Report generation from a finished scrape run

use crate::scrape::ScrapeRun;
use prodscout_scanner::record::{COLUMNS, ProductRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Render the run in the requested format.
pub fn generate_report(run: &ScrapeRun, format: ReportFormat) -> Result<String, String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(run)),
        ReportFormat::Json => {
            generate_json_report(run).map_err(|e| format!("Failed to serialize report: {}", e))
        }
        ReportFormat::Csv => generate_csv_report(run.records()),
    }
}

pub fn generate_text_report(run: &ScrapeRun) -> String {
    let rule = "━".repeat(80);
    let mut report = String::new();

    report.push_str(&rule);
    report.push('\n');
    report.push_str("                          PRODSCOUT SCRAPE REPORT\n");
    report.push_str(&rule);
    report.push_str("\n\n");

    report.push_str(&format!("Run ID:       {}\n", run.run_id));
    report.push_str(&format!("Category:     {}\n", run.category_url));
    report.push_str(&format!("Started:      {}\n", run.started_at.to_rfc3339()));
    report.push_str(&format!("Duration:     {} seconds\n", run.duration_seconds()));
    report.push_str(&format!("Pages:        {} ({})\n", run.pages_fetched, run.stop_reason.as_str()));
    report.push_str(&format!("Links found:  {}\n", run.links_found));
    report.push_str(&format!("Products:     {}\n", run.products.len()));
    report.push_str(&format!("Fetch errors: {}\n", run.error_count()));
    if run.cancelled {
        report.push_str("Status:       cancelled\n");
    }
    report.push('\n');

    if !run.products.is_empty() {
        report.push_str(&rule);
        report.push_str("\nPRODUCTS\n");
        report.push_str(&rule);
        report.push_str("\n\n");

        let width = COLUMNS.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        for (idx, product) in run.products.iter().enumerate() {
            report.push_str(&format!("[{}]\n", idx + 1));
            for (label, value) in product.record.fields() {
                report.push_str(&format!("{:<width$}  {}\n", label, value, width = width));
            }
            if let Some(ref error) = product.error {
                report.push_str(&format!("{:<width$}  {}\n", "Error", error, width = width));
            }
            report.push_str(&"─".repeat(80));
            report.push_str("\n\n");
        }
    }

    report.push_str("Generated by prodscout\n");
    report
}

pub fn generate_json_report(run: &ScrapeRun) -> Result<String, serde_json::Error> {
    let records: Vec<&ProductRecord> = run.records().collect();
    let errors: Vec<serde_json::Value> = run
        .products
        .iter()
        .filter_map(|p| {
            p.error.as_ref().map(|error| {
                serde_json::json!({
                    "url": p.record.source_url,
                    "error": error,
                })
            })
        })
        .collect();

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "prodscout",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": run.run_id,
                "category_url": run.category_url,
                "start_time": run.started_at.to_rfc3339(),
                "end_time": run.finished_at.to_rfc3339(),
                "duration_seconds": run.duration_seconds(),
                "stop_reason": run.stop_reason.as_str(),
                "cancelled": run.cancelled
            },
            "summary": {
                "pages_fetched": run.pages_fetched,
                "links_found": run.links_found,
                "products": run.products.len(),
                "fetch_errors": run.error_count()
            },
            "records": records,
            "errors": errors
        }
    });

    serde_json::to_string_pretty(&json_report)
}

/// Header row plus one row per record, in export column order, with CRLF
/// line endings.
pub fn generate_csv_report<'a>(
    records: impl IntoIterator<Item = &'a ProductRecord>,
) -> Result<String, String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer
        .write_record(COLUMNS)
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;
    for record in records {
        writer
            .write_record(record.fields().iter().map(|(_, value)| *value))
            .map_err(|e| format!("Failed to write CSV row for {}: {}", record.source_url, e))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| format!("Failed to flush CSV report: {}", e.error()))?;
    String::from_utf8(bytes).map_err(|e| format!("CSV report is not valid UTF-8: {}", e))
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
