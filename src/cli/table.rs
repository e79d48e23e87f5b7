//! Table formatting for the console report.
//!
//! Renders the collector's per-file and per-container rows with rounded
//! borders and left-aligned columns. All value formatting (delta
//! percentages, outcome labels, codec chains) is shared with the CSV
//! export in [`crate::report`].

use crate::core::collector::{ContainerReport, FileReport};
use crate::core::formats::EncodeMode;
use crate::report::{delta_pct, join_codecs, outcome_label};
use tabled::settings::{object::Rows, Alignment, Modify, Style};
use tabled::{Table, Tabled};

/// Display row for one processed file.
#[derive(Tabled)]
pub struct FileDisplayRow {
    #[tabled(rename = "File")]
    pub file: String,
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "MIME")]
    pub mime: String,
    #[tabled(rename = "Before(KB)")]
    pub before_kb: u64,
    #[tabled(rename = "After(KB)")]
    pub after_kb: u64,
    #[tabled(rename = "Delta(%)")]
    pub delta: String,
    #[tabled(rename = "Time(s)")]
    pub time: String,
    #[tabled(rename = "Result")]
    pub result: String,
    #[tabled(rename = "Codecs")]
    pub codecs: String,
}

/// Display row for one finalized container.
#[derive(Tabled)]
pub struct ContainerDisplayRow {
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "Format")]
    pub format: String,
    #[tabled(rename = "Before(KB)")]
    pub before_kb: u64,
    #[tabled(rename = "After(KB)")]
    pub after_kb: u64,
    #[tabled(rename = "Delta(%)")]
    pub delta: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Convert collector rows into display rows.
pub fn file_rows(reports: &[FileReport], mode: EncodeMode) -> Vec<FileDisplayRow> {
    reports
        .iter()
        .map(|r| FileDisplayRow {
            file: file_name_of(&r.path),
            container: r
                .container_origin
                .as_deref()
                .map(file_name_of)
                .unwrap_or_default(),
            mime: r.mime.clone(),
            before_kb: r.size_before / 1024,
            after_kb: r.size_after / 1024,
            delta: delta_pct(r.success, r.size_before, r.size_after),
            time: format!("{:.2}", r.duration_ms as f64 / 1000.0),
            result: outcome_label(r.success, r.replaced).to_string(),
            codecs: join_codecs(&r.codecs_used, mode),
        })
        .collect()
}

/// Convert container rows into display rows.
pub fn container_rows(reports: &[ContainerReport]) -> Vec<ContainerDisplayRow> {
    reports
        .iter()
        .map(|c| ContainerDisplayRow {
            container: file_name_of(&c.filename),
            format: c.format.to_string(),
            before_kb: c.size_before / 1024,
            after_kb: c.size_after / 1024,
            delta: delta_pct(c.success, c.size_before, c.size_after),
            error: c.error_msg.clone(),
        })
        .collect()
}

/// Build a table with the report styling.
pub fn create_report_table<T: Tabled>(rows: Vec<T>) -> Table {
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(..)).with(Alignment::left()));
    table
}
