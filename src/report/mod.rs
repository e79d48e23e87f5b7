//! Report generation: shared value formatting, run totals, CSV export.
//!
//! The console rendering lives in [`crate::cli::table`]; this module owns
//! the numbers and the CSV file format. The CSV has two sections: one row
//! per processed file, then (when containers were touched) a second header
//! and one row per container.

use crate::core::codecs::CodecRun;
use crate::core::collector::{ContainerReport, FileReport};
use crate::core::formats::EncodeMode;
use std::path::Path;

/// Percentage reduction label: `"12.34%"`, or `"-"` for failed rows.
pub fn delta_pct(success: bool, size_before: u64, size_after: u64) -> String {
    if !success || size_before == 0 {
        return "-".to_string();
    }
    let pct = 100.0 * (1.0 - size_after as f64 / size_before as f64);
    format!("{:.2}%", pct)
}

/// Outcome label for a file row.
pub fn outcome_label(success: bool, replaced: bool) -> &'static str {
    if !success {
        "FAIL"
    } else if replaced {
        "OK (replaced)"
    } else {
        "OK (skipped)"
    }
}

/// Flatten codec runs into `"codec:pct%"` joined per encode mode:
/// `" -> "` for pipelines, `"; "` for parallel candidates.
pub fn join_codecs(codecs: &[CodecRun], mode: EncodeMode) -> String {
    let sep = match mode {
        EncodeMode::Pipe => " -> ",
        EncodeMode::Parallel => "; ",
    };
    codecs
        .iter()
        .map(|c| format!("{}:{:.2}%", c.codec, c.reduction_pct))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Aggregate numbers for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportTotals {
    pub total_original: u64,
    pub total_saved: u64,
}

impl ReportTotals {
    pub fn compute(files: &[FileReport], containers: &[ContainerReport]) -> Self {
        let mut totals = ReportTotals::default();
        for r in files.iter().filter(|r| r.replaced) {
            totals.total_original += r.size_before;
            totals.total_saved += r.size_before.saturating_sub(r.size_after);
        }
        for c in containers
            .iter()
            .filter(|c| c.success && c.size_after < c.size_before)
        {
            totals.total_original += c.size_before;
            totals.total_saved += c.size_before - c.size_after;
        }
        totals
    }

    /// Overall reduction percentage across everything that shrank.
    pub fn reduction_pct(&self) -> f64 {
        if self.total_original == 0 {
            0.0
        } else {
            100.0 * self.total_saved as f64 / self.total_original as f64
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Export the run as CSV.
pub fn export_csv_report(
    files: &[FileReport],
    containers: &[ContainerReport],
    output_path: &Path,
    mode: EncodeMode,
) -> crate::Result<()> {
    let mut out = String::new();

    {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "File",
            "Container",
            "MIME",
            "Before(KB)",
            "After(KB)",
            "Delta(%)",
            "Time(s)",
            "Result",
            "Codecs",
            "Error",
        ])?;
        for r in files {
            writer.write_record([
                file_name_of(&r.path),
                r.container_origin
                    .as_deref()
                    .map(file_name_of)
                    .unwrap_or_default(),
                r.mime.clone(),
                (r.size_before / 1024).to_string(),
                (r.size_after / 1024).to_string(),
                delta_pct(r.success, r.size_before, r.size_after),
                format!("{:.2}", r.duration_ms as f64 / 1000.0),
                outcome_label(r.success, r.replaced).to_string(),
                join_codecs(&r.codecs_used, mode),
                r.error_msg.clone(),
            ])?;
        }
        out.push_str(&String::from_utf8_lossy(&writer.into_inner().map_err(
            |e| crate::error::OptiPackError::file_operation(e.to_string()),
        )?));
    }

    if !containers.is_empty() {
        out.push('\n');
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "Container",
            "Format",
            "Before(KB)",
            "After(KB)",
            "Delta(%)",
            "Error",
        ])?;
        for c in containers {
            writer.write_record([
                file_name_of(&c.filename),
                c.format.to_string(),
                (c.size_before / 1024).to_string(),
                (c.size_after / 1024).to_string(),
                delta_pct(c.success, c.size_before, c.size_after),
                c.error_msg.clone(),
            ])?;
        }
        out.push_str(&String::from_utf8_lossy(&writer.into_inner().map_err(
            |e| crate::error::OptiPackError::file_operation(e.to_string()),
        )?));
    }

    std::fs::write(output_path, out)?;
    Ok(())
}
