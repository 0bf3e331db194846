//! Delimited-text export of the daily summary.

use std::path::Path;

use shaker_core::error::{Result, ShakerError};
use shaker_core::formatting::round_to;
use shaker_core::models::{DailySummary, Secondary};
use tracing::info;

pub const DATE_HEADER: &str = "Date";
pub const AVG_LOAD_HEADER: &str = "Avg Load";
pub const UTILIZATION_HEADER: &str = "Utilization";

/// Render `summaries` as CSV text with a header row.
///
/// Columns are date (`YYYY-MM-DD`), average load, the secondary aggregate
/// (`Max Depth` or `Row Count`) and utilization. Average load is rounded to
/// 2 places. A missing max depth is written as an empty cell.
pub fn summary_to_csv(summaries: &[DailySummary]) -> Result<String> {
    let secondary_label = summaries
        .first()
        .map(|s| s.secondary.label())
        .unwrap_or(Secondary::RowCount(0).label());

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([DATE_HEADER, AVG_LOAD_HEADER, secondary_label, UTILIZATION_HEADER])?;

    for summary in summaries {
        let secondary = match summary.secondary {
            Secondary::MaxDepth(Some(depth)) => depth.to_string(),
            Secondary::MaxDepth(None) => String::new(),
            Secondary::RowCount(n) => n.to_string(),
        };
        writer.write_record([
            summary.date.format("%Y-%m-%d").to_string(),
            round_to(summary.avg_load, 2).to_string(),
            secondary,
            summary.utilization.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ShakerError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| ShakerError::Other(e.into()))
}

/// Write the CSV rendering of `summaries` to `path`.
pub fn write_summary_csv(path: &Path, summaries: &[DailySummary]) -> Result<()> {
    let text = summary_to_csv(summaries)?;
    std::fs::write(path, text)?;
    info!(path = %path.display(), days = summaries.len(), "exported daily summary");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
