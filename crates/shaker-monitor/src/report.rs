//! Terminal and JSON rendering of a batch report.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use shaker_core::calculations::{max_value, mean};
use shaker_core::formatting::{format_number, format_percent};
use shaker_core::models::{
    CleanTable, DailySummary, DaySnapshot, Reading, Secondary, UnifiedTable, UNIT_COLUMN,
};
use shaker_core::time_utils::DetectedFormat;
use shaker_data::aggregator::SummaryCards;
use shaker_data::analysis::{BatchMetadata, BatchReport, FileReport};
use unicode_width::UnicodeWidthStr;

/// Merged rows shown by the raw-data preview.
pub const RAW_PREVIEW_ROWS: usize = 200;
/// Latest readings covered by the load trend.
pub const TREND_POINTS: usize = 1000;

// ── Tables ────────────────────────────────────────────────────────────────────

/// Render rows under a header with display-width aware padding. The first
/// column is left-aligned, the rest right-aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.width());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, &width))| pad(cell, width, i > 0))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.to_vec()));
    out.push('\n');
    let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    out.push_str(&"─".repeat(total));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

fn pad(cell: &str, width: usize, right: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(cell.width()));
    if right {
        format!("{}{}", fill, cell)
    } else {
        format!("{}{}", cell, fill)
    }
}

fn secondary_cell(secondary: &Secondary) -> String {
    match secondary {
        Secondary::MaxDepth(Some(depth)) => format_number(*depth, 0),
        Secondary::MaxDepth(None) => "-".to_string(),
        Secondary::RowCount(n) => n.to_string(),
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

pub fn render_upload(metadata: &BatchMetadata) -> String {
    let format = match &metadata.time_format {
        DetectedFormat::Pattern(label) => label.clone(),
        DetectedFormat::Permissive { parsed, unparsed } => {
            format!("permissive ({} parsed, {} unparsed)", parsed, unparsed)
        }
    };
    format!(
        "Uploaded file: {}, Size: {} MB\nTime format: {}, threshold: {}%\n",
        metadata.upload_name, metadata.upload_size_mb, format, metadata.threshold
    )
}

pub fn render_files(files: &[FileReport], units_without_readings: &[String]) -> String {
    let rows: Vec<Vec<String>> = files
        .iter()
        .map(|f| {
            vec![
                f.unit.clone(),
                f.stats.data_rows.to_string(),
                f.stats.skipped_rows.to_string(),
                if f.stats.truncated { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    let mut out = render_table(&["Unit", "Rows", "Skipped", "Truncated"], &rows);
    if !units_without_readings.is_empty() {
        out.push_str(&format!(
            "WARNING: no usable rows from units: {}. Check their time and load column names.\n",
            units_without_readings.join(", ")
        ));
    }
    out
}

pub fn render_cards(cards: &SummaryCards) -> String {
    let depth_label = match cards.depth_drilled {
        Secondary::MaxDepth(_) => "Depth Drilled (ft)",
        Secondary::RowCount(_) => "Rows",
    };
    let rows = vec![
        vec![depth_label.to_string(), secondary_cell(&cards.depth_drilled)],
        vec!["Shaker Load".to_string(), format_percent(cards.shaker_load)],
        vec![
            "Screen Utilization".to_string(),
            format_percent(cards.screen_utilization),
        ],
        vec!["Screen Losses".to_string(), format_percent(cards.screen_losses)],
        vec![
            "Screen Life Remaining".to_string(),
            format_number(cards.screen_life_remaining, 1),
        ],
        vec!["Drops".to_string(), cards.drop_count.to_string()],
    ];

    let mut out = String::from("Summary: Drilling & Shaker Overview\n");
    out.push_str(&render_table(&["Metric", "Value"], &rows));
    if cards.has_anomalies() {
        out.push_str(&format!(
            "WARNING: {} shaker load anomalies detected. Check for mechanical issues or data errors.\n",
            cards.drop_count
        ));
    }
    out
}

pub fn render_daily(daily: &[DailySummary]) -> String {
    let secondary_label = daily
        .first()
        .map(|d| d.secondary.label())
        .unwrap_or("Row Count");
    let rows: Vec<Vec<String>> = daily
        .iter()
        .map(|d| {
            vec![
                d.date.format("%Y-%m-%d").to_string(),
                format_number(d.avg_load, 2),
                secondary_cell(&d.secondary),
                format_number(d.utilization, 2),
                d.rows.to_string(),
            ]
        })
        .collect();

    let mut out = String::from("Daily Summary\n");
    out.push_str(&render_table(
        &["Date", "Avg Load", secondary_label, "Utilization", "Rows"],
        &rows,
    ));
    out
}

/// Min, max and mean load over the last `n` readings.
pub fn render_trend(clean: &CleanTable, n: usize) -> String {
    let tail = clean.tail(n);
    let (Some(first), Some(last)) = (tail.first(), tail.last()) else {
        return String::new();
    };
    let loads: Vec<f64> = tail.iter().map(|r| r.load).collect();
    let low = loads.iter().copied().fold(f64::INFINITY, f64::min);
    let high = max_value(loads.iter().copied()).unwrap_or(low);
    let avg = mean(&loads).unwrap_or(low);

    format!(
        "Load Trend (last {} of {} readings)\n{} to {}: min {}, max {}, mean {}\n",
        tail.len(),
        clean.readings.len(),
        first.timestamp.format("%Y-%m-%d %H:%M"),
        last.timestamp.format("%Y-%m-%d %H:%M"),
        format_percent(low),
        format_percent(high),
        format_percent(avg),
    )
}

/// The first `n` merged rows under the full unified header.
pub fn render_preview(unified: &UnifiedTable, n: usize) -> String {
    let rows: Vec<Vec<String>> = unified
        .preview(n)
        .iter()
        .map(|row| {
            (0..unified.columns.len())
                .map(|i| row.cells.get(i).cloned().flatten().unwrap_or_default())
                .chain(std::iter::once(row.unit.clone()))
                .collect()
        })
        .collect();

    let mut out = format!("Raw Data (first {} of {} rows)\n", rows.len(), unified.len());
    out.push_str(&render_table(&unified.header(), &rows));
    out
}

pub fn render_snapshot(snapshot: &DaySnapshot) -> String {
    let mut out = format!(
        "Day {}: load {}, utilization {}, screen life {}, {} {}, {} drop(s)\n",
        snapshot.date.format("%Y-%m-%d"),
        format_percent(snapshot.shaker_load),
        format_percent(snapshot.screen_utilization),
        format_number(snapshot.screen_life_remaining, 1),
        snapshot.depth_value.label().to_lowercase(),
        secondary_cell(&snapshot.depth_value),
        snapshot.drop_count,
    );

    let rows: Vec<Vec<String>> = snapshot
        .rows
        .iter()
        .map(|r| {
            vec![
                r.reading.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.reading.unit.clone(),
                format_number(r.reading.load, 2),
                if r.drop { "Drop" } else { "Normal" }.to_string(),
            ]
        })
        .collect();
    out.push_str(&render_table(&["Timestamp", "Unit", "Load", "Flag"], &rows));
    out
}

/// Full terminal report. The raw-data preview is included when `show_raw`.
pub fn render_text(
    report: &BatchReport,
    snapshot: Option<&DaySnapshot>,
    requested: Option<NaiveDate>,
    show_raw: bool,
) -> String {
    let mut sections = vec![
        render_upload(&report.metadata),
        render_files(&report.files, &report.metadata.units_without_readings),
        render_cards(&report.cards),
        render_daily(&report.daily),
        render_trend(&report.clean, TREND_POINTS),
    ];
    match (snapshot, requested) {
        (Some(s), _) => sections.push(render_snapshot(s)),
        (None, Some(date)) => sections.push(format!("No readings on {}\n", date.format("%Y-%m-%d"))),
        (None, None) => {}
    }
    if show_raw {
        sections.push(render_preview(&report.unified, RAW_PREVIEW_ROWS));
    }
    sections.join("\n")
}

// ── JSON ──────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a BatchMetadata,
    files: &'a [FileReport],
    dropped_load: usize,
    dropped_time: usize,
    cards: &'a SummaryCards,
    daily: &'a [DailySummary],
    snapshot: Option<&'a DaySnapshot>,
    /// First merged rows keyed by column name.
    preview: Vec<Map<String, Value>>,
    tail: &'a [Reading],
}

fn preview_records(unified: &UnifiedTable, n: usize) -> Vec<Map<String, Value>> {
    unified
        .preview(n)
        .iter()
        .map(|row| {
            let mut record: Map<String, Value> = unified
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = row.cells.get(i).cloned().flatten();
                    (column.clone(), cell.map_or(Value::Null, Value::String))
                })
                .collect();
            record.insert(UNIT_COLUMN.to_string(), Value::String(row.unit.clone()));
            record
        })
        .collect()
}

pub fn render_json(report: &BatchReport, snapshot: Option<&DaySnapshot>) -> anyhow::Result<String> {
    let doc = JsonReport {
        metadata: &report.metadata,
        files: &report.files,
        dropped_load: report.clean.dropped_load,
        dropped_time: report.clean.dropped_time,
        cards: &report.cards,
        daily: &report.daily,
        snapshot,
        preview: preview_records(&report.unified, RAW_PREVIEW_ROWS),
        tail: report.clean.tail(TREND_POINTS),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
