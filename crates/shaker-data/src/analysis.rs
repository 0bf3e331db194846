//! Batch pipeline for Shaker Monitor.
//!
//! Runs one ingestion batch start to finish: discover CSV streams, parse,
//! merge, resolve column roles, clean and summarise. Either the whole batch
//! succeeds with a [`BatchReport`] or the caller receives a [`ShakerError`].

use std::collections::HashSet;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use shaker_core::error::{Result, ShakerError};
use shaker_core::models::{CleanTable, DailySummary, DaySnapshot, ParseStats, Role, UnifiedTable};
use shaker_core::schema::SchemaDetector;
use shaker_core::settings::{InputKind, PipelineConfig};
use shaker_core::time_utils::{DetectedFormat, TimestampNormalizer};
use tracing::{info, warn};

use crate::aggregator::{clean, MetricsEngine, SummaryCards};
use crate::archive::{extract_csv_entries, load_upload, CsvEntry, Upload};
use crate::merger::merge;
use crate::reader::parse_entries;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parse statistics of one batch file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub entry_name: String,
    pub unit: String,
    pub stats: ParseStats,
}

/// Metadata produced alongside the batch result.
#[derive(Debug, Clone, Serialize)]
pub struct BatchMetadata {
    /// ISO-8601 timestamp when this result was generated.
    pub generated_at: String,
    /// Input file or directory name.
    pub upload_name: String,
    /// Input size in megabytes, rounded to 2 places.
    pub upload_size_mb: f64,
    pub files_parsed: usize,
    pub rows_merged: usize,
    pub rows_cleaned: usize,
    /// Units whose every merged row was dropped during cleaning, in batch
    /// order. Usually a file naming its time or load column differently
    /// from the rest of the batch.
    pub units_without_readings: Vec<String>,
    /// Interpretation chosen for the time column.
    pub time_format: DetectedFormat,
    pub threshold: f64,
    /// Wall-clock seconds spent decoding and parsing the files.
    pub parse_time_seconds: f64,
    /// Wall-clock seconds spent merging, cleaning and summarising.
    pub transform_time_seconds: f64,
}

/// Complete output of a successful batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    /// Merged rows, for the raw preview.
    pub unified: UnifiedTable,
    /// Typed readings, for charting and per-day selection.
    pub clean: CleanTable,
    pub daily: Vec<DailySummary>,
    pub cards: SummaryCards,
    pub metadata: BatchMetadata,
    engine: MetricsEngine,
}

impl BatchReport {
    /// `date` when given, otherwise the latest day of the summary.
    pub fn selected_date(&self, date: Option<NaiveDate>) -> Option<NaiveDate> {
        date.or_else(|| self.daily.last().map(|d| d.date))
    }

    /// Per-day metrics and drop flags for the selected date.
    pub fn snapshot(&self, date: Option<NaiveDate>) -> Option<DaySnapshot> {
        let date = self.selected_date(date)?;
        self.engine.day_snapshot(&self.clean, date)
    }

    /// Rows skipped by the parser across all files.
    pub fn skipped_rows(&self) -> usize {
        self.files.iter().map(|f| f.stats.skipped_rows).sum()
    }
}

/// Result of one ingestion batch.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// The input held no eligible CSV stream. Not a failure.
    NoCsvFound { upload_name: String },
    Ready(Box<BatchReport>),
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Read `path` as `kind` and run the batch.
pub fn analyze_path(path: &Path, kind: InputKind, config: &PipelineConfig) -> Result<BatchOutcome> {
    config.validate()?;
    let upload = load_upload(path, kind)?;
    analyze_batch(upload, config)
}

/// Run the batch over an in-memory blob declared as `zip` or `csv`.
pub fn analyze_bytes(
    name: &str,
    bytes: Vec<u8>,
    kind: InputKind,
    config: &PipelineConfig,
) -> Result<BatchOutcome> {
    config.validate()?;
    let size_bytes = bytes.len();
    let entries = match kind {
        InputKind::Zip => extract_csv_entries(name, &bytes)?,
        InputKind::Csv => vec![CsvEntry::new(name, bytes)],
        InputKind::Dir => {
            return Err(ShakerError::Config(
                "an in-memory upload cannot be a directory".to_string(),
            ))
        }
    };
    analyze_batch(
        Upload {
            name: name.to_string(),
            size_bytes,
            entries,
        },
        config,
    )
}

/// Run the full pipeline over an already discovered upload.
///
/// 1. Parse every entry (optionally in parallel, order preserved).
/// 2. Merge into one [`UnifiedTable`].
/// 3. Resolve the time, load and depth columns.
/// 4. Normalize timestamps and coerce loads into a [`CleanTable`].
/// 5. Build the daily summary and the overview cards.
pub fn analyze_batch(upload: Upload, config: &PipelineConfig) -> Result<BatchOutcome> {
    config.validate()?;

    if upload.entries.is_empty() {
        return Ok(BatchOutcome::NoCsvFound {
            upload_name: upload.name,
        });
    }

    // ── Step 1: Parse ─────────────────────────────────────────────────────────
    let parse_start = std::time::Instant::now();
    let sources = parse_entries(&upload.entries, config.preview_row_cap, config.parallel_parse);
    let parse_time = parse_start.elapsed().as_secs_f64();

    // ── Step 2: Merge ─────────────────────────────────────────────────────────
    let transform_start = std::time::Instant::now();
    let unified = merge(&sources)?;

    // ── Step 3: Column roles ──────────────────────────────────────────────────
    let roles = SchemaDetector::default().resolve_required(&unified.columns)?;
    info!(
        time = roles.get(Role::Time),
        load = roles.get(Role::Load),
        depth = roles.get(Role::Depth),
        "resolved column roles"
    );

    // ── Step 4: Clean ─────────────────────────────────────────────────────────
    let normalizer = TimestampNormalizer::new(&config.date_formats);
    let clean = clean(&unified, &roles, &normalizer)?;

    // ── Step 5: Summaries ─────────────────────────────────────────────────────
    let engine = MetricsEngine::from_config(config);
    let daily = engine.daily_summary(&clean);
    let Some(cards) = engine.summary_cards(&clean) else {
        return Err(ShakerError::NoUsableRows {
            total: clean.total_rows,
            dropped_load: clean.dropped_load,
            dropped_time: clean.dropped_time,
        });
    };
    let transform_time = transform_start.elapsed().as_secs_f64();

    let units_without_readings = units_without_readings(&unified, &clean);
    if !units_without_readings.is_empty() {
        warn!(
            units = ?units_without_readings,
            "no usable rows from these units; check their time and load column names"
        );
    }

    let metadata = BatchMetadata {
        generated_at: Utc::now().to_rfc3339(),
        upload_name: upload.name.clone(),
        upload_size_mb: upload.size_mb(),
        files_parsed: sources.len(),
        rows_merged: unified.len(),
        rows_cleaned: clean.readings.len(),
        units_without_readings,
        time_format: clean.time_format.clone(),
        threshold: config.threshold,
        parse_time_seconds: parse_time,
        transform_time_seconds: transform_time,
    };

    let files = sources
        .into_iter()
        .map(|s| FileReport {
            entry_name: s.entry_name,
            unit: s.unit,
            stats: s.stats,
        })
        .collect();

    info!(
        upload = %metadata.upload_name,
        files = metadata.files_parsed,
        rows = metadata.rows_cleaned,
        days = daily.len(),
        "batch complete"
    );

    Ok(BatchOutcome::Ready(Box::new(BatchReport {
        files,
        unified,
        clean,
        daily,
        cards,
        metadata,
        engine,
    })))
}

/// Units present in `unified` with no surviving reading in `clean`.
fn units_without_readings(unified: &UnifiedTable, clean: &CleanTable) -> Vec<String> {
    let kept: HashSet<&str> = clean.readings.iter().map(|r| r.unit.as_str()).collect();
    let mut lost: Vec<String> = Vec::new();
    for row in &unified.rows {
        if !kept.contains(row.unit.as_str()) && !lost.contains(&row.unit) {
            lost.push(row.unit.clone());
        }
    }
    lost
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use shaker_core::models::{Secondary, UNIT_COLUMN};
    use shaker_core::time_utils::DatePattern;
    use tempfile::TempDir;

    const FILE_A: &str = "Timestamp,Shaker Load (%),Bit Depth (ft)\n\
                          2024/01/05 08:00,10,100\n\
                          2024/01/05 09:00,12,150\n\
                          2024/01/06 08:00,18,200\n";
    const FILE_B: &str = "Timestamp,Shaker Load (%)\n\
                          2024/01/06 09:00,17\n\
                          2024/01/06 10:00,5\n";

    fn ready(outcome: BatchOutcome) -> BatchReport {
        match outcome {
            BatchOutcome::Ready(report) => *report,
            BatchOutcome::NoCsvFound { upload_name } => panic!("no CSV found in {upload_name}"),
        }
    }

    fn run_zip(files: &[(&str, &str)], config: &PipelineConfig) -> Result<BatchOutcome> {
        analyze_bytes("rig.zip", build_zip(files), InputKind::Zip, config)
    }

    // ── analyze_bytes ─────────────────────────────────────────────────────────

    #[test]
    fn test_merge_order_across_files() {
        let report = ready(
            run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &PipelineConfig::default()).unwrap(),
        );

        let load_idx = report.unified.column_index("Shaker Load (%)").unwrap();
        let tagged: Vec<(String, String)> = report
            .unified
            .rows
            .iter()
            .map(|r| (r.unit.clone(), r.cells[load_idx].clone().unwrap()))
            .collect();
        let expected: Vec<(String, String)> = [
            ("A", "10"),
            ("A", "12"),
            ("A", "18"),
            ("B", "17"),
            ("B", "5"),
        ]
        .iter()
        .map(|(u, l)| (u.to_string(), l.to_string()))
        .collect();
        assert_eq!(tagged, expected);
        assert_eq!(
            report.unified.header(),
            vec!["Timestamp", "Shaker Load (%)", "Bit Depth (ft)", UNIT_COLUMN]
        );
    }

    #[test]
    fn test_units_with_mismatched_columns_are_named() {
        let renamed = "Date,Load\n\
                       2024/01/05 10:00,14\n\
                       2024/01/05 11:00,16\n";
        let report = ready(
            run_zip(
                &[("A.csv", FILE_A), ("C.csv", renamed), ("B.csv", FILE_B)],
                &PipelineConfig::default(),
            )
            .unwrap(),
        );
        assert_eq!(report.clean.dropped_load, 2);
        assert_eq!(report.metadata.units_without_readings, vec!["C".to_string()]);
    }

    #[test]
    fn test_no_units_lost_when_columns_agree() {
        let report = ready(
            run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &PipelineConfig::default()).unwrap(),
        );
        assert!(report.metadata.units_without_readings.is_empty());
    }

    #[test]
    fn test_daily_summary_from_batch() {
        let report = ready(
            run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &PipelineConfig::default()).unwrap(),
        );
        assert_eq!(
            report.metadata.time_format,
            DetectedFormat::Pattern("YYYY/MM/DD".into())
        );
        assert_eq!(report.daily.len(), 2);

        let first = &report.daily[0];
        assert_eq!(first.avg_load, 11.0);
        assert_eq!(first.secondary, Secondary::MaxDepth(Some(150.0)));
        assert_eq!(first.utilization, 8.8);

        let second = &report.daily[1];
        assert_eq!(second.rows, 3);
        assert!((second.avg_load - 40.0 / 3.0).abs() < 1e-9);
        assert_eq!(second.utilization, 10.67);
        assert_eq!(second.secondary, Secondary::MaxDepth(Some(200.0)));

        for day in &report.daily {
            assert_eq!(day.rows, report.clean.rows_on(day.date).len());
        }
    }

    #[test]
    fn test_snapshot_defaults_to_latest_day() {
        let report = ready(
            run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &PipelineConfig::default()).unwrap(),
        );
        let snapshot = report.snapshot(None).unwrap();
        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        let flags: Vec<bool> = snapshot.rows.iter().map(|r| r.drop).collect();
        assert_eq!(flags, vec![false, false, true]);

        let missing = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert!(report.snapshot(missing).is_none());
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let config = PipelineConfig::default();
        let first = ready(run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &config).unwrap());
        let second = ready(run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &config).unwrap());
        assert_eq!(first.unified, second.unified);
        assert_eq!(first.daily, second.daily);
    }

    #[test]
    fn test_parallel_parse_matches_sequential() {
        let sequential = ready(
            run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &PipelineConfig::default()).unwrap(),
        );
        let config = PipelineConfig {
            parallel_parse: true,
            ..Default::default()
        };
        let parallel = ready(run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &config).unwrap());
        assert_eq!(sequential.unified, parallel.unified);
        assert_eq!(sequential.daily, parallel.daily);
    }

    #[test]
    fn test_no_csv_in_archive_is_soft() {
        let outcome = run_zip(&[("notes.txt", "hello")], &PipelineConfig::default()).unwrap();
        assert!(matches!(
            outcome,
            BatchOutcome::NoCsvFound { ref upload_name } if upload_name == "rig.zip"
        ));
    }

    #[test]
    fn test_corrupt_archive_is_fatal() {
        let err = analyze_bytes(
            "rig.zip",
            b"PK\x03\x04 truncated".to_vec(),
            InputKind::Zip,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), "archive_format");
    }

    #[test]
    fn test_missing_load_column_is_fatal() {
        let err = analyze_bytes(
            "rig.csv",
            b"Timestamp,Pressure\n2024-01-05,10\n".to_vec(),
            InputKind::Csv,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        match err {
            ShakerError::RequiredColumnMissing { role, columns } => {
                assert_eq!(role, "load");
                assert_eq!(columns, vec!["Timestamp", "Pressure"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unit_column_is_not_a_load_candidate() {
        // "ShakerUnit" contains "shaker" but is never offered to the detector.
        let err = analyze_bytes(
            "rig.csv",
            b"Date,Pressure\n2024-01-05,10\n".to_vec(),
            InputKind::Csv,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), "required_column_missing");
    }

    #[test]
    fn test_header_only_files_are_empty_batch() {
        let err = run_zip(
            &[("A.csv", "Time,Load\n"), ("B.csv", "Time,Load\n")],
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ShakerError::EmptyBatch { files: 2 }));
    }

    #[test]
    fn test_custom_date_formats() {
        let csv = b"Date,Load\n01/05/2024,10\n02/05/2024,20\n".to_vec();

        let default = ready(
            analyze_bytes("rig.csv", csv.clone(), InputKind::Csv, &PipelineConfig::default())
                .unwrap(),
        );
        assert_eq!(
            default.daily[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );

        let config = PipelineConfig {
            date_formats: vec![DatePattern::parse("DD/MM/YYYY").unwrap()],
            ..Default::default()
        };
        let day_first = ready(analyze_bytes("rig.csv", csv, InputKind::Csv, &config).unwrap());
        assert_eq!(
            day_first.daily[0].date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_preview_row_cap_truncates_each_file() {
        let config = PipelineConfig::default().with_preview_row_cap(2);
        let report = ready(run_zip(&[("A.csv", FILE_A), ("B.csv", FILE_B)], &config).unwrap());
        assert_eq!(report.unified.len(), 4);
        assert!(report.files[0].stats.truncated);
        assert!(!report.files[1].stats.truncated);
    }

    #[test]
    fn test_skipped_rows_reported() {
        let csv = b"Time,Load\n2024-01-05,10\n2024-01-05,11,extra\n2024-01-05,12\n".to_vec();
        let report =
            ready(analyze_bytes("rig.csv", csv, InputKind::Csv, &PipelineConfig::default()).unwrap());
        assert_eq!(report.skipped_rows(), 1);
        assert_eq!(report.clean.readings.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected_before_reading() {
        let config = PipelineConfig::default().with_threshold(120.0);
        let err = analyze_bytes("rig.csv", Vec::new(), InputKind::Csv, &config).unwrap_err();
        assert_eq!(err.reason_code(), "config");
    }

    // ── analyze_path ──────────────────────────────────────────────────────────

    #[test]
    fn test_analyze_path_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("B.csv"), FILE_B).unwrap();
        std::fs::write(tmp.path().join("A.csv"), FILE_A).unwrap();

        let report =
            ready(analyze_path(tmp.path(), InputKind::Dir, &PipelineConfig::default()).unwrap());
        assert_eq!(report.files[0].unit, "A");
        assert_eq!(report.files[1].unit, "B");
        assert_eq!(report.metadata.rows_merged, 5);
    }

    #[test]
    fn test_analyze_path_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let outcome = analyze_path(tmp.path(), InputKind::Dir, &PipelineConfig::default()).unwrap();
        assert!(matches!(outcome, BatchOutcome::NoCsvFound { .. }));
    }
}
