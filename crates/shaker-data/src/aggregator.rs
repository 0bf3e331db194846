//! Metrics engine: cleaning, per-date aggregation and per-day snapshots.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use shaker_core::calculations::{
    drop_flags, max_value, mean, screen_life_remaining, utilization, HeuristicCoefficients,
};
use shaker_core::error::{Result, ShakerError};
use shaker_core::formatting::round_to;
use shaker_core::models::{
    CleanTable, ColumnRoleMap, DailySummary, DaySnapshot, FlaggedReading, Reading, Role,
    Secondary, UnifiedTable,
};
use shaker_core::settings::PipelineConfig;
use shaker_core::time_utils::TimestampNormalizer;
use tracing::{info, warn};

// ── Coercion ──────────────────────────────────────────────────────────────────

/// Parse a cell as a finite number. Blank, non-numeric, `nan` and `inf`
/// cells all yield `None`.
pub fn coerce_number(cell: Option<&str>) -> Option<f64> {
    cell.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Coerce the unified table into typed readings.
///
/// Rows whose load is not numeric are dropped first, then rows whose
/// timestamp did not normalize. The time column is normalized as a whole,
/// over every merged row, before any row is dropped.
pub fn clean(
    unified: &UnifiedTable,
    roles: &ColumnRoleMap,
    normalizer: &TimestampNormalizer,
) -> Result<CleanTable> {
    let index_of = |role: Role| -> Result<usize> {
        roles
            .get(role)
            .and_then(|name| unified.column_index(name))
            .ok_or_else(|| ShakerError::RequiredColumnMissing {
                role: role.to_string(),
                columns: unified.columns.clone(),
            })
    };
    let time_idx = index_of(Role::Time)?;
    let load_idx = index_of(Role::Load)?;
    let depth_idx = roles.get(Role::Depth).and_then(|d| unified.column_index(d));

    let time_column = &unified.columns[time_idx];
    let (timestamps, time_format) =
        normalizer.normalize(time_column, &unified.column_values(time_idx))?;

    let mut readings = Vec::with_capacity(unified.len());
    let mut dropped_load = 0;
    let mut dropped_time = 0;

    for (row, timestamp) in unified.rows.iter().zip(timestamps) {
        let cell = |idx: usize| row.cells.get(idx).and_then(|c| c.as_deref());

        let Some(load) = coerce_number(cell(load_idx)) else {
            dropped_load += 1;
            continue;
        };
        let Some(timestamp) = timestamp else {
            dropped_time += 1;
            continue;
        };

        readings.push(Reading {
            unit: row.unit.clone(),
            timestamp,
            load,
            depth: depth_idx.and_then(|idx| coerce_number(cell(idx))),
        });
    }

    if readings.is_empty() {
        return Err(ShakerError::NoUsableRows {
            total: unified.len(),
            dropped_load,
            dropped_time,
        });
    }
    if dropped_load > 0 || dropped_time > 0 {
        warn!(
            total = unified.len(),
            dropped_load, dropped_time, "dropped rows during cleaning"
        );
    }

    Ok(CleanTable {
        roles: roles.clone(),
        time_format,
        readings,
        total_rows: unified.len(),
        dropped_load,
        dropped_time,
    })
}

// ── SummaryCards ──────────────────────────────────────────────────────────────

/// Batch-wide overview figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCards {
    /// Max depth across the batch, or the row count without a depth column.
    pub depth_drilled: Secondary,
    /// Mean load across all cleaned rows, rounded to 2 places.
    pub shaker_load: f64,
    pub screen_utilization: f64,
    /// `100 - screen_utilization`, rounded to 2 places.
    pub screen_losses: f64,
    pub screen_life_remaining: f64,
    /// Drops across the whole cleaned table in table order.
    pub drop_count: usize,
}

impl SummaryCards {
    /// Whether the anomaly warning should be shown.
    pub fn has_anomalies(&self) -> bool {
        self.drop_count > 0
    }
}

// ── MetricsEngine ─────────────────────────────────────────────────────────────

/// Derives summaries from a [`CleanTable`] for one utilization threshold.
#[derive(Debug, Clone, Copy)]
pub struct MetricsEngine {
    threshold: f64,
    heuristics: HeuristicCoefficients,
}

impl MetricsEngine {
    pub fn new(threshold: f64, heuristics: HeuristicCoefficients) -> Self {
        Self {
            threshold,
            heuristics,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.threshold, config.heuristics)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// One [`DailySummary`] per calendar date, sorted ascending.
    ///
    /// `avg_load` is the unrounded mean; utilization is derived from it and
    /// rounded to 2 places.
    pub fn daily_summary(&self, clean: &CleanTable) -> Vec<DailySummary> {
        let mut groups: BTreeMap<NaiveDate, Vec<&Reading>> = BTreeMap::new();
        for reading in &clean.readings {
            groups.entry(reading.date()).or_default().push(reading);
        }

        let summaries: Vec<DailySummary> = groups
            .into_iter()
            .filter_map(|(date, readings)| {
                let loads: Vec<f64> = readings.iter().map(|r| r.load).collect();
                let avg_load = mean(&loads)?;
                Some(DailySummary {
                    date,
                    avg_load,
                    secondary: secondary(&readings, clean.roles.has_depth()),
                    utilization: utilization(avg_load, self.threshold),
                    rows: readings.len(),
                })
            })
            .collect();

        info!(days = summaries.len(), "built daily summary");
        summaries
    }

    /// Metrics and drop flags for the rows of `date`. `None` when the date
    /// has no rows.
    pub fn day_snapshot(&self, clean: &CleanTable, date: NaiveDate) -> Option<DaySnapshot> {
        let readings = clean.rows_on(date);
        let loads: Vec<f64> = readings.iter().map(|r| r.load).collect();
        let avg_load = mean(&loads)?;
        let screen_utilization = utilization(avg_load, self.threshold);

        let flags = drop_flags(&loads, self.heuristics.drop_threshold);
        let drop_count = flags.iter().filter(|f| **f).count();
        let depth_value = secondary(&readings, clean.roles.has_depth());

        let rows = readings
            .into_iter()
            .zip(flags)
            .map(|(reading, drop)| FlaggedReading {
                reading: reading.clone(),
                drop,
            })
            .collect();

        Some(DaySnapshot {
            date,
            rows,
            depth_value,
            shaker_load: round_to(avg_load, 2),
            screen_utilization,
            screen_life_remaining: screen_life_remaining(
                screen_utilization,
                self.heuristics.screen_life_factor,
            ),
            drop_count,
        })
    }

    /// Overview cards over the whole cleaned table.
    pub fn summary_cards(&self, clean: &CleanTable) -> Option<SummaryCards> {
        let loads: Vec<f64> = clean.readings.iter().map(|r| r.load).collect();
        let avg_load = mean(&loads)?;
        let screen_utilization = utilization(avg_load, self.threshold);
        let all: Vec<&Reading> = clean.readings.iter().collect();

        Some(SummaryCards {
            depth_drilled: secondary(&all, clean.roles.has_depth()),
            shaker_load: round_to(avg_load, 2),
            screen_utilization,
            screen_losses: round_to(100.0 - screen_utilization, 2),
            screen_life_remaining: screen_life_remaining(
                screen_utilization,
                self.heuristics.screen_life_factor,
            ),
            drop_count: drop_flags(&loads, self.heuristics.drop_threshold)
                .into_iter()
                .filter(|f| *f)
                .count(),
        })
    }
}

fn secondary(readings: &[&Reading], has_depth: bool) -> Secondary {
    if has_depth {
        Secondary::MaxDepth(max_value(readings.iter().filter_map(|r| r.depth)))
    } else {
        Secondary::RowCount(readings.len())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use shaker_core::models::UnifiedRow;
    use shaker_core::time_utils::DetectedFormat;

    fn table(columns: &[&str], rows: &[(&str, &[&str])]) -> UnifiedTable {
        UnifiedTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(unit, cells)| UnifiedRow {
                    unit: unit.to_string(),
                    cells: cells
                        .iter()
                        .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                        .collect(),
                })
                .collect(),
        }
    }

    fn roles(depth: bool) -> ColumnRoleMap {
        ColumnRoleMap::new(
            Some("Timestamp".into()),
            Some("Shaker Load".into()),
            depth.then(|| "Bit Depth".to_string()),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine() -> MetricsEngine {
        MetricsEngine::new(80.0, HeuristicCoefficients::default())
    }

    fn sample() -> UnifiedTable {
        table(
            &["Timestamp", "Shaker Load", "Bit Depth"],
            &[
                ("A", &["2024-01-05 08:00", "10", "100"]),
                ("A", &["2024-01-05 09:00", "12", "150"]),
                ("A", &["2024-01-05 10:00", "18", ""]),
                ("B", &["2024-01-05 11:00", "17", "140"]),
                ("B", &["2024-01-05 12:00", "5", "abc"]),
                ("B", &["2024-01-06 08:00", "40", "200"]),
                ("B", &["2024-01-06 09:00", "n/a", "210"]),
                ("B", &["not a time", "30", "220"]),
            ],
        )
    }

    // ── coerce_number ─────────────────────────────────────────────────────────

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(Some(" 64.5 ")), Some(64.5));
        assert_eq!(coerce_number(Some("-3")), Some(-3.0));
        assert_eq!(coerce_number(Some("1e2")), Some(100.0));
        assert_eq!(coerce_number(Some("")), None);
        assert_eq!(coerce_number(Some("12%")), None);
        assert_eq!(coerce_number(Some("NaN")), None);
        assert_eq!(coerce_number(Some("inf")), None);
        assert_eq!(coerce_number(None), None);
    }

    // ── clean ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_clean_drops_bad_load_then_bad_time() {
        let clean = clean(&sample(), &roles(true), &TimestampNormalizer::default()).unwrap();
        assert_eq!(clean.total_rows, 8);
        assert_eq!(clean.dropped_load, 1);
        assert_eq!(clean.dropped_time, 1);
        assert_eq!(clean.readings.len(), 6);
        assert!(matches!(clean.time_format, DetectedFormat::Permissive { .. }));

        let loads: Vec<f64> = clean.readings.iter().map(|r| r.load).collect();
        assert_eq!(loads, vec![10.0, 12.0, 18.0, 17.0, 5.0, 40.0]);
        assert_eq!(clean.readings[2].depth, None);
        assert_eq!(clean.readings[4].depth, None);
        assert_eq!(clean.readings[3].unit, "B");
    }

    #[test]
    fn test_clean_no_usable_rows() {
        let unified = table(
            &["Timestamp", "Shaker Load"],
            &[("A", &["2024-01-05", "x"]), ("A", &["2024-01-06", ""])],
        );
        let err = clean(&unified, &roles(false), &TimestampNormalizer::default()).unwrap_err();
        match err {
            ShakerError::NoUsableRows {
                total,
                dropped_load,
                dropped_time,
            } => {
                assert_eq!(total, 2);
                assert_eq!(dropped_load, 2);
                assert_eq!(dropped_time, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_clean_unparseable_time_aborts() {
        let unified = table(
            &["Timestamp", "Shaker Load"],
            &[("A", &["soon", "1"]), ("A", &["later", "2"])],
        );
        let err = clean(&unified, &roles(false), &TimestampNormalizer::default()).unwrap_err();
        assert_eq!(err.reason_code(), "timestamp_unparseable");
    }

    #[test]
    fn test_clean_role_not_in_table() {
        let unified = table(&["Timestamp", "Vibration"], &[("A", &["2024-01-05", "1"])]);
        let err = clean(&unified, &roles(false), &TimestampNormalizer::default()).unwrap_err();
        assert_eq!(err.reason_code(), "required_column_missing");
    }

    // ── daily_summary ─────────────────────────────────────────────────────────

    #[test]
    fn test_daily_summary_groups_by_date() {
        let clean = clean(&sample(), &roles(true), &TimestampNormalizer::default()).unwrap();
        let summary = engine().daily_summary(&clean);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].date, date(2024, 1, 5));
        assert_eq!(summary[0].avg_load, 12.4);
        assert_eq!(summary[0].secondary, Secondary::MaxDepth(Some(150.0)));
        assert_eq!(summary[0].utilization, 9.92);
        assert_eq!(summary[1].date, date(2024, 1, 6));
        assert_eq!(summary[1].avg_load, 40.0);
        assert_eq!(summary[1].utilization, 32.0);
    }

    #[test]
    fn test_daily_summary_row_counts_match_cleaned_rows() {
        let clean = clean(&sample(), &roles(true), &TimestampNormalizer::default()).unwrap();
        for day in engine().daily_summary(&clean) {
            assert_eq!(day.rows, clean.rows_on(day.date).len());
        }
    }

    #[test]
    fn test_daily_summary_row_count_without_depth() {
        let clean = clean(&sample(), &roles(false), &TimestampNormalizer::default()).unwrap();
        let summary = engine().daily_summary(&clean);
        assert_eq!(summary[0].secondary, Secondary::RowCount(5));
        assert_eq!(summary[1].secondary, Secondary::RowCount(1));
    }

    #[test]
    fn test_daily_summary_depth_without_numeric_values() {
        let unified = table(
            &["Timestamp", "Shaker Load", "Bit Depth"],
            &[("A", &["2024-01-05", "10", ""]), ("A", &["2024-01-05", "20", "-"])],
        );
        let clean = clean(&unified, &roles(true), &TimestampNormalizer::default()).unwrap();
        let summary = engine().daily_summary(&clean);
        assert_eq!(summary[0].secondary, Secondary::MaxDepth(None));
    }

    #[test]
    fn test_daily_summary_utilization_formula() {
        let unified = table(
            &["Timestamp", "Shaker Load"],
            &[("A", &["2024-01-05", "64.27"])],
        );
        let clean = clean(&unified, &roles(false), &TimestampNormalizer::default()).unwrap();
        let summary = engine().daily_summary(&clean);
        assert_eq!(summary[0].utilization, 51.42);
    }

    #[test]
    fn test_daily_summary_utilization_uses_unrounded_mean() {
        let unified = table(
            &["Timestamp", "Shaker Load"],
            &[("A", &["2024-01-05", "12.344"])],
        );
        let clean = clean(&unified, &roles(false), &TimestampNormalizer::default()).unwrap();
        let summary = engine().daily_summary(&clean);
        assert_eq!(summary[0].avg_load, 12.344);
        // 12.344 * 0.8 = 9.8752; rounding the mean first would give 9.87.
        assert_eq!(summary[0].utilization, 9.88);

        let snapshot = engine().day_snapshot(&clean, date(2024, 1, 5)).unwrap();
        assert_eq!(snapshot.shaker_load, 12.34);
        assert_eq!(snapshot.screen_utilization, 9.88);
    }

    // ── day_snapshot ──────────────────────────────────────────────────────────

    #[test]
    fn test_day_snapshot_drop_flags() {
        let clean = clean(&sample(), &roles(true), &TimestampNormalizer::default()).unwrap();
        let snapshot = engine().day_snapshot(&clean, date(2024, 1, 5)).unwrap();

        let flags: Vec<u8> = snapshot.rows.iter().map(|r| u8::from(r.drop)).collect();
        assert_eq!(flags, vec![0, 0, 1, 0, 1]);
        assert_eq!(snapshot.drop_count, 2);
        assert_eq!(snapshot.shaker_load, 12.4);
        assert_eq!(snapshot.screen_utilization, 9.92);
        assert_eq!(snapshot.screen_life_remaining, 135.1);
        assert_eq!(snapshot.depth_value, Secondary::MaxDepth(Some(150.0)));
    }

    #[test]
    fn test_day_snapshot_missing_date() {
        let clean = clean(&sample(), &roles(true), &TimestampNormalizer::default()).unwrap();
        assert!(engine().day_snapshot(&clean, date(2023, 12, 31)).is_none());
    }

    #[test]
    fn test_day_snapshot_custom_coefficients() {
        let clean = clean(&sample(), &roles(false), &TimestampNormalizer::default()).unwrap();
        let engine = MetricsEngine::new(
            100.0,
            HeuristicCoefficients {
                drop_threshold: 10.0,
                screen_life_factor: 0.8,
            },
        );
        let snapshot = engine.day_snapshot(&clean, date(2024, 1, 5)).unwrap();
        assert_eq!(snapshot.drop_count, 1);
        assert_eq!(snapshot.screen_utilization, 12.4);
        assert_eq!(snapshot.screen_life_remaining, 70.1);
        assert_eq!(snapshot.depth_value, Secondary::RowCount(5));
    }

    // ── summary_cards ─────────────────────────────────────────────────────────

    #[test]
    fn test_summary_cards_whole_batch() {
        let clean = clean(&sample(), &roles(true), &TimestampNormalizer::default()).unwrap();
        let cards = engine().summary_cards(&clean).unwrap();

        assert_eq!(cards.depth_drilled, Secondary::MaxDepth(Some(200.0)));
        assert_eq!(cards.shaker_load, 17.0);
        assert_eq!(cards.screen_utilization, 13.6);
        assert_eq!(cards.screen_losses, 86.4);
        assert_eq!(cards.screen_life_remaining, 129.6);
        // 10,12,18,17,5,40: drops at 18, 5 and 40.
        assert_eq!(cards.drop_count, 3);
        assert!(cards.has_anomalies());
    }
}
