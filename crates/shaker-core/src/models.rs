use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time_utils::DetectedFormat;

/// Name of the synthetic column that tags every merged row with its source.
pub const UNIT_COLUMN: &str = "ShakerUnit";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Per-stream counters reported by the row parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Records kept in the table.
    pub data_rows: usize,
    /// Records dropped for a field-count mismatch or a structural error.
    pub skipped_rows: usize,
    /// Bytes discarded because they were not valid UTF-8.
    pub dropped_bytes: usize,
    /// Whether a row cap stopped parsing before the end of the stream.
    pub truncated: bool,
}

/// A delimited table exactly as read from one stream.
///
/// Every row has one cell per header; blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names, trimmed of surrounding whitespace, case preserved.
    pub headers: Vec<String>,
    /// Data rows in stream order.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Position of `name` in the header, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One CSV stream of a batch together with its parsed table.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Entry name as found in the archive or on disk.
    pub entry_name: String,
    /// Unit label: the entry's file name without path or extension.
    pub unit: String,
    pub table: RawTable,
    pub stats: ParseStats,
}

// ── Column roles ──────────────────────────────────────────────────────────────

/// Semantic role a physical column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Time,
    Load,
    Depth,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Time => "time",
            Role::Load => "load",
            Role::Depth => "depth",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical column chosen for each role. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoleMap {
    time: Option<String>,
    load: Option<String>,
    depth: Option<String>,
}

impl ColumnRoleMap {
    pub fn new(time: Option<String>, load: Option<String>, depth: Option<String>) -> Self {
        Self { time, load, depth }
    }

    /// The column resolved for `role`, if any.
    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Time => self.time.as_deref(),
            Role::Load => self.load.as_deref(),
            Role::Depth => self.depth.as_deref(),
        }
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }
}

// ── Unified table ─────────────────────────────────────────────────────────────

/// One merged row: its source unit plus one cell per unified column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedRow {
    pub unit: String,
    pub cells: Vec<Option<String>>,
}

/// All sources of a batch concatenated over the outer union of their columns.
///
/// Rows keep their order within each source, and sources keep batch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnifiedTable {
    /// Data columns in first-seen order. The unit tag is held on each row
    /// and exposed as [`UNIT_COLUMN`] by [`UnifiedTable::header`].
    pub columns: Vec<String>,
    pub rows: Vec<UnifiedRow>,
}

impl UnifiedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Full display header: data columns followed by the unit column.
    pub fn header(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(UNIT_COLUMN))
            .collect()
    }

    /// Cell values of one column in row order.
    pub fn column_values(&self, index: usize) -> Vec<Option<&str>> {
        self.rows
            .iter()
            .map(|row| row.cells.get(index).and_then(|c| c.as_deref()))
            .collect()
    }

    /// The first `n` rows, for the raw-data preview.
    pub fn preview(&self, n: usize) -> &[UnifiedRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

// ── Cleaned readings ──────────────────────────────────────────────────────────

/// A merged row that survived load and timestamp coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub unit: String,
    pub timestamp: NaiveDateTime,
    /// Shaker load in percent.
    pub load: f64,
    /// Depth when a depth column is resolved and the cell is numeric.
    pub depth: Option<f64>,
}

impl Reading {
    /// Calendar day of the reading (time of day dropped).
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// The unified table after coercion, ready for the metrics engine.
#[derive(Debug, Clone, Serialize)]
pub struct CleanTable {
    pub roles: ColumnRoleMap,
    /// How the time column was interpreted.
    pub time_format: DetectedFormat,
    /// Surviving rows in unified-table order.
    pub readings: Vec<Reading>,
    /// Rows in the unified table before cleaning.
    pub total_rows: usize,
    /// Rows removed because `load` was not numeric.
    pub dropped_load: usize,
    /// Rows removed because `time` did not normalize.
    pub dropped_time: usize,
}

impl CleanTable {
    /// The last `n` readings, for the load-over-time chart.
    pub fn tail(&self, n: usize) -> &[Reading] {
        let start = self.readings.len().saturating_sub(n);
        &self.readings[start..]
    }

    /// Readings on `date`, in table order.
    pub fn rows_on(&self, date: NaiveDate) -> Vec<&Reading> {
        self.readings.iter().filter(|r| r.date() == date).collect()
    }

    /// The latest calendar day present, if any.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.readings.iter().map(Reading::date).max()
    }
}

// ── Summaries ─────────────────────────────────────────────────────────────────

/// Secondary per-group aggregate: max depth when a depth column exists,
/// otherwise the number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Secondary {
    /// `None` when no row in the group has a numeric depth.
    MaxDepth(Option<f64>),
    RowCount(usize),
}

impl Secondary {
    /// Column label used by exports and tables.
    pub fn label(&self) -> &'static str {
        match self {
            Secondary::MaxDepth(_) => "Max Depth",
            Secondary::RowCount(_) => "Row Count",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Secondary::MaxDepth(d) => *d,
            Secondary::RowCount(n) => Some(*n as f64),
        }
    }
}

/// One aggregated record per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    /// Arithmetic mean of load across the day's rows.
    pub avg_load: f64,
    pub secondary: Secondary,
    /// Heuristic screen utilization, rounded to 2 places.
    pub utilization: f64,
    /// Number of cleaned rows on this date.
    pub rows: usize,
}

/// A reading of the selected day with its drop flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedReading {
    #[serde(flatten)]
    pub reading: Reading,
    /// Load moved by more than the drop threshold since the previous row.
    pub drop: bool,
}

/// Metrics for one selected day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub rows: Vec<FlaggedReading>,
    pub depth_value: Secondary,
    /// Mean load, rounded to 2 places.
    pub shaker_load: f64,
    /// Rounded to 2 places.
    pub screen_utilization: f64,
    /// Heuristic, rounded to 1 place.
    pub screen_life_remaining: f64,
    pub drop_count: usize,
}
