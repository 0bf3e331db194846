//! Timestamp normalization for columns of unknown textual format.
//!
//! A column is tried against an ordered list of [`DateStrategy`] values. A
//! pattern strategy must parse every non-missing value to be accepted; the
//! final permissive strategy converts what it can and leaves the rest missing.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ShakerError};

/// Candidate patterns tried before the permissive fallback, in priority order.
pub const DEFAULT_DATE_PATTERNS: &[&str] = &["YYYY/MM/DD", "MM/DD/YYYY", "YYYY-MM-DD", "DD/MM/YYYY"];

// ── DatePattern ───────────────────────────────────────────────────────────────

/// A date layout such as `YYYY/MM/DD`, optionally followed by a time of day.
#[derive(Debug, Clone)]
pub struct DatePattern {
    label: String,
    format: String,
    widths: Option<Regex>,
}

impl PartialEq for DatePattern {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.format == other.format
    }
}

impl Eq for DatePattern {}

impl DatePattern {
    /// Build a pattern from `YYYY`/`YY`/`MM`/`DD` tokens or a raw strftime
    /// string (anything containing `%` is taken as-is).
    pub fn parse(layout: &str) -> Result<Self> {
        let layout = layout.trim();
        let format = if layout.contains('%') {
            layout.to_string()
        } else {
            token_regex()
                .replace_all(layout, |caps: &regex::Captures<'_>| match &caps[0] {
                    "YYYY" => "%Y",
                    "YY" => "%y",
                    "MM" => "%m",
                    _ => "%d",
                })
                .into_owned()
        };

        let has_year = format.contains("%Y") || format.contains("%y");
        let has_month = format.contains("%m") || format.contains("%b") || format.contains("%B");
        if !has_year || !has_month || !format.contains("%d") {
            return Err(ShakerError::Config(format!(
                "date format \"{}\" must contain year, month and day",
                layout
            )));
        }

        let widths = width_regex(&format);
        Ok(Self {
            label: layout.to_string(),
            format,
            widths,
        })
    }

    /// The default candidate list.
    pub fn defaults() -> Vec<DatePattern> {
        DEFAULT_DATE_PATTERNS
            .iter()
            .filter_map(|p| DatePattern::parse(p).ok())
            .collect()
    }

    /// The pattern as the caller wrote it, e.g. `"DD/MM/YYYY"`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parse one value: the date must match the pattern, and whatever
    /// follows it must be empty or a recognisable time of day.
    pub fn parse_value(&self, value: &str) -> Option<NaiveDateTime> {
        parse_date_then_time(value.trim(), &self.format, self.widths.as_ref())
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"YYYY|YY|MM|DD").expect("static regex"))
}

/// Anchored prefix regex holding a strftime date layout to fixed field
/// widths: `%Y` is four digits, `%y` two, `%m` and `%d` one or two. `None`
/// when the layout uses a specifier with no known width.
fn width_regex(format: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let piece = match chars.next()? {
                'Y' => r"\d{4}",
                'y' => r"\d{2}",
                'm' | 'd' | 'H' | 'I' | 'M' | 'S' => r"\d{1,2}",
                'e' => r"\s?\d{1,2}",
                'b' | 'B' => r"[[:alpha:]]+",
                'p' => r"[AaPp][Mm]",
                '%' => "%",
                _ => return None,
            };
            re.push_str(piece);
        } else if c.is_whitespace() {
            re.push_str(r"\s*");
        } else {
            re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        }
    }
    Regex::new(&re).ok()
}

fn epoch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{10}|\d{13})$").expect("static regex"))
}

// ── Time of day ───────────────────────────────────────────────────────────────

const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S%.f",
    "%H:%M:%S",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
    "%I:%M:%S%p",
    "%I:%M%p",
];

/// Parse the text following a date. Empty text means midnight.
pub fn parse_time_of_day(rest: &str) -> Option<NaiveTime> {
    let rest = rest.trim_start_matches(['T', 't']).trim();
    if rest.is_empty() {
        return Some(NaiveTime::MIN);
    }
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(rest, fmt).ok())
}

fn parse_date_then_time(
    value: &str,
    date_format: &str,
    widths: Option<&Regex>,
) -> Option<NaiveDateTime> {
    if widths.is_some_and(|re| !re.is_match(value)) {
        return None;
    }
    let (date, rest) = NaiveDate::parse_and_remainder(value, date_format).ok()?;
    let time = parse_time_of_day(rest)?;
    Some(date.and_time(time))
}

// ── Permissive parsing ────────────────────────────────────────────────────────

/// Date layouts tried by the permissive pass after the structured formats.
const PERMISSIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%Y%m%d",
    "%d %b %Y",
    "%d-%b-%Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%m/%d/%y",
    "%d/%m/%y",
];

/// Best-effort conversion of a single free-form timestamp.
///
/// Values with a UTC offset are converted to UTC before the offset is
/// dropped. Ten- and thirteen-digit integers are read as Unix seconds and
/// milliseconds.
pub fn parse_permissive(value: &str) -> Option<NaiveDateTime> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }

    let normalised = match s.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => s.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalised, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_utc());
    }

    if epoch_regex().is_match(s) {
        let n: i64 = s.parse().ok()?;
        let dt = if s.len() == 13 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
        return dt.map(|d| d.naive_utc());
    }

    permissive_layouts()
        .iter()
        .find_map(|(fmt, widths)| parse_date_then_time(s, fmt, widths.as_ref()))
}

fn permissive_layouts() -> &'static [(&'static str, Option<Regex>)] {
    static LAYOUTS: OnceLock<Vec<(&'static str, Option<Regex>)>> = OnceLock::new();
    LAYOUTS.get_or_init(|| {
        PERMISSIVE_DATE_FORMATS
            .iter()
            .map(|fmt| (*fmt, width_regex(fmt)))
            .collect()
    })
}

// ── Strategies ────────────────────────────────────────────────────────────────

/// How a time column ended up being interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    /// Every non-missing value matched this pattern.
    Pattern(String),
    /// Free-form fallback; `unparsed` values became missing.
    Permissive { parsed: usize, unparsed: usize },
}

/// Result of applying one strategy to a whole column.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Success {
        values: Vec<Option<NaiveDateTime>>,
        format: DetectedFormat,
    },
    Failed,
}

/// One step of the ordered fallback list.
#[derive(Debug, Clone)]
pub enum DateStrategy {
    Pattern(DatePattern),
    Permissive,
}

impl DateStrategy {
    /// Apply the strategy to every value of a column at once.
    pub fn apply(&self, values: &[Option<&str>]) -> ParseOutcome {
        match self {
            DateStrategy::Pattern(pattern) => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    match value.map(str::trim).filter(|s| !s.is_empty()) {
                        None => out.push(None),
                        Some(s) => match pattern.parse_value(s) {
                            Some(ts) => out.push(Some(ts)),
                            None => {
                                debug!(pattern = pattern.label(), value = s, "pattern rejected");
                                return ParseOutcome::Failed;
                            }
                        },
                    }
                }
                ParseOutcome::Success {
                    values: out,
                    format: DetectedFormat::Pattern(pattern.label().to_string()),
                }
            }
            DateStrategy::Permissive => {
                let out: Vec<Option<NaiveDateTime>> = values
                    .iter()
                    .map(|v| v.and_then(parse_permissive))
                    .collect();
                let parsed = out.iter().filter(|v| v.is_some()).count();
                if parsed == 0 {
                    return ParseOutcome::Failed;
                }
                let non_missing = values
                    .iter()
                    .filter(|v| v.is_some_and(|s| !s.trim().is_empty()))
                    .count();
                ParseOutcome::Success {
                    values: out,
                    format: DetectedFormat::Permissive {
                        parsed,
                        unparsed: non_missing - parsed,
                    },
                }
            }
        }
    }
}

// ── TimestampNormalizer ───────────────────────────────────────────────────────

/// Converts a raw time column into naive instants.
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    strategies: Vec<DateStrategy>,
}

impl TimestampNormalizer {
    /// Strategies are the given patterns in order, then the permissive pass.
    pub fn new(patterns: &[DatePattern]) -> Self {
        let strategies = patterns
            .iter()
            .cloned()
            .map(DateStrategy::Pattern)
            .chain(std::iter::once(DateStrategy::Permissive))
            .collect();
        Self { strategies }
    }

    pub fn strategies(&self) -> &[DateStrategy] {
        &self.strategies
    }

    /// Normalize `values` (the cells of `column`).
    ///
    /// Returns one entry per input value, `None` where the value is missing
    /// or could not be converted, plus the format that was used. Fails with
    /// [`ShakerError::TimestampUnparseable`] when nothing converts.
    pub fn normalize(
        &self,
        column: &str,
        values: &[Option<&str>],
    ) -> Result<(Vec<Option<NaiveDateTime>>, DetectedFormat)> {
        let non_missing = values
            .iter()
            .filter(|v| v.is_some_and(|s| !s.trim().is_empty()))
            .count();
        if non_missing == 0 {
            return Err(ShakerError::TimestampUnparseable {
                column: column.to_string(),
                non_missing,
            });
        }

        for strategy in &self.strategies {
            if let ParseOutcome::Success { values, format } = strategy.apply(values) {
                match &format {
                    DetectedFormat::Pattern(label) => {
                        info!(column, format = %label, "timestamp column matched pattern");
                    }
                    DetectedFormat::Permissive { parsed, unparsed } => {
                        warn!(
                            column,
                            parsed, unparsed, "no pattern fit every value; used permissive parsing"
                        );
                    }
                }
                return Ok((values, format));
            }
        }

        Err(ShakerError::TimestampUnparseable {
            column: column.to_string(),
            non_missing,
        })
    }
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(&DatePattern::defaults())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
