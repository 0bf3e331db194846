use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::calculations::HeuristicCoefficients;
use crate::error::{Result, ShakerError};
use crate::time_utils::DatePattern;

/// Allowed range for the utilization threshold, in percent.
pub const THRESHOLD_RANGE: std::ops::RangeInclusive<f64> = 50.0..=100.0;
/// Default utilization threshold, in percent.
pub const DEFAULT_THRESHOLD: f64 = 80.0;
/// Data rows parsed per file in preview mode.
pub const PREVIEW_ROW_CAP: usize = 1000;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Daily shaker load and screen utilization summaries from rig CSV exports
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shaker-monitor",
    about = "Daily shaker load and screen utilization summaries from rig CSV exports",
    version
)]
pub struct Settings {
    /// CSV file, ZIP archive of CSV files, or directory containing CSV files
    pub input: PathBuf,

    /// Input kind (auto-detected from the path if not specified)
    #[arg(long, default_value = "auto", value_parser = ["auto", "zip", "csv", "dir"])]
    pub kind: String,

    /// Utilization threshold in percent (50-100)
    #[arg(long, default_value = "80", value_parser = clap::value_parser!(u8).range(50..=100))]
    pub threshold: u8,

    /// Preview mode: parse at most 1000 data rows per file
    #[arg(long)]
    pub preview: bool,

    /// Parse at most this many data rows per file (overrides --preview)
    #[arg(long)]
    pub preview_rows: Option<usize>,

    /// Include the first merged rows in the table output
    #[arg(long)]
    pub raw: bool,

    /// Candidate date format, repeatable, tried in order (e.g. DD/MM/YYYY)
    #[arg(long = "date-format")]
    pub date_format: Vec<String>,

    /// Day to inspect (YYYY-MM-DD); defaults to the latest day in the data
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Load change in percentage points that flags a drop
    #[arg(long, default_value = "5.0")]
    pub drop_threshold: f64,

    /// Multiplier for the remaining screen life estimate
    #[arg(long, default_value = "1.5")]
    pub screen_life_factor: f64,

    /// Parse files of a batch in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Write the daily summary as CSV to this path
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    pub output: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── Input kind ─────────────────────────────────────────────────────────────────

/// What the input path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Zip,
    Csv,
    Dir,
}

impl InputKind {
    /// Resolve a `--kind` value; `"auto"` looks at the path.
    pub fn resolve(kind: &str, path: &Path) -> Result<Self> {
        match kind {
            "zip" => Ok(InputKind::Zip),
            "csv" => Ok(InputKind::Csv),
            "dir" => Ok(InputKind::Dir),
            "auto" => {
                if path.is_dir() {
                    return Ok(InputKind::Dir);
                }
                let is_zip = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("zip"))
                    .unwrap_or(false);
                Ok(if is_zip { InputKind::Zip } else { InputKind::Csv })
            }
            other => Err(ShakerError::Config(format!("unknown input kind: {}", other))),
        }
    }
}

// ── PipelineConfig ─────────────────────────────────────────────────────────────

/// Everything one ingestion batch needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Utilization threshold in percent (50-100).
    pub threshold: f64,
    /// Cap on data rows parsed per file; `None` parses everything.
    pub preview_row_cap: Option<usize>,
    /// Candidate timestamp patterns, in priority order.
    pub date_formats: Vec<DatePattern>,
    pub heuristics: HeuristicCoefficients,
    /// Parse the files of a batch on the rayon pool.
    pub parallel_parse: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            preview_row_cap: None,
            date_formats: DatePattern::defaults(),
            heuristics: HeuristicCoefficients::default(),
            parallel_parse: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_preview_row_cap(mut self, cap: usize) -> Self {
        self.preview_row_cap = Some(cap);
        self
    }

    /// Check ranges before a batch starts.
    pub fn validate(&self) -> Result<()> {
        if !THRESHOLD_RANGE.contains(&self.threshold) {
            return Err(ShakerError::Config(format!(
                "threshold {} is outside 50-100",
                self.threshold
            )));
        }
        if self.date_formats.is_empty() {
            return Err(ShakerError::Config(
                "at least one date format is required".to_string(),
            ));
        }
        let HeuristicCoefficients {
            drop_threshold,
            screen_life_factor,
        } = self.heuristics;
        if !drop_threshold.is_finite() || drop_threshold < 0.0 {
            return Err(ShakerError::Config(format!(
                "drop threshold {} must be non-negative",
                self.heuristics.drop_threshold
            )));
        }
        if !screen_life_factor.is_finite() || screen_life_factor <= 0.0 {
            return Err(ShakerError::Config(format!(
                "screen life factor {} must be positive",
                self.heuristics.screen_life_factor
            )));
        }
        Ok(())
    }
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.shaker-monitor/last_used.json`.
///
/// Only the threshold and output format carry over between runs. Date
/// formats and heuristic coefficients change how an upload is interpreted,
/// so they always come from the current command line.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".shaker-monitor").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins over persisted values.
        if !is_arg_explicitly_set(&matches, "threshold") {
            if let Some(v) = last.threshold.filter(|t| (50..=100).contains(t)) {
                settings.threshold = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "output") {
            if let Some(v) = last.output {
                settings.output = v;
            }
        }

        settings = Self::apply_debug(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Build and validate the batch parameters described by these settings.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let date_formats = if self.date_format.is_empty() {
            DatePattern::defaults()
        } else {
            self.date_format
                .iter()
                .map(|f| DatePattern::parse(f))
                .collect::<Result<Vec<_>>>()?
        };

        let config = PipelineConfig {
            threshold: f64::from(self.threshold),
            preview_row_cap: self
                .preview_rows
                .or(self.preview.then_some(PREVIEW_ROW_CAP)),
            date_formats,
            heuristics: HeuristicCoefficients {
                drop_threshold: self.drop_threshold,
                screen_life_factor: self.screen_life_factor,
            },
            parallel_parse: self.parallel,
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve `--kind` against the input path.
    pub fn input_kind(&self) -> Result<InputKind> {
        InputKind::resolve(&self.kind, &self.input)
    }

    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            threshold: Some(s.threshold),
            output: Some(s.output.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
