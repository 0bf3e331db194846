mod bootstrap;
mod report;

use anyhow::{Context, Result};
use shaker_core::settings::Settings;
use shaker_data::analysis::{analyze_path, BatchOutcome};
use shaker_data::export::write_summary_csv;

fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Shaker Monitor v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings.pipeline_config()?;
    let kind = settings.input_kind()?;
    tracing::info!(
        "Input: {}, kind: {:?}, threshold: {}%",
        settings.input.display(),
        kind,
        config.threshold
    );

    let outcome = analyze_path(&settings.input, kind, &config).map_err(|e| {
        tracing::error!(reason = e.reason_code(), "batch failed: {}", e);
        let reason = e.reason_code();
        anyhow::Error::new(e).context(format!("batch failed [{}]", reason))
    })?;

    let report = match outcome {
        BatchOutcome::NoCsvFound { upload_name } => {
            tracing::warn!("No CSV files found in {}", upload_name);
            println!("No CSV files found in {}", upload_name);
            return Ok(());
        }
        BatchOutcome::Ready(report) => report,
    };

    if let Some(path) = &settings.export {
        write_summary_csv(path, &report.daily)
            .with_context(|| format!("failed to export daily summary to {}", path.display()))?;
    }

    let snapshot = report.snapshot(settings.date);
    let output = match settings.output.as_str() {
        "json" => report::render_json(&report, snapshot.as_ref())?,
        _ => report::render_text(&report, snapshot.as_ref(), settings.date, settings.raw),
    };
    println!("{}", output);

    Ok(())
}
