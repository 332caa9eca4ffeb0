//! Artifact export: equity and weights as CSV, the full result as JSON,
//! and a Markdown summary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::metrics::Statistic;
use crate::runner::RotationResult;

// ─── CSV export ─────────────────────────────────────────────────────

/// `date,strategy,benchmark`; the benchmark cell is empty when absent.
pub fn export_equity_csv(result: &RotationResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "strategy", "benchmark"])?;
    for (date, equity) in result.equity.iter() {
        let bench = result
            .benchmark_equity
            .as_ref()
            .and_then(|b| b.get(date))
            .map(|v| format!("{v:.2}"))
            .unwrap_or_default();
        wtr.write_record([date.to_string(), format!("{equity:.2}"), bench])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// `date,<ticker>...` with one row per backtest day.
pub fn export_weights_csv(result: &RotationResult) -> Result<String> {
    let weights = &result.weights;
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["date".to_string()];
    header.extend(weights.columns().iter().cloned());
    wtr.write_record(&header)?;
    for (row, date) in weights.dates().iter().enumerate() {
        let mut record = vec![date.to_string()];
        record.extend(weights.row(row).iter().map(|w| format!("{w:.4}")));
        wtr.write_record(&record)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_json(result: &RotationResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize RotationResult to JSON")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `equity.csv`, `weights.csv`, `report.json` and `report.md` into
/// `output_dir`, creating it if needed. Returns the directory.
pub fn save_artifacts(result: &RotationResult, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create artifact dir: {}", output_dir.display()))?;

    std::fs::write(output_dir.join("equity.csv"), export_equity_csv(result)?)?;
    std::fs::write(output_dir.join("weights.csv"), export_weights_csv(result)?)?;
    std::fs::write(output_dir.join("report.json"), export_json(result)?)?;
    std::fs::write(output_dir.join("report.md"), generate_report(result))?;

    Ok(output_dir.to_path_buf())
}

/// Read back a result saved by [`save_artifacts`].
pub fn load_artifacts(dir: &Path) -> Result<RotationResult> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).context("failed to deserialize RotationResult from JSON")
}

// ─── Markdown report ────────────────────────────────────────────────

/// Format a statistic for display: percentages with two decimals, ratios with three.
pub fn format_statistic(statistic: Statistic, value: f64) -> String {
    if value.is_nan() {
        "n/a".into()
    } else if statistic.is_percentage() {
        format!("{:.2}%", value * 100.0)
    } else {
        format!("{value:.3}")
    }
}

pub fn generate_report(result: &RotationResult) -> String {
    let mut md = String::with_capacity(1024);

    md.push_str("# Sector Rotation Report\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Period | {} to {} |\n", result.start, result.end));
    md.push_str(&format!("| Initial Capital | {:.0} |\n", result.initial_capital));
    if let Some((_, last)) = result.equity.last() {
        md.push_str(&format!("| Final Equity | {last:.0} |\n"));
    }
    md.push_str(&format!("| Rebalances | {} |\n", result.decisions.len()));
    md.push_str(&format!("| Skipped Months | {} |\n", result.skipped.len()));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Performance\n\n");
    match &result.report {
        Some(report) => {
            md.push_str("| Statistic | Strategy | Benchmark |\n");
            md.push_str("| --- | --- | --- |\n");
            for row in &report.rows {
                let bench = row
                    .benchmark
                    .map(|b| format_statistic(row.statistic, b))
                    .unwrap_or_else(|| "-".into());
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    row.statistic.label(),
                    format_statistic(row.statistic, row.strategy),
                    bench
                ));
            }
        }
        None => md.push_str("No return days in the backtest window.\n"),
    }
    md.push('\n');

    if let Some(latest) = result.latest_decision() {
        md.push_str(&format!("## Holdings as of {}\n\n", latest.date));
        for ticker in &latest.selected {
            md.push_str(&format!("- {ticker}\n"));
        }
    }

    md
}
