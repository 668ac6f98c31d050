//! Terminal report rendering and JSON export
//!
//! Turns a usage summary into the colorized cost report printed at
//! session end, and optionally persists the summary as JSON.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::models::session::UsageSummary;

/// Render the end-of-session cost report
pub fn render_report(invocation: &str, summary: &UsageSummary) -> String {
    let separator = "=".repeat(80).bright_black();
    let models = summary
        .models
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let usage = format!(
        "prompt={} completion={} total={}",
        summary.total_usage.prompt, summary.total_usage.completion, summary.total_usage.total
    );
    let pricing = serde_json::to_string(&summary.pricing_snapshot)
        .unwrap_or_else(|_| "<unserializable>".to_string());
    let cost = format!("${:.6}", summary.total_cost);

    format!(
        "\n{header}\n{separator}\n{inv_label}: {invocation}\n{models_label}: {models}\n{usage_label}: {usage}\n{pricing_label}: {pricing}\n{cost_label}: {cost}\n{separator}\n",
        header = "tokmeter cost report:".green().bold(),
        separator = separator,
        inv_label = "Monitored invocation".bold(),
        invocation = invocation,
        models_label = "Models".bold(),
        models = models,
        usage_label = "Usage".bold(),
        usage = usage,
        pricing_label = "Pricing".bold(),
        pricing = pricing,
        cost_label = "Cost".magenta().bold(),
        cost = cost.magenta().bold(),
    )
}

/// Write the summary as pretty-printed JSON
pub fn write_summary_json(path: &Path, summary: &UsageSummary) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    Ok(())
}
