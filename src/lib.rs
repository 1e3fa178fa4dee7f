mod api;
pub mod comparison;
pub mod credentials;
pub mod dates;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod oauth;
mod pipeline;
pub mod prompt;
pub mod report;
pub mod search_console;
pub mod sheets;

pub use comparison::{ComparisonRow, ComparisonTable};
pub use dates::DateWindow;
pub use error::ReportError;
pub use metrics::{Metric, MetricSet};
pub use pipeline::{
    run_interactive, run_interactive_with, run_scheduled, run_scheduled_with, Pipeline,
    ReportOptions,
};
pub use report::ReportFormat;

use anyhow::Result;
use chrono::Local;
use colored::Colorize;

/// Scheduled run for the month completed before today, local time.
pub fn schedule(options: &ReportOptions) -> Result<()> {
    let site = options.site_url.as_deref().unwrap_or_default();
    println!(
        "{} Scheduled comparison for {}",
        ">>".yellow(),
        site.cyan().bold()
    );

    let spreadsheet = run_scheduled(options, Local::now().date_naive())?;

    println!("\n{}", "=".repeat(60).dimmed());
    println!("{} {}", "REPORT PUBLISHED".green().bold(), spreadsheet.spreadsheet_id);
    println!("{}", "=".repeat(60).dimmed());

    Ok(())
}
