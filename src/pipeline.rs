//! Interactive and scheduled runs: credential -> fetch x2 -> compare -> render.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use crate::comparison::{compare, ComparisonTable};
use crate::credentials::{
    Authorizer, ConsentPolicy, CredentialManager, CredentialStore, FileStore, Scope,
};
use crate::dates::DateWindow;
use crate::oauth::GoogleAuthorizer;
use crate::prompt::Prompter;
use crate::report;
use crate::search_console::{SearchConsoleClient, SEARCH_CONSOLE_BASE};
use crate::sheets::{report_title, SheetsClient, Spreadsheet, SHEETS_BASE};

/// Options for a comparison run
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Search Console property, e.g. `https://example.com/` or `sc-domain:example.com`
    pub site_url: Option<String>,
    /// OAuth client secret downloaded from the Cloud console
    pub client_secret: PathBuf,
    /// Directory holding `token.json` and `token_spreadsheets.json`
    pub token_dir: PathBuf,
    /// Where interactive file reports are written
    pub output_dir: PathBuf,
    pub search_console_base: String,
    pub sheets_base: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            site_url: None,
            client_secret: PathBuf::from("client_secret.json"),
            token_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            search_console_base: SEARCH_CONSOLE_BASE.to_string(),
            sheets_base: SHEETS_BASE.to_string(),
        }
    }
}

pub struct Pipeline<'a> {
    options: &'a ReportOptions,
    credentials: CredentialManager<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        options: &'a ReportOptions,
        store: &'a dyn CredentialStore,
        authorizer: &'a dyn Authorizer,
        policy: ConsentPolicy,
    ) -> Self {
        Self {
            options,
            credentials: CredentialManager::new(store, authorizer, policy),
        }
    }

    /// Fetch both periods of `window` for `site_url` and compare them.
    pub fn compare_window(&self, site_url: &str, window: &DateWindow) -> Result<ComparisonTable> {
        let credential = self
            .credentials
            .obtain(Scope::Reporting)
            .context("Failed to obtain Search Console credentials")?;
        let client = SearchConsoleClient::new(&self.options.search_console_base, &credential);

        println!(
            "{} Fetching {} to {}",
            ">>".yellow(),
            window.current_start,
            window.current_end
        );
        let current = client
            .fetch(site_url, window.current_start, window.current_end)
            .with_context(|| format!("Failed to fetch metrics for {}", window.current_start))?;

        println!(
            "{} Fetching {} to {}",
            ">>".yellow(),
            window.prior_start,
            window.prior_end
        );
        let prior = client
            .fetch(site_url, window.prior_start, window.prior_end)
            .with_context(|| format!("Failed to fetch metrics for {}", window.prior_start))?;

        let table = compare(&prior, &current, window).context("Failed to compare periods")?;
        tracing::info!(site = site_url, rows = table.rows.len(), "comparison complete");
        Ok(table)
    }

    pub fn publish_spreadsheet(
        &self,
        site_url: &str,
        window: &DateWindow,
        table: &ComparisonTable,
    ) -> Result<Spreadsheet> {
        let credential = self
            .credentials
            .obtain(Scope::Spreadsheets)
            .context("Failed to obtain Sheets credentials")?;
        let client = SheetsClient::new(&self.options.sheets_base, &credential);

        let title = report_title(window, site_url);
        println!("{} Creating spreadsheet {}", ">>".yellow(), title.cyan());
        let spreadsheet = client
            .publish(&title, table, window)
            .context("Failed to publish spreadsheet report")?;

        println!(
            "  {} Spreadsheet {}",
            "+".green(),
            spreadsheet
                .url
                .as_deref()
                .unwrap_or(&spreadsheet.spreadsheet_id)
        );
        Ok(spreadsheet)
    }
}

/// Interactive run on the process terminal.
pub fn run_interactive(options: &ReportOptions) -> Result<Option<PathBuf>> {
    let store = FileStore::new(&options.token_dir);
    let authorizer = GoogleAuthorizer::new(&options.client_secret);
    let pipeline = Pipeline::new(options, &store, &authorizer, ConsentPolicy::Interactive);

    let stdin = std::io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), std::io::stdout());
    run_interactive_with(&pipeline, &mut prompter)
}

/// Month prompt, comparison, then at most one file report. Returns the
/// written path, or `None` when the operator declines.
pub fn run_interactive_with<R: BufRead, W: Write>(
    pipeline: &Pipeline<'_>,
    prompter: &mut Prompter<R, W>,
) -> Result<Option<PathBuf>> {
    let site_url = match &pipeline.options.site_url {
        Some(url) => url.clone(),
        None => prompter.ask_site_url()?,
    };
    let window = prompter.ask_month()?;

    let table = pipeline.compare_window(&site_url, &window)?;
    table.print_summary();
    println!();

    if !prompter.confirm_report()? {
        println!("{} No report written", "!".yellow());
        return Ok(None);
    }

    let format = prompter.ask_format()?;
    let path = prompter.ask_new_filename(&pipeline.options.output_dir)?;
    report::save(&table, format, &path)
        .with_context(|| format!("Failed to write {} report to {}", format, path.display()))?;

    println!("  {} Report saved to {}", "+".green(), path.display());
    Ok(Some(path))
}

/// Unattended run for the most recently completed month before `today`.
///
/// Blocks on consent only when stdin is a terminal; otherwise a missing or
/// revoked credential is an immediate error.
pub fn run_scheduled(options: &ReportOptions, today: NaiveDate) -> Result<Spreadsheet> {
    let policy = if std::io::stdin().is_terminal() {
        ConsentPolicy::Interactive
    } else {
        ConsentPolicy::Headless
    };

    let store = FileStore::new(&options.token_dir);
    let authorizer = GoogleAuthorizer::new(&options.client_secret);
    let pipeline = Pipeline::new(options, &store, &authorizer, policy);
    run_scheduled_with(&pipeline, today)
}

pub fn run_scheduled_with(pipeline: &Pipeline<'_>, today: NaiveDate) -> Result<Spreadsheet> {
    let Some(site_url) = pipeline.options.site_url.as_deref() else {
        bail!("--url is required in schedule mode");
    };

    let window = DateWindow::last_completed_month(today)?;
    tracing::info!(
        site = site_url,
        month = %window.current_start,
        "scheduled comparison"
    );

    let table = pipeline.compare_window(site_url, &window)?;
    pipeline.publish_spreadsheet(site_url, &window, &table)
}
