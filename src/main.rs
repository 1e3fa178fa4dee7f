use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

fn main() -> Result<()> {
    let cli = Cli::parse();
    gsc_compare::logging::init();

    if cli.schedule && cli.url.is_none() {
        bail!("--url is required with --schedule");
    }

    let options = gsc_compare::ReportOptions {
        site_url: cli.url,
        client_secret: cli.token,
        token_dir: cli.token_dir,
        ..Default::default()
    };

    if cli.schedule {
        return gsc_compare::schedule(&options);
    }

    println!("{}", "Search Console year-over-year comparison".bold());
    gsc_compare::run_interactive(&options)?;
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "gsc-compare",
    about = "Compare a month of Search Console metrics with the same month a year earlier",
    version
)]
struct Cli {
    /// Site URL as registered in Search Console
    #[arg(long)]
    url: Option<String>,
    /// Path to the OAuth client secret JSON file
    #[arg(long, default_value = "client_secret.json")]
    token: PathBuf,
    /// Unattended run for last month, published as a Google Sheet
    #[arg(long)]
    schedule: bool,
    /// Directory for token.json and token_spreadsheets.json
    #[arg(long, default_value = ".")]
    token_dir: PathBuf,
}
