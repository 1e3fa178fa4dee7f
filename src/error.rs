//! Error taxonomy for the comparison pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Consent flow failed or was declined by the operator.
    #[error("Authorization failed: {0}")]
    Credential(String),

    /// A fresh consent is needed but the run cannot block on a human.
    #[error(
        "No usable credential for {scope} in {path}; run interactively once to grant access"
    )]
    ConsentRequired { scope: String, path: String },

    /// The provider refused to refresh the stored token.
    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Search Console returned no data for {site} between {start} and {end}")]
    NoData {
        site: String,
        start: String,
        end: String,
    },

    #[error("Unsupported report format '{0}' (expected CSV or PDF)")]
    UnsupportedFormat(String),

    #[error("Metric '{0}' is missing from the current period")]
    MissingMetric(String),

    #[error("Metric '{0}' is zero in the prior period; percent change is undefined")]
    ZeroBaseline(String),

    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("PDF error: {0}")]
    Pdf(String),
}
