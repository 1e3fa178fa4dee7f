//! Shared plumbing for the Google REST clients.

use reqwest::blocking::{Client, Response};

use crate::error::{ReportError, Result};

pub(crate) fn http_client() -> Client {
    Client::builder()
        .user_agent(concat!("gsc-compare/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Pass through 2xx responses; anything else becomes [`ReportError::Api`].
pub(crate) fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    tracing::debug!(status = status.as_u16(), %body, "API call failed");
    Err(ReportError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Trim a configured base URL so paths can be appended with `/`.
pub(crate) fn base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
