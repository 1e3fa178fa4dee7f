//! Aggregate metric queries against the Search Console API.

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::api;
use crate::credentials::Credential;
use crate::error::{ReportError, Result};
use crate::metrics::{Metric, MetricSet};

pub const SEARCH_CONSOLE_BASE: &str = "https://searchconsole.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    #[serde(default)]
    ctr: f64,
    #[serde(default)]
    position: f64,
}

impl QueryRow {
    fn into_metric_set(self) -> MetricSet {
        MetricSet::from_pairs(Metric::ALL.iter().map(|&m| {
            let value = match m {
                Metric::Clicks => self.clicks,
                Metric::Impressions => self.impressions,
                Metric::Ctr => self.ctr,
                Metric::Position => self.position,
            };
            (m.name(), value)
        }))
    }
}

pub struct SearchConsoleClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl SearchConsoleClient {
    pub fn new(base_url: &str, credential: &Credential) -> Self {
        Self {
            http: api::http_client(),
            base_url: api::base(base_url),
            access_token: credential.token.clone(),
        }
    }

    /// Totals for `site_url` between `start` and `end`, both inclusive.
    pub fn fetch(&self, site_url: &str, start: NaiveDate, end: NaiveDate) -> Result<MetricSet> {
        let url = format!(
            "{}/webmasters/v3/sites/{}/searchAnalytics/query",
            self.base_url,
            urlencoding::encode(site_url)
        );
        let request = QueryRequest {
            start_date: start.to_string(),
            end_date: end.to_string(),
        };

        tracing::debug!(site = site_url, %start, %end, "querying search analytics");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()?;
        let response: QueryResponse = api::check(resp)?.json()?;

        response
            .rows
            .into_iter()
            .next()
            .map(QueryRow::into_metric_set)
            .ok_or_else(|| ReportError::NoData {
                site: site_url.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn query_path() -> Matcher {
        Matcher::Regex(r"^/webmasters/v3/sites/[^/]+/searchAnalytics/query$".to_string())
    }

    fn credential() -> Credential {
        Credential {
            token: "ya29.test".to_string(),
            refresh_token: None,
            token_uri: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: vec![],
            expiry: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fetch_returns_first_row_in_vocabulary_order() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", query_path())
            .match_header("authorization", "Bearer ya29.test")
            .match_body(Matcher::Json(serde_json::json!({
                "startDate": "2024-01-01",
                "endDate": "2024-01-31"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"rows":[{"position":7.25,"ctr":0.031,"impressions":15000,"clicks":465}],"responseAggregationType":"byProperty"}"#,
            )
            .create();

        let client = SearchConsoleClient::new(&server.url(), &credential());
        let set = client
            .fetch("https://example.com/", day(2024, 1, 1), day(2024, 1, 31))
            .unwrap();

        mock.assert();
        let pairs: Vec<(&str, f64)> = set.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("clicks", 465.0),
                ("impressions", 15000.0),
                ("ctr", 0.031),
                ("position", 7.25)
            ]
        );
    }

    #[test]
    fn empty_result_is_no_data() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", query_path())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"responseAggregationType":"byProperty"}"#)
            .create();

        let client = SearchConsoleClient::new(&server.url(), &credential());
        let err = client
            .fetch("https://example.com/", day(2022, 12, 1), day(2022, 12, 31))
            .unwrap_err();

        match err {
            ReportError::NoData { site, start, end } => {
                assert_eq!(site, "https://example.com/");
                assert_eq!(start, "2022-12-01");
                assert_eq!(end, "2022-12-31");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn permission_denied_is_an_api_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", query_path())
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"User does not have sufficient permission"}}"#)
            .create();

        let client = SearchConsoleClient::new(&format!("{}/", server.url()), &credential());
        let err = client
            .fetch("https://example.com/", day(2024, 1, 1), day(2024, 1, 31))
            .unwrap_err();
        assert!(matches!(err, ReportError::Api { status: 403, ref body } if body.contains("permission")));
    }
}
