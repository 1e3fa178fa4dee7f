//! Google Sheets sink: a new spreadsheet holding the table and a column chart.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api;
use crate::comparison::ComparisonTable;
use crate::credentials::Credential;
use crate::dates::DateWindow;
use crate::error::{ReportError, Result};

pub const SHEETS_BASE: &str = "https://sheets.googleapis.com";

const SHEET_TITLE: &str = "Sheet1";

/// Column of the chart domain (metric names) and of its one series (change %).
const DOMAIN_COLUMN: i64 = 0;
const SERIES_COLUMN: i64 = 3;

/// Chart overlay anchor, one row down and one column right of the data.
const ANCHOR_ROW: i64 = 1;
const ANCHOR_COLUMN: i64 = 5;

/// A spreadsheet created by [`SheetsClient::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spreadsheet {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    spreadsheet_id: String,
    #[serde(default)]
    spreadsheet_url: Option<String>,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
}

pub struct SheetsClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(base_url: &str, credential: &Credential) -> Self {
        Self {
            http: api::http_client(),
            base_url: api::base(base_url),
            access_token: credential.token.clone(),
        }
    }

    /// Create, fill and chart a spreadsheet for `table`.
    pub fn publish(
        &self,
        title: &str,
        table: &ComparisonTable,
        window: &DateWindow,
    ) -> Result<Spreadsheet> {
        let spreadsheet = self.create(title)?;
        self.write_table(&spreadsheet, table)?;
        self.add_chart(&spreadsheet, &chart_title(window), table.line_count())?;
        Ok(spreadsheet)
    }

    /// New spreadsheet with a single sheet.
    pub fn create(&self, title: &str) -> Result<Spreadsheet> {
        let body = json!({
            "properties": { "title": title },
            "sheets": [ { "properties": { "title": SHEET_TITLE } } ]
        });

        tracing::debug!(%title, "creating spreadsheet");
        let resp = self
            .http
            .post(format!("{}/v4/spreadsheets", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()?;
        let created: CreateResponse = api::check(resp)?.json()?;

        let sheet_id = created
            .sheets
            .first()
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| ReportError::Api {
                status: 200,
                body: "created spreadsheet has no sheets".to_string(),
            })?;

        Ok(Spreadsheet {
            spreadsheet_id: created.spreadsheet_id,
            sheet_id,
            url: created.spreadsheet_url,
        })
    }

    /// Write header and rows from the top-left cell, values as entered.
    pub fn write_table(&self, spreadsheet: &Spreadsheet, table: &ComparisonTable) -> Result<()> {
        let range = table_range(table);
        let body = json!({
            "range": &range,
            "majorDimension": "ROWS",
            "values": table_values(table),
        });

        let resp = self
            .http
            .put(format!(
                "{}/v4/spreadsheets/{}/values/{}",
                self.base_url, spreadsheet.spreadsheet_id, range
            ))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()?;
        api::check(resp)?;
        Ok(())
    }

    pub fn add_chart(&self, spreadsheet: &Spreadsheet, title: &str, lines: usize) -> Result<()> {
        let body = json!({
            "requests": [ add_chart_request(spreadsheet.sheet_id, title, lines) ]
        });

        let resp = self
            .http
            .post(format!(
                "{}/v4/spreadsheets/{}:batchUpdate",
                self.base_url, spreadsheet.spreadsheet_id
            ))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()?;
        api::check(resp)?;
        Ok(())
    }
}

/// `SEO Report - December 2023 (https://example.com/)`
pub fn report_title(window: &DateWindow, site_url: &str) -> String {
    format!(
        "SEO Report - {} {} ({})",
        window.month_name(),
        window.current_year(),
        site_url
    )
}

/// `Changes of metrics December 2022 - December 2023`
pub fn chart_title(window: &DateWindow) -> String {
    let month = window.month_name();
    format!(
        "Changes of metrics {} {} - {} {}",
        month,
        window.prior_year(),
        month,
        window.current_year()
    )
}

fn table_range(table: &ComparisonTable) -> String {
    format!("A1:D{}", table.line_count())
}

fn table_values(table: &ComparisonTable) -> Vec<Vec<Value>> {
    let mut values: Vec<Vec<Value>> = vec![table.header().iter().map(|h| json!(h)).collect()];
    for row in &table.rows {
        values.push(vec![
            json!(row.metric),
            json!(row.prior),
            json!(row.current),
            json!(row.change_pct),
        ]);
    }
    values
}

fn column_range(sheet_id: i64, lines: usize, column: i64) -> Value {
    json!({
        "sourceRange": {
            "sources": [{
                "sheetId": sheet_id,
                "startRowIndex": 0,
                "endRowIndex": lines,
                "startColumnIndex": column,
                "endColumnIndex": column + 1
            }]
        }
    })
}

fn add_chart_request(sheet_id: i64, title: &str, lines: usize) -> Value {
    json!({
        "addChart": {
            "chart": {
                "spec": {
                    "title": title,
                    "basicChart": {
                        "chartType": "COLUMN",
                        "legendPosition": "BOTTOM_LEGEND",
                        "axis": [
                            { "position": "BOTTOM_AXIS", "title": "Metrics" },
                            { "position": "LEFT_AXIS", "title": "Results" }
                        ],
                        "domains": [
                            { "domain": column_range(sheet_id, lines, DOMAIN_COLUMN) }
                        ],
                        "series": [{
                            "series": column_range(sheet_id, lines, SERIES_COLUMN),
                            "targetAxis": "LEFT_AXIS"
                        }],
                        "headerCount": 1
                    }
                },
                "position": {
                    "overlayPosition": {
                        "anchorCell": {
                            "sheetId": sheet_id,
                            "rowIndex": ANCHOR_ROW,
                            "columnIndex": ANCHOR_COLUMN
                        },
                        "offsetXPixels": 0,
                        "offsetYPixels": 0
                    }
                }
            }
        }
    })
}
