//! Google Sheets v4 destination built on the blocking `reqwest` client.
//!
//! Request URLs and bodies are assembled by free functions so they can be
//! checked without network access; [`SheetsClient`] only sends them.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::addressbook::sheets::error::{ExportError, Result};
use crate::addressbook::sheets::model::NormalizedRow;
use crate::addressbook::sheets::upload::{SheetShape, SheetWriter};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A1 reference to an entire tab, quoted so names with spaces survive.
pub fn sheet_range(sheet_name: &str) -> String {
    format!("'{}'", sheet_name.replace('\'', "''"))
}

/// A1 anchor for the zero-based data row `start_row`; row 1 holds the header.
pub fn data_anchor(sheet_name: &str, start_row: usize) -> String {
    format!("{}!A{}", sheet_range(sheet_name), start_row + 2)
}

pub fn header_anchor(sheet_name: &str) -> String {
    format!("{}!A1", sheet_range(sheet_name))
}

/// `.../spreadsheets/{id}/values/{range}[:action]`
pub fn values_url(spreadsheet_id: &str, range: &str, action: Option<&str>) -> Result<Url> {
    let last = match action {
        Some(action) => format!("{range}:{action}"),
        None => range.to_string(),
    };
    endpoint_url(SHEETS_API_BASE, &[spreadsheet_id, "values", last.as_str()])
}

/// `.../spreadsheets/{id}[:action]`
pub fn spreadsheet_url(spreadsheet_id: &str, action: Option<&str>) -> Result<Url> {
    let last = match action {
        Some(action) => format!("{spreadsheet_id}:{action}"),
        None => spreadsheet_id.to_string(),
    };
    endpoint_url(SHEETS_API_BASE, &[last.as_str()])
}

/// Appends percent-encoded path segments to `base`.
fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url> {
    let invalid = |reason: String| ExportError::Endpoint {
        base: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|error| invalid(error.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot carry path segments".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Body for `values.update`: rows in row-major order starting at `range`.
pub fn value_range_body(range: &str, rows: &[Vec<String>]) -> Value {
    json!({
        "range": range,
        "majorDimension": "ROWS",
        "values": rows,
    })
}

/// Requests for the formatting pass: frozen header, bold header, a basic
/// filter over the data and auto-sized columns.
pub fn formatting_requests(sheet_id: i64, shape: &SheetShape) -> Value {
    json!({
        "requests": [
            {
                "updateSheetProperties": {
                    "properties": {
                        "sheetId": sheet_id,
                        "gridProperties": { "frozenRowCount": 1 }
                    },
                    "fields": "gridProperties.frozenRowCount"
                }
            },
            {
                "repeatCell": {
                    "range": { "sheetId": sheet_id, "startRowIndex": 0, "endRowIndex": 1 },
                    "cell": { "userEnteredFormat": { "textFormat": { "bold": true } } },
                    "fields": "userEnteredFormat.textFormat.bold"
                }
            },
            {
                "setBasicFilter": {
                    "filter": {
                        "range": {
                            "sheetId": sheet_id,
                            "startRowIndex": 0,
                            "endRowIndex": shape.total_rows(),
                            "startColumnIndex": 0,
                            "endColumnIndex": shape.columns
                        }
                    }
                }
            },
            {
                "autoResizeDimensions": {
                    "dimensions": {
                        "sheetId": sheet_id,
                        "dimension": "COLUMNS",
                        "startIndex": 0,
                        "endIndex": shape.columns
                    }
                }
            }
        ]
    })
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
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
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Pulls the human-readable message out of a Google error payload, falling
/// back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// An authenticated handle on one tab of one spreadsheet.
pub struct SheetsClient {
    client: Client,
    access_token: String,
    spreadsheet_id: String,
    sheet_name: String,
    sheet_id: Option<i64>,
}

impl SheetsClient {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            access_token: access_token.into(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            sheet_id: None,
        })
    }

    /// Browser link to the spreadsheet.
    pub fn web_url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.spreadsheet_id)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(&self.access_token).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ExportError::SheetsApi {
            status: status.as_u16(),
            message: api_error_message(&body),
        })
    }

    fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut url = values_url(&self.spreadsheet_id, range, None)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = value_range_body(range, &rows);
        self.send(self.client.put(url).json(&body))?;
        Ok(())
    }

    /// Looks up the numeric id of the configured tab, needed by the
    /// formatting requests. Cached after the first call.
    #[instrument(level = "debug", skip_all, fields(sheet = %self.sheet_name))]
    pub fn resolve_sheet_id(&mut self) -> Result<i64> {
        if let Some(sheet_id) = self.sheet_id {
            return Ok(sheet_id);
        }
        let mut url = spreadsheet_url(&self.spreadsheet_id, None)?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title)");
        let metadata: SpreadsheetMetadata = self.send(self.client.get(url))?.json()?;
        let sheet_id = metadata
            .sheets
            .into_iter()
            .find(|entry| entry.properties.title == self.sheet_name)
            .map(|entry| entry.properties.sheet_id)
            .ok_or_else(|| ExportError::SheetNotFound(self.sheet_name.clone()))?;
        self.sheet_id = Some(sheet_id);
        Ok(sheet_id)
    }
}

impl SheetWriter for SheetsClient {
    fn prepare(&mut self, headers: &[String]) -> Result<()> {
        self.resolve_sheet_id()?;
        let url = values_url(
            &self.spreadsheet_id,
            &sheet_range(&self.sheet_name),
            Some("clear"),
        )?;
        self.send(self.client.post(url).json(&json!({})))?;
        debug!(sheet = %self.sheet_name, "sheet cleared");
        self.update_values(&header_anchor(&self.sheet_name), vec![headers.to_vec()])
    }

    fn write_rows(&mut self, start_row: usize, rows: &[NormalizedRow]) -> Result<()> {
        let values = rows.iter().map(|row| row.cells().to_vec()).collect();
        self.update_values(&data_anchor(&self.sheet_name, start_row), values)
    }

    fn apply_formatting(&mut self, shape: &SheetShape) -> Result<()> {
        let sheet_id = self.resolve_sheet_id()?;
        let url = spreadsheet_url(&self.spreadsheet_id, Some("batchUpdate"))?;
        self.send(self.client.post(url).json(&formatting_requests(sheet_id, shape)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_skip_the_header_row() {
        assert_eq!(header_anchor("Contacts"), "'Contacts'!A1");
        assert_eq!(data_anchor("Contacts", 0), "'Contacts'!A2");
        assert_eq!(data_anchor("Contacts", 1000), "'Contacts'!A1002");
        assert_eq!(sheet_range("Bob's list"), "'Bob''s list'");
    }

    #[test]
    fn values_url_escapes_the_range_segment() {
        let url = values_url("abc123", "'My Contacts'!A2", None).expect("url");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/'My%20Contacts'!A2"
        );
        let clear = values_url("abc123", "'Contacts'", Some("clear")).expect("url");
        assert!(clear.as_str().ends_with("/abc123/values/'Contacts':clear"));
    }

    #[test]
    fn malformed_endpoint_is_reported_as_such() {
        let error = endpoint_url("mailto:sheets@example.com", &["abc123"]).expect_err("no path");
        assert!(matches!(error, ExportError::Endpoint { .. }));
        assert!(error.to_string().starts_with("invalid API endpoint 'mailto:sheets@example.com'"));

        let error = endpoint_url("not a url", &["abc123"]).expect_err("unparsable");
        assert!(matches!(error, ExportError::Endpoint { .. }));
    }

    #[test]
    fn batch_update_url_appends_action() {
        let url = spreadsheet_url("abc123", Some("batchUpdate")).expect("url");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123:batchUpdate"
        );
    }

    #[test]
    fn formatting_covers_header_and_data_extent() {
        let shape = SheetShape {
            columns: 20,
            data_rows: 2500,
        };
        let body = formatting_requests(42, &shape);
        let requests = body["requests"].as_array().expect("requests array");
        assert_eq!(requests.len(), 4);
        assert_eq!(
            requests[0]["updateSheetProperties"]["properties"]["gridProperties"]["frozenRowCount"],
            1
        );
        assert_eq!(
            requests[1]["repeatCell"]["cell"]["userEnteredFormat"]["textFormat"]["bold"],
            true
        );
        let filter_range = &requests[2]["setBasicFilter"]["filter"]["range"];
        assert_eq!(filter_range["sheetId"], 42);
        assert_eq!(filter_range["endRowIndex"], 2501);
        assert_eq!(filter_range["endColumnIndex"], 20);
        assert_eq!(requests[3]["autoResizeDimensions"]["dimensions"]["endIndex"], 20);
    }

    #[test]
    fn value_body_is_row_major() {
        let rows = vec![vec!["Ada".to_string(), String::new()]];
        let body = value_range_body("'Contacts'!A2", &rows);
        assert_eq!(body["majorDimension"], "ROWS");
        assert_eq!(body["values"][0][0], "Ada");
        assert_eq!(body["values"][0][1], "");
    }

    #[test]
    fn error_message_prefers_api_payload() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded"}}"#;
        assert_eq!(api_error_message(body), "Quota exceeded");
        assert_eq!(api_error_message("  bad gateway \n"), "bad gateway");
    }
}
