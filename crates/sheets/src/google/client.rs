//! Google Sheets v4 worksheet backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, RequestBuilder};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use trailstop_core::SheetConfig;

use super::auth::ServiceAccountAuth;
use crate::error::{Result, SheetsError};
use crate::layout::{NEW_SHEET_COLUMNS, NEW_SHEET_ROWS};
use crate::worksheet::Worksheet;

pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com";

/// Drive v3, used to find a spreadsheet by title.
pub const DRIVE_API_URL: &str = "https://www.googleapis.com";

const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

/// How the spreadsheet is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetRef {
    Id(String),
    /// Looked up through Drive on first use; the file must be shared with
    /// the service account.
    Title(String),
}

impl SpreadsheetRef {
    /// An explicit id wins over the title.
    ///
    /// # Errors
    /// Returns `Configuration` if both are blank.
    pub fn from_config(config: &SheetConfig) -> Result<Self> {
        if let Some(id) = config.spreadsheet_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(Self::Id(id.to_string()));
        }
        let title = config.spreadsheet_title.trim();
        if title.is_empty() {
            return Err(SheetsError::Configuration(
                "sheet.spreadsheet_id or sheet.spreadsheet_title is required".to_string(),
            ));
        }
        Ok(Self::Title(title.to_string()))
    }
}

/// One tab of a Google spreadsheet.
///
/// Values are written with `valueInputOption=RAW`, so cells hold exactly
/// the text the store renders and read back unchanged.
pub struct GoogleSheetsWorksheet {
    base_url: String,
    drive_url: String,
    spreadsheet: SpreadsheetRef,
    spreadsheet_id: OnceCell<String>,
    title: String,
    auth: ServiceAccountAuth,
    http: Client,
    known_to_exist: AtomicBool,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for GoogleSheetsWorksheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsWorksheet")
            .field("spreadsheet", &self.spreadsheet)
            .field("title", &self.title)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

impl GoogleSheetsWorksheet {
    /// Builds the backend from configuration.
    ///
    /// # Errors
    /// Returns `Configuration` if neither a spreadsheet id nor a title is
    /// set, or the credentials are missing or cannot be parsed.
    pub fn new(config: &SheetConfig) -> Result<Self> {
        let spreadsheet = SpreadsheetRef::from_config(config)?;
        let credentials = config
            .credentials_json
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                SheetsError::Configuration("GOOGLE_CREDS_JSON env variable missing".to_string())
            })?;

        let auth = ServiceAccountAuth::from_json(&SecretString::from(credentials))?;

        Self::with_auth(
            SHEETS_API_URL,
            spreadsheet,
            &config.worksheet,
            auth,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Builds the backend against an explicit API base URL.
    ///
    /// # Errors
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn with_auth(
        base_url: &str,
        spreadsheet: SpreadsheetRef,
        title: impl Into<String>,
        auth: ServiceAccountAuth,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SheetsError::Network(format!("failed to build HTTP client: {e}")))?;

        let worksheet = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            drive_url: DRIVE_API_URL.to_string(),
            spreadsheet,
            spreadsheet_id: OnceCell::new(),
            title: title.into(),
            auth,
            http,
            known_to_exist: AtomicBool::new(false),
            // Sheets allows 60 requests per minute per user.
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(nonzero!(60u32)))),
        };
        info!(
            spreadsheet = ?worksheet.spreadsheet,
            worksheet = %worksheet.title,
            client_email = %worksheet.auth.client_email(),
            "Google Sheets backend ready"
        );
        Ok(worksheet)
    }

    /// Points title lookups at another Drive API host.
    #[must_use]
    pub fn with_drive_url(mut self, drive_url: &str) -> Self {
        self.drive_url = drive_url.trim_end_matches('/').to_string();
        self
    }

    /// The spreadsheet id, resolving the title through Drive the first time.
    async fn spreadsheet_id(&self) -> Result<&str> {
        let id = self
            .spreadsheet_id
            .get_or_try_init(|| async {
                match &self.spreadsheet {
                    SpreadsheetRef::Id(id) => Ok(id.clone()),
                    SpreadsheetRef::Title(title) => self.find_by_title(title).await,
                }
            })
            .await?;
        Ok(id.as_str())
    }

    async fn find_by_title(&self, title: &str) -> Result<String> {
        let query = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME_TYPE}' and trashed = false",
            title.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let url = format!(
            "{}/drive/v3/files?q={}&fields=files(id)&supportsAllDrives=true&includeItemsFromAllDrives=true",
            self.drive_url,
            urlencoding::encode(&query)
        );
        debug!("GET {}", url);
        let body = self.send(self.http.get(&url)).await?;
        let list: FileList = serde_json::from_str(&body)?;

        let mut files = list.files.into_iter();
        let found = files.next().ok_or_else(|| {
            SheetsError::Configuration(format!(
                "spreadsheet {title:?} not found or not shared with the service account"
            ))
        })?;
        if files.next().is_some() {
            warn!(title, id = %found.id, "Several spreadsheets share this title, using the first");
        }
        info!(title, id = %found.id, "Resolved spreadsheet by title");
        Ok(found.id)
    }

    /// `'Title'!A1:H1`, with quotes in the title doubled.
    fn qualified(&self, range: &str) -> String {
        format!("'{}'!{}", self.title.replace('\'', "''"), range)
    }

    async fn spreadsheet_url(&self) -> Result<String> {
        let id = self.spreadsheet_id().await?;
        Ok(format!("{}/v4/spreadsheets/{}", self.base_url, id))
    }

    async fn values_url(&self, range: &str) -> Result<String> {
        Ok(format!(
            "{}/values/{}",
            self.spreadsheet_url().await?,
            urlencoding::encode(&self.qualified(range))
        ))
    }

    /// Authenticates, rate-limits and sends a request, returning the body.
    async fn send(&self, request: RequestBuilder) -> Result<String> {
        self.rate_limiter.until_ready().await;
        let token = self.auth.access_token(&self.http).await?;

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SheetsError::api(status.as_u16(), text));
        }
        Ok(text)
    }
}

#[async_trait]
impl Worksheet for GoogleSheetsWorksheet {
    async fn ensure_exists(&self) -> Result<()> {
        if self.known_to_exist.load(Ordering::Acquire) {
            return Ok(());
        }

        let spreadsheet_url = self.spreadsheet_url().await?;
        let url = format!("{spreadsheet_url}?fields=sheets.properties.title");
        debug!("GET {}", url);
        let body = self.send(self.http.get(&url)).await?;
        let meta: SpreadsheetMeta = serde_json::from_str(&body)?;

        if !meta.sheets.iter().any(|s| s.properties.title == self.title) {
            info!(worksheet = %self.title, "Worksheet not found, creating it");
            let request = serde_json::json!({
                "requests": [{
                    "addSheet": {
                        "properties": {
                            "title": self.title,
                            "gridProperties": {
                                "rowCount": NEW_SHEET_ROWS,
                                "columnCount": NEW_SHEET_COLUMNS,
                            }
                        }
                    }
                }]
            });
            let url = format!("{spreadsheet_url}:batchUpdate");
            self.send(self.http.post(&url).json(&request)).await?;
        }

        self.known_to_exist.store(true, Ordering::Release);
        Ok(())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!("{}?majorDimension=ROWS", self.values_url(range).await?);
        debug!("GET {}", url);
        let body = self.send(self.http.get(&url)).await?;
        let values: ValueRange = serde_json::from_str(&body)?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let url = format!("{}?valueInputOption=RAW", self.values_url(range).await?);
        debug!(rows = rows.len(), "PUT {}", url);
        let body = serde_json::json!({
            "range": self.qualified(range),
            "majorDimension": "ROWS",
            "values": rows,
        });
        self.send(self.http.put(&url).json(&body)).await?;
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=OVERWRITE",
            self.values_url(range).await?
        );
        debug!(rows = rows.len(), "POST {}", url);
        let body = serde_json::json!({
            "majorDimension": "ROWS",
            "values": rows,
        });
        self.send(self.http.post(&url).json(&body)).await?;
        Ok(())
    }
}

/// Formatted values arrive as strings; anything else is rendered as text.
fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => String::from(if b { "TRUE" } else { "FALSE" }),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::auth::tests::key_json;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, GoogleSheetsWorksheet) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test-token",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let auth = ServiceAccountAuth::from_json(&key_json(&format!("{}/token", server.uri()))).unwrap();
        let sheet = GoogleSheetsWorksheet::with_auth(
            &server.uri(),
            SpreadsheetRef::Id("sheet-id".to_string()),
            "Alpaca-Trader",
            auth,
            Duration::from_secs(5),
        )
        .unwrap();
        (server, sheet)
    }

    #[test]
    fn ranges_are_qualified_and_encoded() {
        let qualified = format!("'{}'!{}", "Bob's".replace('\'', "''"), "A1:H1");
        assert_eq!(qualified, "'Bob''s'!A1:H1");
        assert_eq!(
            urlencoding::encode("'Alpaca-Trader'!A1:H1"),
            "%27Alpaca-Trader%27%21A1%3AH1"
        );
    }

    #[test]
    fn non_string_cells_are_rendered_as_text() {
        assert_eq!(cell_text(serde_json::json!(true)), "TRUE");
        assert_eq!(cell_text(serde_json::json!(12.5)), "12.5");
        assert_eq!(cell_text(serde_json::Value::Null), "");
    }

    #[tokio::test]
    async fn read_range_returns_ragged_rows() {
        let (server, sheet) = setup().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-id/values/.+"))
            .and(header("authorization", "Bearer ya29.test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "'Alpaca-Trader'!A2:H500",
                "majorDimension": "ROWS",
                "values": [["AAPL", "10", "100"], [], ["MSFT", "1", "300", "310", "3.33", "3.33", "FALSE"]]
            })))
            .mount(&server)
            .await;

        let rows = sheet.read_range("A2:H500").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["AAPL", "10", "100"]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2][6], "FALSE");
    }

    #[tokio::test]
    async fn empty_range_has_no_values_key() {
        let (server, sheet) = setup().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-id/values/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "'Alpaca-Trader'!A2:H500",
                "majorDimension": "ROWS"
            })))
            .mount(&server)
            .await;

        assert!(sheet.read_range("A2:H500").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_range_puts_raw_values() {
        let (server, sheet) = setup().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-id/values/.+"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(serde_json::json!({
                "majorDimension": "ROWS",
                "values": [["Ticker", "Qty"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        sheet
            .write_range("A1:B1", &[vec!["Ticker".to_string(), "Qty".to_string()]])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn append_rows_posts_to_append_endpoint() {
        let (server, sheet) = setup().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-id/values/.+:append$"))
            .and(query_param("insertDataOption", "OVERWRITE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        sheet
            .append_rows("J1:N", &[vec![String::new(), "TSLA".to_string()]])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_worksheet_is_created_once() {
        let (server, sheet) = setup().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [{ "properties": { "title": "Sheet1" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-id:batchUpdate"))
            .and(body_partial_json(serde_json::json!({
                "requests": [{ "addSheet": { "properties": {
                    "title": "Alpaca-Trader",
                    "gridProperties": { "rowCount": 500, "columnCount": 20 }
                }}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        sheet.ensure_exists().await.unwrap();
        sheet.ensure_exists().await.unwrap();
    }

    async fn titled(server: &MockServer) -> GoogleSheetsWorksheet {
        let auth = ServiceAccountAuth::from_json(&key_json(&format!("{}/token", server.uri()))).unwrap();
        GoogleSheetsWorksheet::with_auth(
            &server.uri(),
            SpreadsheetRef::Title("Active-Investing".to_string()),
            "Alpaca-Trader",
            auth,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_drive_url(&server.uri())
    }

    #[test]
    fn spreadsheet_id_wins_over_title() {
        let mut config = SheetConfig {
            spreadsheet_id: Some(" sheet-id ".to_string()),
            ..SheetConfig::default()
        };
        assert_eq!(
            SpreadsheetRef::from_config(&config).unwrap(),
            SpreadsheetRef::Id("sheet-id".to_string())
        );

        config.spreadsheet_id = Some(String::new());
        assert_eq!(
            SpreadsheetRef::from_config(&config).unwrap(),
            SpreadsheetRef::Title("Active-Investing".to_string())
        );

        config.spreadsheet_title = "  ".to_string();
        assert!(matches!(
            SpreadsheetRef::from_config(&config),
            Err(SheetsError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn spreadsheet_title_is_resolved_once_through_drive() {
        let (server, _) = setup().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param(
                "q",
                "name = 'Active-Investing' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "id": "resolved-id" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/resolved-id/values/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [["AAPL"]]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let sheet = titled(&server).await;
        assert_eq!(sheet.read_range("A2:H500").await.unwrap(), vec![vec!["AAPL"]]);
        assert_eq!(sheet.read_range("A2:H500").await.unwrap(), vec![vec!["AAPL"]]);
    }

    #[tokio::test]
    async fn unknown_spreadsheet_title_is_a_configuration_error() {
        let (server, _) = setup().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
            .mount(&server)
            .await;

        let err = titled(&server).await.ensure_exists().await.unwrap_err();
        assert!(matches!(err, SheetsError::Configuration(ref msg) if msg.contains("Active-Investing")));
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let (server, sheet) = setup().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-id/values/.+"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = sheet.read_range("A2:H500").await.unwrap_err();
        assert!(matches!(err, SheetsError::Api { status_code: 403, .. }));
    }
}
