use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::LimsError;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Minimal blocking client for the Google Sheets values API. Obtaining the
/// OAuth bearer token is left to the caller.
#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(access_token: String) -> Result<Self, LimsError> {
        Self::with_base_url(access_token, SHEETS_BASE_URL.to_string())
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Result<Self, LimsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lims-ledger/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LimsError::RegistryHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| LimsError::RegistryHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    /// Reads every row of `range` (a tab name), stringifying cell values.
    pub fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, LimsError> {
        let url = self
            .values_url(spreadsheet_id, range)
            .map_err(LimsError::RegistryHttp)?;
        let response = self.send_with_retries(|| {
            self.client
                .get(url.clone())
                .bearer_auth(&self.access_token)
                .query(&[("majorDimension", "ROWS")])
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "tracking sheet request failed".to_string());
            return Err(LimsError::RegistryStatus { status, message });
        }
        let body: ValueRange = response
            .json()
            .map_err(|err| LimsError::RegistryHttp(err.to_string()))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    /// Appends `rows` after the last row of `range` in a single call. Not
    /// retried: a repeated append would duplicate rows.
    pub fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), LimsError> {
        let url = self
            .values_url(spreadsheet_id, &format!("{range}:append"))
            .map_err(LimsError::LedgerHttp)?;
        let body = json!({
            "majorDimension": "ROWS",
            "values": rows,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .map_err(|err| LimsError::LedgerHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "LIMS append failed".to_string());
            return Err(LimsError::LedgerStatus { status, message });
        }
        Ok(())
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url).map_err(|err| err.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("invalid base URL {}", self.base_url))?
            .pop_if_empty()
            .extend([spreadsheet_id, "values", range]);
        Ok(url)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, LimsError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying tracking sheet request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(LimsError::RegistryHttp(err.to_string()));
                }
            }
        }
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
