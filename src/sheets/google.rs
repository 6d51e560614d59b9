//! Google Sheets backend authorized with a service account key.
//!
//! The spreadsheet is located by title through the Drive API and the
//! worksheet by zero-based index. Writes go through the values API one
//! cell at a time with `valueInputOption=RAW`.

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SheetClient;
use crate::config::SheetConfig;
use crate::error::SheetError;
use crate::model::CellValue;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

/// Lifetime requested for the signed assertion.
const ASSERTION_TTL_SECS: u64 = 3600;

/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Fields of a service account JSON key that are needed for token exchange.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub private_key: SecretString,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, SheetError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SheetError::Credentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| SheetError::Credentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DriveFiles {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// One worksheet of a Google spreadsheet.
pub struct GoogleSheetClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    token: Mutex<Option<CachedToken>>,
    spreadsheet_id: String,
    worksheet: String,
}

impl GoogleSheetClient {
    /// Authorize, locate the spreadsheet by title and resolve the worksheet.
    pub async fn connect(config: &SheetConfig) -> Result<Self, SheetError> {
        let key = ServiceAccountKey::from_file(&config.credentials_file)?;
        let mut client = Self {
            http: reqwest::Client::new(),
            key,
            token: Mutex::new(None),
            spreadsheet_id: String::new(),
            worksheet: String::new(),
        };

        client.spreadsheet_id = client.find_spreadsheet(&config.spreadsheet).await?;
        client.worksheet = client
            .worksheet_title(config.worksheet_index)
            .await?;
        info!(
            spreadsheet = %config.spreadsheet,
            worksheet = %client.worksheet,
            "Opened worksheet"
        );
        Ok(client)
    }

    /// Current access token, exchanging a fresh assertion when needed.
    async fn access_token(&self) -> Result<String, SheetError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
        {
            return Ok(token.value.clone());
        }

        let assertion = self.sign_assertion()?;
        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetError::Auth(format!("token exchange returned {status}: {body}")));
        }

        let token: TokenResponse = resp.json().await?;
        let ttl = Duration::from_secs(token.expires_in.unwrap_or(ASSERTION_TTL_SECS));
        debug!(ttl_secs = ttl.as_secs(), "Obtained access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token.access_token)
    }

    fn sign_assertion(&self) -> Result<String, SheetError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.expose_secret().as_bytes())
            .map_err(|e| SheetError::Auth(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| SheetError::Auth(format!("failed to sign assertion: {e}")))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, SheetError> {
        let token = self.access_token().await?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }
        Ok(resp.json().await?)
    }

    async fn find_spreadsheet(&self, title: &str) -> Result<String, SheetError> {
        let query = format!(
            "name = '{}' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
            title.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let url = Url::parse_with_params(
            DRIVE_FILES_API,
            &[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ],
        )
        .map_err(|e| SheetError::InvalidRequest(e.to_string()))?;

        let found: DriveFiles = self.get_json(url).await?;
        found
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| SheetError::SpreadsheetNotFound(title.to_string()))
    }

    async fn worksheet_title(&self, index: usize) -> Result<String, SheetError> {
        let mut url = self.spreadsheet_url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(title,index)");
        let meta: SpreadsheetMeta = self.get_json(url).await?;
        let count = meta.sheets.len();
        meta.sheets
            .into_iter()
            .nth(index)
            .map(|s| s.properties.title)
            .ok_or(SheetError::WorksheetNotFound { index, count })
    }

    fn spreadsheet_url(&self, segments: &[&str]) -> Result<Url, SheetError> {
        let mut url =
            Url::parse(SHEETS_API).map_err(|e| SheetError::InvalidRequest(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::InvalidRequest("base URL cannot hold a path".into()))?
            .push(&self.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }
}

/// `'Sheet title'!A1` with embedded quotes doubled.
pub fn qualified_range(worksheet: &str, a1: Option<&str>) -> String {
    let quoted = format!("'{}'", worksheet.replace('\'', "''"));
    match a1 {
        Some(cell) => format!("{quoted}!{cell}"),
        None => quoted,
    }
}

/// Map a failed API response onto a `SheetError`.
pub fn classify_error(status: StatusCode, body: &str) -> SheetError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || message.contains("Quota exceeded") {
        SheetError::QuotaExceeded(message)
    } else {
        SheetError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Render a values-API cell as the string the sheet displays.
fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetClient for GoogleSheetClient {
    async fn read_all(&self) -> Result<Vec<Vec<String>>, SheetError> {
        let range = qualified_range(&self.worksheet, None);
        let url = self.spreadsheet_url(&["values", &range])?;
        let values: ValueRange = self.get_json(url).await?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_cell(&self, a1: &str, value: &CellValue) -> Result<(), SheetError> {
        let range = qualified_range(&self.worksheet, Some(a1));
        let mut url = self.spreadsheet_url(&["values", &range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [[value]],
        });

        let token = self.access_token().await?;
        let resp = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }
        debug!(range = %range, "Cell updated");
        Ok(())
    }
}
