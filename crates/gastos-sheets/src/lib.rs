//! Google Sheets adapter.
//!
//! Implements the `gastos-core` ExpenseSheet port over the Sheets v4 and Drive v3
//! REST APIs, authenticated as a service account.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;

use gastos_core::{
    config::{Config, GOOGLE_SCOPES},
    errors::Error,
    ports::ExpenseSheet,
    Result,
};

pub mod auth;

use auth::{AccessToken, ServiceAccountKey};

const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Clone, Debug)]
pub struct SheetsSettings {
    pub creds_file: PathBuf,
    pub spreadsheet_name: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl SheetsSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            creds_file: cfg.google_creds_file.clone(),
            spreadsheet_name: cfg.spreadsheet_name.clone(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            timeout: cfg.http_timeout,
        }
    }
}

/// Authenticated reference to the first sheet of the opened spreadsheet.
#[derive(Clone, Debug)]
pub struct SheetHandle {
    pub spreadsheet_id: String,
    pub sheet_title: String,
    token: AccessToken,
}

struct Session {
    key: ServiceAccountKey,
    handle: SheetHandle,
}

/// Spreadsheet gateway holding one handle for the process lifetime.
///
/// The access token is refreshed when it nears expiry. An auth failure or a 404
/// drops the whole session so the next call re-reads credentials and re-resolves
/// the spreadsheet.
pub struct GoogleSheetsGateway {
    http: reqwest::Client,
    settings: SheetsSettings,
    session: Mutex<Option<Session>>,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
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
    #[serde(default)]
    index: i64,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsGateway {
    pub fn new(settings: SheetsSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build error: {e}")))?;
        Ok(Self {
            http,
            settings,
            session: Mutex::new(None),
        })
    }

    /// Open (or reuse) the authenticated handle.
    pub async fn connect(&self) -> Result<SheetHandle> {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.as_mut() {
            if !session.handle.token.is_fresh(Utc::now()) {
                session.handle.token =
                    auth::fetch_token(&self.http, &session.key, &self.settings.scopes).await?;
            }
            return Ok(session.handle.clone());
        }

        let session = self.open().await?;
        let handle = session.handle.clone();
        *guard = Some(session);
        Ok(handle)
    }

    /// Drop the cached handle.
    pub async fn close(&self) {
        self.session.lock().await.take();
    }

    async fn open(&self) -> Result<Session> {
        let key = ServiceAccountKey::from_file(&self.settings.creds_file)?;
        let token = auth::fetch_token(&self.http, &key, &self.settings.scopes).await?;

        let spreadsheet_id = self.find_spreadsheet(&token).await?;
        let sheet_title = self.first_sheet_title(&token, &spreadsheet_id).await?;
        info!(
            spreadsheet = %self.settings.spreadsheet_name,
            sheet = %sheet_title,
            "opened spreadsheet"
        );

        Ok(Session {
            key,
            handle: SheetHandle {
                spreadsheet_id,
                sheet_title,
                token,
            },
        })
    }

    async fn find_spreadsheet(&self, token: &AccessToken) -> Result<String> {
        let name = &self.settings.spreadsheet_name;
        let resp = self
            .http
            .get(DRIVE_FILES_API)
            .bearer_auth(&token.value)
            .query(&[
                ("q", drive_name_query(name).as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let list: DriveFileList = json_body(resp).await?;
        list.files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| Error::NotFound(format!("spreadsheet '{name}'")))
    }

    async fn first_sheet_title(&self, token: &AccessToken, spreadsheet_id: &str) -> Result<String> {
        let url = sheets_url(&[spreadsheet_id])?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token.value)
            .query(&[("fields", "sheets.properties(sheetId,title,index)")])
            .send()
            .await
            .map_err(request_error)?;

        let meta: SpreadsheetMeta = json_body(resp).await?;
        meta.sheets
            .into_iter()
            .map(|s| s.properties)
            .min_by_key(|p| p.index)
            .map(|p| p.title)
            .ok_or_else(|| Error::NotFound(format!("spreadsheet {spreadsheet_id} has no sheets")))
    }

    async fn append(&self, handle: &SheetHandle, amount: f64, description: &str) -> Result<()> {
        let range = format!("{}!A1", quote_sheet_title(&handle.sheet_title));
        let url = sheets_url(&[
            handle.spreadsheet_id.as_str(),
            "values",
            &format!("{range}:append"),
        ])?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(&handle.token.value)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": [[amount, description]] }))
            .send()
            .await
            .map_err(request_error)?;

        let _: Value = json_body(resp).await?;
        Ok(())
    }

    async fn values(&self, handle: &SheetHandle) -> Result<Vec<Vec<String>>> {
        let range = quote_sheet_title(&handle.sheet_title);
        let url = sheets_url(&[handle.spreadsheet_id.as_str(), "values", &range])?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(&handle.token.value)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let body: ValueRange = json_body(resp).await?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    /// Forget the session after an auth failure or a stale spreadsheet id so the
    /// next call starts over.
    async fn settle<T>(&self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            if e.invalidates_handle() {
                self.close().await;
            }
        }
        res
    }
}

#[async_trait]
impl ExpenseSheet for GoogleSheetsGateway {
    async fn append_row(&self, amount: f64, description: &str) -> Result<()> {
        let handle = self.connect().await;
        let res = match handle {
            Ok(h) => self.append(&h, amount, description).await,
            Err(e) => Err(e),
        };
        self.settle(res).await
    }

    async fn read_all_rows(&self) -> Result<Vec<Vec<String>>> {
        let handle = self.connect().await;
        let res = match handle {
            Ok(h) => self.values(&h).await,
            Err(e) => Err(e),
        };
        self.settle(res).await
    }
}

fn request_error(e: reqwest::Error) -> Error {
    Error::External(format!("google request error: {e}"))
}

async fn json_body<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    resp.json::<T>()
        .await
        .map_err(|e| Error::External(format!("google json error: {e}")))
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = format!("{status} {}", body.chars().take(200).collect::<String>());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(detail),
        StatusCode::NOT_FOUND => Error::NotFound(detail),
        _ => Error::External(format!("google api error: {detail}")),
    }
}

fn sheets_url(segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(SHEETS_API)
        .map_err(|e| Error::External(format!("invalid sheets url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::External("sheets url cannot be a base".to_string()))?
        .extend(segments);
    Ok(url)
}

/// A1-notation sheet name: single-quoted, inner quotes doubled.
fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn drive_name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false")
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
