//! Google Sheets REST client
//!
//! Talks to the Sheets v4 values API directly over HTTPS. Two tabs matter:
//! the form-responses data tab (read only) and the Users tab (read/write,
//! created with headers when absent). Row-to-struct mapping goes through the
//! header row by name, so column order in the sheet is free to vary.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::normalize::RawRow;
use crate::io::auth::{AuthError, TokenProvider};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const USERS_HEADERS: [&str; 8] = [
    "telegram_user_id",
    "telegram_username",
    "telegram_chat_id",
    "status",
    "approved_at",
    "approved_by",
    "invite_link_last_sent_at",
    "role",
];

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sheets api returned {status}: {body}")]
    Api { status: reqwest::StatusCode, body: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("bad sheets url: {0}")]
    Url(String),
    #[error("no spreadsheet configured")]
    NotConfigured,
}

/// One row of the Users tab.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub telegram_user_id: i64,
    pub telegram_username: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub status: String,
    pub approved_at: Option<String>,
    pub approved_by: Option<String>,
    pub invite_link_last_sent_at: Option<String>,
    pub role: Option<String>,
}

impl UserRow {
    pub fn is_approved(&self) -> bool {
        self.status.trim() == STATUS_APPROVED
    }

    pub fn is_pending(&self) -> bool {
        self.status.trim() == STATUS_PENDING
    }

    /// Display handle for logs and admin lists.
    pub fn display_name(&self) -> String {
        match &self.telegram_username {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.telegram_user_id.to_string(),
        }
    }
}

/// Thin wrapper over the values endpoints of one spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    token_provider: Arc<dyn TokenProvider>,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(
        token_provider: Arc<dyn TokenProvider>,
        spreadsheet_id: &str,
    ) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { http, token_provider, spreadsheet_id: spreadsheet_id.to_string() })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = Url::parse(API_BASE).map_err(|e| SheetsError::Url(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SheetsError::Url("cannot be a base".to_string()))?;
            path.push(&self.spreadsheet_id);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn bearer(&self) -> Result<String, SheetsError> {
        Ok(self.token_provider.bearer_token().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api { status, body });
        }
        Ok(response)
    }

    /// Reads a range (a bare tab name reads the whole tab) as rows of cell
    /// strings.
    pub async fn values_get(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        #[derive(Deserialize)]
        struct ValuesResponse {
            #[serde(default)]
            values: Vec<Vec<Value>>,
        }

        let url = self.url(&["values", range])?;
        let token = self.bearer().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = Self::check(response).await?;
        let body: ValuesResponse = response.json().await?;

        let rows: Vec<Vec<String>> =
            body.values.into_iter().map(|row| row.into_iter().map(cell_to_string).collect()).collect();
        debug!(range = %range, rows = rows.len(), "sheets_values_fetched");
        Ok(rows)
    }

    /// Appends rows after the last data row of the range's table.
    pub async fn values_append(
        &self,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SheetsError> {
        let mut url = self.url(&["values", &format!("{range}:append")])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let token = self.bearer().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Overwrites the cells of a range.
    pub async fn values_update(
        &self,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SheetsError> {
        let mut url = self.url(&["values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let token = self.bearer().await?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Titles of all tabs in the spreadsheet.
    pub async fn sheet_titles(&self) -> Result<Vec<String>, SheetsError> {
        #[derive(Deserialize)]
        struct Properties {
            title: String,
        }
        #[derive(Deserialize)]
        struct Sheet {
            properties: Properties,
        }
        #[derive(Deserialize)]
        struct SpreadsheetResponse {
            #[serde(default)]
            sheets: Vec<Sheet>,
        }

        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let token = self.bearer().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = Self::check(response).await?;
        let body: SpreadsheetResponse = response.json().await?;
        Ok(body.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn add_sheet(&self, title: &str) -> Result<(), SheetsError> {
        let url = self.url_suffix(":batchUpdate")?;
        let token = self.bearer().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({
                "requests": [
                    { "addSheet": { "properties": { "title": title } } }
                ]
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // batchUpdate hangs off the spreadsheet id with a ':' suffix, not a path
    // segment of its own.
    fn url_suffix(&self, suffix: &str) -> Result<Url, SheetsError> {
        let raw = format!("{API_BASE}/{}{suffix}", self.spreadsheet_id);
        Url::parse(&raw).map_err(|e| SheetsError::Url(e.to_string()))
    }

    /// Creates the tab with a header row when it does not exist yet.
    pub async fn ensure_tab(&self, title: &str, headers: &[&str]) -> Result<(), SheetsError> {
        let titles = self.sheet_titles().await?;
        if titles.iter().any(|t| t == title) {
            return Ok(());
        }
        self.add_sheet(title).await?;
        let header_row: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        self.values_update(&format!("{title}!A1"), vec![header_row]).await?;
        info!(tab = %title, "sheets_tab_created");
        Ok(())
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Finds the column index of a header, by exact name.
fn column_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn cell<'a>(row: &'a [String], index: Option<usize>) -> &'a str {
    index.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
}

/// Maps raw tab values (header row first) onto data rows.
pub fn data_rows(values: &[Vec<String>]) -> Vec<RawRow> {
    let Some((headers, rows)) = values.split_first() else {
        return Vec::new();
    };
    let plate = column_index(headers, "Transport priemonė");
    let event = column_index(headers, "Įvykis");
    let expiry = column_index(headers, "Galiojimo terminas");
    let doc1 = column_index(headers, "Dokumentas");
    let doc2 = column_index(headers, "Dokumentas 2");
    let timestamp =
        column_index(headers, "Timestamp").or_else(|| column_index(headers, "Laiko žyma"));

    rows.iter()
        .map(|row| RawRow {
            plate: cell(row, plate).to_string(),
            event_label: cell(row, event).to_string(),
            expiry: cell(row, expiry).to_string(),
            doc_primary: cell(row, doc1).to_string(),
            doc_secondary: cell(row, doc2).to_string(),
            timestamp: cell(row, timestamp).to_string(),
        })
        .collect()
}

/// Maps raw Users-tab values onto rows with their 1-based sheet row numbers.
pub fn user_rows(values: &[Vec<String>]) -> Vec<(usize, UserRow)> {
    let Some((headers, rows)) = values.split_first() else {
        return Vec::new();
    };
    let user_id = column_index(headers, "telegram_user_id");
    let username = column_index(headers, "telegram_username");
    let chat_id = column_index(headers, "telegram_chat_id");
    let status = column_index(headers, "status");
    let approved_at = column_index(headers, "approved_at");
    let approved_by = column_index(headers, "approved_by");
    let invite_sent = column_index(headers, "invite_link_last_sent_at");
    let role = column_index(headers, "role");

    let opt = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let user = UserRow {
                telegram_user_id: cell(row, user_id).trim().parse().unwrap_or(0),
                telegram_username: opt(cell(row, username)),
                telegram_chat_id: cell(row, chat_id).trim().parse().ok(),
                status: cell(row, status).trim().to_string(),
                approved_at: opt(cell(row, approved_at)),
                approved_by: opt(cell(row, approved_by)),
                invite_link_last_sent_at: opt(cell(row, invite_sent)),
                role: opt(cell(row, role)),
            };
            // Header occupies row 1, data starts at row 2.
            (i + 2, user)
        })
        .collect()
}

/// Read side of the data tab, behind a trait so sync tests run offline.
#[async_trait]
pub trait VehicleSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, SheetsError>;
}

pub struct SheetsVehicleSource {
    client: Arc<SheetsClient>,
    data_tab: String,
}

impl SheetsVehicleSource {
    pub fn new(client: Arc<SheetsClient>, data_tab: &str) -> Self {
        Self { client, data_tab: data_tab.to_string() }
    }
}

#[async_trait]
impl VehicleSource for SheetsVehicleSource {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, SheetsError> {
        let values = self.client.values_get(&self.data_tab).await?;
        Ok(data_rows(&values))
    }
}

/// Stand-in source when no spreadsheet is configured. The bot keeps serving
/// whatever is in the snapshot; every sync attempt fails with
/// [`SheetsError::NotConfigured`].
pub struct UnconfiguredSource;

#[async_trait]
impl VehicleSource for UnconfiguredSource {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, SheetsError> {
        Err(SheetsError::NotConfigured)
    }
}

/// Registration state for everyone who has talked to the bot. Services
/// consume the trait; [`UsersRepo`] is the Sheets-backed implementation.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn list_all(&self) -> Result<Vec<UserRow>, SheetsError>;
    async fn list_pending(&self) -> Result<Vec<UserRow>, SheetsError>;
    async fn list_approved(&self) -> Result<Vec<UserRow>, SheetsError>;
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRow>, SheetsError>;
    /// Registers a user as pending, or refreshes username/chat id when the
    /// row already exists. An existing status is never downgraded.
    async fn upsert_pending(
        &self,
        user_id: i64,
        username: Option<&str>,
        chat_id: i64,
    ) -> Result<(), SheetsError>;
    /// Returns false when the user id has no row.
    async fn approve(
        &self,
        user_id: i64,
        approved_by: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError>;
    async fn reject(
        &self,
        user_id: i64,
        rejected_by: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError>;
}

pub struct UsersRepo {
    client: Arc<SheetsClient>,
    tab: String,
}

impl UsersRepo {
    pub fn new(client: Arc<SheetsClient>, tab: &str) -> Self {
        Self { client, tab: tab.to_string() }
    }

    /// Creates the tab with headers when missing. Called once at startup.
    pub async fn ensure(&self) -> Result<(), SheetsError> {
        self.client.ensure_tab(&self.tab, &USERS_HEADERS).await
    }

    async fn fetch(&self) -> Result<Vec<(usize, UserRow)>, SheetsError> {
        let values = self.client.values_get(&self.tab).await?;
        Ok(user_rows(&values))
    }

    async fn find_row(&self, user_id: i64) -> Result<Option<(usize, UserRow)>, SheetsError> {
        Ok(self.fetch().await?.into_iter().find(|(_, u)| u.telegram_user_id == user_id))
    }

    async fn set_status(
        &self,
        user_id: i64,
        status: &str,
        actor: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError> {
        let Some((row, _)) = self.find_row(user_id).await? else {
            return Ok(false);
        };
        self.client
            .values_update(
                &format!("{}!D{row}:F{row}", self.tab),
                vec![vec![
                    status.to_string(),
                    now.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    actor.to_string(),
                ]],
            )
            .await?;
        info!(user_id, status = %status, actor = %actor, "user_status_changed");
        Ok(true)
    }
}

#[async_trait]
impl UserRegistry for UsersRepo {
    async fn list_all(&self) -> Result<Vec<UserRow>, SheetsError> {
        Ok(self.fetch().await?.into_iter().map(|(_, user)| user).collect())
    }

    async fn list_pending(&self) -> Result<Vec<UserRow>, SheetsError> {
        Ok(self.fetch().await?.into_iter().map(|(_, u)| u).filter(UserRow::is_pending).collect())
    }

    async fn list_approved(&self) -> Result<Vec<UserRow>, SheetsError> {
        Ok(self.fetch().await?.into_iter().map(|(_, u)| u).filter(UserRow::is_approved).collect())
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRow>, SheetsError> {
        Ok(self.find_row(user_id).await?.map(|(_, user)| user))
    }

    async fn upsert_pending(
        &self,
        user_id: i64,
        username: Option<&str>,
        chat_id: i64,
    ) -> Result<(), SheetsError> {
        if let Some((row, user)) = self.find_row(user_id).await? {
            self.client
                .values_update(
                    &format!("{}!B{row}:C{row}", self.tab),
                    vec![vec![username.unwrap_or("").to_string(), chat_id.to_string()]],
                )
                .await?;
            if user.status.is_empty() {
                self.client
                    .values_update(
                        &format!("{}!D{row}", self.tab),
                        vec![vec![STATUS_PENDING.to_string()]],
                    )
                    .await?;
            }
            return Ok(());
        }

        self.client
            .values_append(
                &self.tab,
                vec![vec![
                    user_id.to_string(),
                    username.unwrap_or("").to_string(),
                    chat_id.to_string(),
                    STATUS_PENDING.to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                    "user".to_string(),
                ]],
            )
            .await?;
        info!(user_id, "user_registered_pending");
        Ok(())
    }

    async fn approve(
        &self,
        user_id: i64,
        approved_by: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError> {
        self.set_status(user_id, STATUS_APPROVED, approved_by, now).await
    }

    async fn reject(
        &self,
        user_id: i64,
        rejected_by: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError> {
        self.set_status(user_id, STATUS_REJECTED, rejected_by, now).await
    }
}
