//! Telegram Bot API client
//!
//! Speaks the HTTPS/JSON Bot API directly: long-polled `getUpdates` plus the
//! handful of send/edit/answer methods the bot uses. The `Messenger` trait is
//! the seam the services layer talks through, so command and broadcast tests
//! run against a recording mock instead of the network.
//!
//! The bot token is part of every request URL; keep it out of logs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl TgUser {
    /// Username when set, otherwise the numeric id; used as the actor string
    /// in audit fields.
    pub fn handle(&self) -> String {
        match &self.username {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    pub fn callback(text: &str, data: &str) -> Self {
        Self { text: text.to_string(), callback_data: Some(data.to_string()) }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TelegramError> {
        if self.ok {
            self.result.ok_or_else(|| TelegramError::Api("missing result".to_string()))
        } else {
            Err(TelegramError::Api(
                self.description.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// Outbound messaging operations used by the services layer.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends plain text and returns the new message id, which callers may
    /// feed to [`Messenger::edit_message_text`] for progress updates.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, TelegramError>;

    async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), TelegramError>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError>;
}

pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: &str, poll_timeout_secs: u64) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base: format!("{API_BASE}/bot{token}"),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let mut request = self.http.post(self.method_url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let api: ApiResponse<T> = response.json().await?;
        api.into_result()
    }

    /// Long-polls for updates. The HTTP timeout sits above the server-side
    /// poll timeout so the connection is not cut while the server holds it.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let mut body = json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let updates: Vec<Update> = self
            .call("getUpdates", body, Some(self.poll_timeout + Duration::from_secs(10)))
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "updates_received");
        }
        Ok(updates)
    }

    /// Confirms and discards whatever backlog piled up while the bot was
    /// down, so a restart does not replay stale commands. Returns the offset
    /// to start polling from.
    pub async fn drop_pending_updates(&self) -> Result<Option<i64>, TelegramError> {
        // offset -1 confirms everything except the newest update; timeout 0
        // makes this a short poll.
        let body = json!({
            "offset": -1,
            "timeout": 0,
            "allowed_updates": ["message", "callback_query"],
        });
        let updates: Vec<Update> =
            self.call("getUpdates", body, Some(Duration::from_secs(10))).await?;
        Ok(updates.last().map(|u| u.update_id + 1))
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, TelegramError> {
        let message: Message = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }), None)
            .await?;
        Ok(message.message_id)
    }

    async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), TelegramError> {
        let _: Message = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text, "reply_markup": keyboard }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        // Telegram returns the edited message, or `true` for inline messages;
        // accept anything.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": chat_id, "message_id": message_id, "text": text }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", body, None).await?;
        Ok(())
    }
}
