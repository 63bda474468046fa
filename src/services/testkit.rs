//! Shared fakes for service tests: an in-memory user registry and a
//! recording messenger.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use crate::io::sheets::{SheetsError, UserRegistry, UserRow, STATUS_PENDING};
use crate::io::telegram::{InlineKeyboardMarkup, Messenger, TelegramError};

pub fn user_row(id: i64, name: &str, chat: Option<i64>, status: &str) -> UserRow {
    UserRow {
        telegram_user_id: id,
        telegram_username: (!name.is_empty()).then(|| name.to_string()),
        telegram_chat_id: chat,
        status: status.to_string(),
        approved_at: None,
        approved_by: None,
        invite_link_last_sent_at: None,
        role: None,
    }
}

/// Records everything sent through it; chats listed in `fail_chats` refuse
/// plain and keyboard sends.
#[derive(Default)]
pub struct MockMessenger {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub keyboards: Mutex<Vec<(i64, InlineKeyboardMarkup)>>,
    pub edits: Mutex<Vec<(i64, i64, String)>>,
    pub answers: Mutex<Vec<(String, Option<String>)>>,
    pub fail_chats: Vec<i64>,
    next_message_id: AtomicI64,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(fail_chats: Vec<i64>) -> Self {
        Self { fail_chats, ..Self::default() }
    }

    /// All texts sent to one chat, plain and keyboard sends alike, in order.
    pub fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, TelegramError> {
        if self.fail_chats.contains(&chat_id) {
            return Err(TelegramError::Api("Forbidden: bot was blocked".to_string()));
        }
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), TelegramError> {
        if self.fail_chats.contains(&chat_id) {
            return Err(TelegramError::Api("Forbidden: bot was blocked".to_string()));
        }
        self.sent.lock().push((chat_id, text.to_string()));
        self.keyboards.lock().push((chat_id, keyboard));
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        self.edits.lock().push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError> {
        self.answers.lock().push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

/// In-memory Users tab. `fail` makes every operation error, `fetches`
/// counts reads for cache assertions.
pub struct MockRegistry {
    pub users: Mutex<Vec<UserRow>>,
    pub fail: AtomicBool,
    pub fetches: AtomicUsize,
}

impl MockRegistry {
    pub fn new(users: Vec<UserRow>) -> Self {
        Self { users: Mutex::new(users), fail: AtomicBool::new(false), fetches: AtomicUsize::new(0) }
    }

    fn snapshot(&self) -> Result<Vec<UserRow>, SheetsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SheetsError::Url("registry down".to_string()));
        }
        Ok(self.users.lock().clone())
    }

    fn set_status(&self, user_id: i64, status: &str, actor: &str) -> Result<bool, SheetsError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SheetsError::Url("registry down".to_string()));
        }
        let mut users = self.users.lock();
        match users.iter_mut().find(|u| u.telegram_user_id == user_id) {
            Some(user) => {
                user.status = status.to_string();
                user.approved_by = Some(actor.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl UserRegistry for MockRegistry {
    async fn list_all(&self) -> Result<Vec<UserRow>, SheetsError> {
        self.snapshot()
    }

    async fn list_pending(&self) -> Result<Vec<UserRow>, SheetsError> {
        Ok(self.snapshot()?.into_iter().filter(UserRow::is_pending).collect())
    }

    async fn list_approved(&self) -> Result<Vec<UserRow>, SheetsError> {
        Ok(self.snapshot()?.into_iter().filter(UserRow::is_approved).collect())
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRow>, SheetsError> {
        Ok(self.snapshot()?.into_iter().find(|u| u.telegram_user_id == user_id))
    }

    async fn upsert_pending(
        &self,
        user_id: i64,
        username: Option<&str>,
        chat_id: i64,
    ) -> Result<(), SheetsError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SheetsError::Url("registry down".to_string()));
        }
        let mut users = self.users.lock();
        match users.iter_mut().find(|u| u.telegram_user_id == user_id) {
            Some(user) => {
                user.telegram_username = username.map(str::to_string);
                user.telegram_chat_id = Some(chat_id);
                if user.status.is_empty() {
                    user.status = STATUS_PENDING.to_string();
                }
            }
            None => {
                let mut row = user_row(user_id, username.unwrap_or(""), Some(chat_id), STATUS_PENDING);
                row.role = Some("user".to_string());
                users.push(row);
            }
        }
        Ok(())
    }

    async fn approve(
        &self,
        user_id: i64,
        approved_by: &str,
        _now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError> {
        self.set_status(user_id, crate::io::sheets::STATUS_APPROVED, approved_by)
    }

    async fn reject(
        &self,
        user_id: i64,
        rejected_by: &str,
        _now: chrono::NaiveDateTime,
    ) -> Result<bool, SheetsError> {
        self.set_status(user_id, crate::io::sheets::STATUS_REJECTED, rejected_by)
    }
}
