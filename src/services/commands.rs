//! Command parsing and dispatch.
//!
//! Three access tiers: /start, /pagalba, /status and /whoami answer anyone;
//! the read commands need an approved registration; everything that mutates
//! state or broadcasts is admin-only. Admins are the config allow-lists,
//! checked before the registry so they can always reach the bot.
//!
//! Replies a vehicle owner sees are Lithuanian; sync and data-state reports
//! for admins stay close to the underlying operations.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::summary::{render_excluded_list, render_vehicle_detail};
use crate::domain::types::{EventKind, Plate};
use crate::io::sheets::{UserRegistry, STATUS_REJECTED};
use crate::io::store::{store_now, SnapshotStore, StoreError};
use crate::io::telegram::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Messenger, TelegramError,
    TgUser,
};
use crate::services::directory::UserDirectory;
use crate::services::reminder::{ReminderOutcome, ReminderService};
use crate::services::sync::{SyncEngine, SyncError};

const NOT_ADMIN: &str = "Neturite teisės naudoti šios komandos.";
const NOT_APPROVED: &str = "Jūsų prieiga dar nepatvirtinta.";
const SHEETS_MISSING: &str = "Trūksta Sheets konfigūracijos.";

pub const HELP_TEXT: &str = "\
Galimos komandos:
/start - Registracija
/pagalba - Šis pranešimas
/status - Jūsų prieigos būsena
/info - Šiandienos priminimas
/sarasas - Visų numerių sąrašas
/id <numeris> - Konkretaus numerio duomenys

Administratoriaus komandos:
/dryrun - Peržiūrėti šiandienos pranešimą
/pending - Patvirtinti laukiančius vartotojus
/approve <user_id> - Patvirtinti vartotoją
/reject <user_id> - Atmesti vartotoją
/users - Vartotojų sąrašas
/update - Atnaujinti duomenis iš Google Sheets
/remove <numeris> - Pašalinti numerį iš pranešimų
/atstatyti <numeris> - Grąžinti numerį į pranešimus
/sendtoday - Išsiųsti šiandienos pranešimą
/whoami - Sužinoti savo ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    WhoAmI,
    Status,
    Info,
    List,
    Detail(Option<String>),
    DryRun,
    Update,
    Remove(Option<String>),
    Restore(Option<String>),
    Pending,
    Users,
    Approve(Option<i64>),
    Reject(Option<i64>),
    SendToday,
    Unknown,
}

/// Parses `/command[@botname] [arg]`. Returns None for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.trim().split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    let name = match head.split_once('@') {
        Some((name, _)) => name,
        None => head,
    }
    .to_lowercase();
    let arg = parts.next().map(str::to_string);

    Some(match name.as_str() {
        "/start" => Command::Start,
        "/pagalba" => Command::Help,
        "/whoami" => Command::WhoAmI,
        "/status" => Command::Status,
        "/info" => Command::Info,
        "/sarasas" => Command::List,
        "/id" => Command::Detail(arg),
        "/dryrun" => Command::DryRun,
        "/update" => Command::Update,
        "/remove" => Command::Remove(arg),
        "/atstatyti" => Command::Restore(arg),
        "/pending" => Command::Pending,
        "/users" => Command::Users,
        "/approve" => Command::Approve(arg.and_then(|a| a.parse().ok())),
        "/reject" => Command::Reject(arg.and_then(|a| a.parse().ok())),
        "/sendtoday" => Command::SendToday,
        _ => Command::Unknown,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Plate(String),
    Approve(i64),
    Reject(i64),
}

pub fn parse_callback(data: &str) -> Option<CallbackAction> {
    let (prefix, value) = data.split_once(':')?;
    match prefix {
        "plate" => Some(CallbackAction::Plate(value.to_string())),
        "approve" => value.parse().ok().map(CallbackAction::Approve),
        "reject" => value.parse().ok().map(CallbackAction::Reject),
        _ => None,
    }
}

pub struct CommandHandler {
    store: Arc<RwLock<SnapshotStore>>,
    registry: Option<Arc<dyn UserRegistry>>,
    directory: Arc<UserDirectory>,
    sync: Arc<SyncEngine>,
    reminder: Arc<ReminderService>,
    messenger: Arc<dyn Messenger>,
}

impl CommandHandler {
    pub fn new(
        store: Arc<RwLock<SnapshotStore>>,
        registry: Option<Arc<dyn UserRegistry>>,
        directory: Arc<UserDirectory>,
        sync: Arc<SyncEngine>,
        reminder: Arc<ReminderService>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self { store, registry, directory, sync, reminder, messenger }
    }

    pub async fn handle_message(&self, message: &Message) -> Result<(), TelegramError> {
        let Some(text) = message.text.as_deref() else { return Ok(()) };
        let Some(command) = parse_command(text) else { return Ok(()) };
        let Some(from) = message.from.as_ref() else { return Ok(()) };
        let chat_id = message.chat.id;
        debug!(user_id = from.id, command = ?command, "command_received");

        match command {
            Command::Start => self.cmd_start(from, chat_id).await,
            Command::Help => self.send(chat_id, HELP_TEXT).await,
            Command::WhoAmI => {
                let reply = format!(
                    "user_id={}, username={}",
                    from.id,
                    from.username.as_deref().unwrap_or("-")
                );
                self.send(chat_id, &reply).await
            }
            Command::Status => self.cmd_status(from, chat_id).await,
            Command::Info => {
                if self.ensure_approved(from, chat_id).await? {
                    self.cmd_info(chat_id).await?;
                }
                Ok(())
            }
            Command::List => {
                if self.ensure_approved(from, chat_id).await? {
                    self.cmd_list(chat_id).await?;
                }
                Ok(())
            }
            Command::Detail(arg) => {
                if self.ensure_approved(from, chat_id).await? {
                    self.cmd_detail(chat_id, arg).await?;
                }
                Ok(())
            }
            Command::DryRun => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_dryrun(chat_id).await?;
                }
                Ok(())
            }
            Command::Update => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_update(chat_id).await?;
                }
                Ok(())
            }
            Command::Remove(arg) => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_remove(from, chat_id, arg).await?;
                }
                Ok(())
            }
            Command::Restore(arg) => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_restore(chat_id, arg).await?;
                }
                Ok(())
            }
            Command::Pending => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_pending(chat_id).await?;
                }
                Ok(())
            }
            Command::Users => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_users(chat_id).await?;
                }
                Ok(())
            }
            Command::Approve(arg) => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_set_status(from, chat_id, arg, true).await?;
                }
                Ok(())
            }
            Command::Reject(arg) => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_set_status(from, chat_id, arg, false).await?;
                }
                Ok(())
            }
            Command::SendToday => {
                if self.ensure_admin(from, chat_id).await? {
                    self.cmd_sendtoday(chat_id).await?;
                }
                Ok(())
            }
            Command::Unknown => {
                debug!(text, "command_unrecognized");
                Ok(())
            }
        }
    }

    pub async fn handle_callback(&self, callback: &CallbackQuery) -> Result<(), TelegramError> {
        // Ack immediately so the client stops its spinner.
        if let Err(err) =
            self.messenger.answer_callback_query(&callback.id, Some("Apdorojama…")).await
        {
            warn!(error = %err, "callback_answer_failed");
        }

        let Some(data) = callback.data.as_deref() else { return Ok(()) };
        let Some(action) = parse_callback(data) else {
            debug!(data, "callback_unrecognized");
            return Ok(());
        };
        let Some(message) = callback.message.as_ref() else { return Ok(()) };
        let chat_id = message.chat.id;
        let message_id = message.message_id;
        let from = &callback.from;

        match action {
            CallbackAction::Plate(raw) => {
                // The buttons only exist in approved chats, so an
                // unauthorized tap is just dropped.
                if !self.directory.is_approved(from.id, from.username.as_deref()).await {
                    return Ok(());
                }
                let text = self.detail_text(&Plate::new(&raw)).await;
                self.messenger.edit_message_text(chat_id, message_id, &text).await
            }
            CallbackAction::Approve(user_id) => {
                if !self.directory.is_admin(from.id, from.username.as_deref()) {
                    return Ok(());
                }
                let reply = self.set_user_status(user_id, &from.handle(), true).await;
                self.messenger.edit_message_text(chat_id, message_id, &reply).await
            }
            CallbackAction::Reject(user_id) => {
                if !self.directory.is_admin(from.id, from.username.as_deref()) {
                    return Ok(());
                }
                let reply = self.set_user_status(user_id, &from.handle(), false).await;
                self.messenger.edit_message_text(chat_id, message_id, &reply).await
            }
        }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.messenger.send_message(chat_id, text).await?;
        Ok(())
    }

    async fn ensure_admin(&self, from: &TgUser, chat_id: i64) -> Result<bool, TelegramError> {
        if self.directory.is_admin(from.id, from.username.as_deref()) {
            return Ok(true);
        }
        self.send(chat_id, NOT_ADMIN).await?;
        Ok(false)
    }

    async fn ensure_approved(&self, from: &TgUser, chat_id: i64) -> Result<bool, TelegramError> {
        if self.directory.is_approved(from.id, from.username.as_deref()).await {
            return Ok(true);
        }
        self.send(chat_id, NOT_APPROVED).await?;
        Ok(false)
    }

    async fn cmd_start(&self, from: &TgUser, chat_id: i64) -> Result<(), TelegramError> {
        let Some(registry) = &self.registry else {
            return self.send(chat_id, "Sveiki! Botas veikia. (/start)").await;
        };
        match registry.upsert_pending(from.id, from.username.as_deref(), chat_id).await {
            Ok(()) => {
                self.send(
                    chat_id,
                    "Sveiki! Jūsų registracija pateikta. Laukite administratoriaus patvirtinimo.",
                )
                .await
            }
            Err(err) => {
                warn!(user_id = from.id, error = %err, "start_registration_failed");
                self.send(chat_id, "Sveiki! Botas veikia. (/start)").await
            }
        }
    }

    async fn cmd_status(&self, from: &TgUser, chat_id: i64) -> Result<(), TelegramError> {
        let mut lines = Vec::new();
        match &self.registry {
            None => lines.push("Jūsų prieiga patvirtinta.".to_string()),
            Some(registry) => match registry.find_user(from.id).await {
                Ok(Some(user)) if user.is_approved() => {
                    lines.push("Jūsų prieiga patvirtinta.".to_string());
                }
                Ok(Some(user)) if user.status.trim() == STATUS_REJECTED => {
                    lines.push("Jūsų registracija atmesta.".to_string());
                }
                Ok(Some(_)) => lines.push("Jūsų registracija laukia patvirtinimo.".to_string()),
                Ok(None) => lines.push("Nesate užsiregistravęs. Naudokite /start.".to_string()),
                Err(err) => {
                    warn!(error = %err, "status_lookup_failed");
                    lines.push("Nepavyko patikrinti būsenos.".to_string());
                }
            },
        }
        if self.directory.is_admin(from.id, from.username.as_deref()) {
            lines.push(self.data_status().await);
        }
        self.send(chat_id, &lines.join("\n")).await
    }

    /// Freshness line for admins, mirrored by /status and the logs.
    async fn data_status(&self) -> String {
        let store = self.store.read().await;
        if !store.has_data() {
            return "❌ No data available - run /update to sync from Google Sheets".to_string();
        }
        let stats = store.stats();
        let age = match store.last_updated() {
            Some(ts) => {
                let minutes = (store_now() - ts).num_minutes().max(0);
                format!("{}h {}m ago", minutes / 60, minutes % 60)
            }
            None => "never".to_string(),
        };
        format!("📊 Data: {} active, {} excluded (updated {})", stats.active, stats.excluded, age)
    }

    async fn cmd_info(&self, chat_id: i64) -> Result<(), TelegramError> {
        match self.reminder.summary_text().await {
            Some(text) => self.send(chat_id, &text).await,
            None => self.send(chat_id, "❌ Duomenų nėra. Susisiekite su administratoriumi.").await,
        }
    }

    async fn cmd_list(&self, chat_id: i64) -> Result<(), TelegramError> {
        let plates = self.store.read().await.active_plates();
        if plates.is_empty() {
            return self.send(chat_id, "Sąrašas tuščias.").await;
        }
        let mut text = String::from("Numerių sąrašas:");
        let mut rows = Vec::with_capacity(plates.len());
        for plate in &plates {
            text.push('\n');
            text.push_str(plate.as_str());
            rows.push(vec![InlineKeyboardButton::callback(
                plate.as_str(),
                &format!("plate:{plate}"),
            )]);
        }
        self.messenger
            .send_message_with_keyboard(chat_id, &text, InlineKeyboardMarkup { inline_keyboard: rows })
            .await
    }

    async fn detail_text(&self, plate: &Plate) -> String {
        let today = self.reminder.today();
        let store = self.store.read().await;
        match store.vehicle(plate) {
            Some(snapshot) if !snapshot.excluded => {
                let events: Vec<(EventKind, Option<NaiveDate>)> =
                    snapshot.events.iter().map(|e| (e.kind, e.expires)).collect();
                render_vehicle_detail(plate, &events, today)
            }
            _ => "Numeris nerastas.".to_string(),
        }
    }

    async fn cmd_detail(&self, chat_id: i64, arg: Option<String>) -> Result<(), TelegramError> {
        let Some(raw) = arg else {
            return self.send(chat_id, "Naudojimas: /id <numeris>").await;
        };
        let text = self.detail_text(&Plate::new(&raw)).await;
        self.send(chat_id, &text).await
    }

    async fn cmd_dryrun(&self, chat_id: i64) -> Result<(), TelegramError> {
        match self.reminder.summary_text().await {
            Some(text) => self.send(chat_id, &text).await,
            None => self.send(chat_id, "❌ Duomenų nėra. Naudokite /update.").await,
        }
    }

    async fn cmd_update(&self, chat_id: i64) -> Result<(), TelegramError> {
        let progress_id = self.messenger.send_message(chat_id, "🔄 Atnaujinami duomenys...").await?;
        let result = match self.sync.run_sync().await {
            Ok(outcome) => format!(
                "✅ Sync completed: {} active vehicles, {} excluded",
                outcome.stats.active, outcome.stats.excluded
            ),
            Err(SyncError::AlreadyRunning) => "⚠️ Sync already in progress".to_string(),
            Err(SyncError::Store(err)) => {
                warn!(error = %err, "sync_store_failed");
                "❌ Failed to save data to JSON storage".to_string()
            }
            Err(err) => format!("❌ Sync failed: {err}"),
        };
        self.messenger.edit_message_text(chat_id, progress_id, &result).await
    }

    async fn cmd_remove(
        &self,
        from: &TgUser,
        chat_id: i64,
        arg: Option<String>,
    ) -> Result<(), TelegramError> {
        let Some(raw) = arg else {
            return self.send(chat_id, "Naudojimas: /remove <numeris>").await;
        };
        let plate = Plate::new(&raw);
        let (reply, excluded) = {
            let mut store = self.store.write().await;
            match store.exclude(&plate, &from.handle(), store_now()) {
                Ok(()) => match store.save() {
                    Ok(()) => (
                        format!("✅ Vehicle {plate} excluded from future reports"),
                        Some(store.excluded_vehicles()),
                    ),
                    Err(err) => {
                        warn!(error = %err, "exclude_save_failed");
                        (format!("❌ Failed to exclude vehicle {plate}"), None)
                    }
                },
                Err(StoreError::NotFound(_)) => {
                    (format!("❌ Vehicle {plate} not found in data"), None)
                }
                Err(StoreError::AlreadyExcluded(_)) => {
                    (format!("⚠️ Vehicle {plate} is already excluded"), None)
                }
                Err(err) => {
                    warn!(error = %err, "exclude_failed");
                    (format!("❌ Failed to exclude vehicle {plate}"), None)
                }
            }
        };
        self.send(chat_id, &reply).await?;
        if let Some(excluded) = excluded {
            self.send(chat_id, &render_excluded_list(&excluded)).await?;
        }
        Ok(())
    }

    async fn cmd_restore(&self, chat_id: i64, arg: Option<String>) -> Result<(), TelegramError> {
        let Some(raw) = arg else {
            return self.send(chat_id, "Naudojimas: /atstatyti <numeris>").await;
        };
        let plate = Plate::new(&raw);
        let (reply, excluded) = {
            let mut store = self.store.write().await;
            match store.restore(&plate) {
                Ok(()) => match store.save() {
                    Ok(()) => (
                        format!("✅ Vehicle {plate} restored to reports"),
                        Some(store.excluded_vehicles()),
                    ),
                    Err(err) => {
                        warn!(error = %err, "restore_save_failed");
                        (format!("❌ Failed to restore vehicle {plate}"), None)
                    }
                },
                Err(StoreError::NotFound(_)) => {
                    (format!("❌ Vehicle {plate} not found in data"), None)
                }
                Err(StoreError::NotExcluded(_)) => {
                    (format!("⚠️ Vehicle {plate} is not excluded"), None)
                }
                Err(err) => {
                    warn!(error = %err, "restore_failed");
                    (format!("❌ Failed to restore vehicle {plate}"), None)
                }
            }
        };
        self.send(chat_id, &reply).await?;
        if let Some(excluded) = excluded {
            self.send(chat_id, &render_excluded_list(&excluded)).await?;
        }
        Ok(())
    }

    async fn cmd_pending(&self, chat_id: i64) -> Result<(), TelegramError> {
        let Some(registry) = &self.registry else {
            return self.send(chat_id, SHEETS_MISSING).await;
        };
        let pending = match registry.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "pending_fetch_failed");
                return self.send(chat_id, "❌ Failed to fetch users").await;
            }
        };
        if pending.is_empty() {
            return self.send(chat_id, "Nėra laukiančių vartotojų.").await;
        }
        let text = format!("Laukiantys vartotojai ({}):", pending.len());
        let rows = pending
            .iter()
            .map(|user| {
                let name = user.display_name();
                let id = user.telegram_user_id;
                vec![
                    InlineKeyboardButton::callback(&format!("✅ {name}"), &format!("approve:{id}")),
                    InlineKeyboardButton::callback(&format!("❌ {name}"), &format!("reject:{id}")),
                ]
            })
            .collect();
        self.messenger
            .send_message_with_keyboard(chat_id, &text, InlineKeyboardMarkup { inline_keyboard: rows })
            .await
    }

    async fn cmd_users(&self, chat_id: i64) -> Result<(), TelegramError> {
        let Some(registry) = &self.registry else {
            return self.send(chat_id, SHEETS_MISSING).await;
        };
        let users = match registry.list_all().await {
            Ok(users) => users,
            Err(err) => {
                warn!(error = %err, "users_fetch_failed");
                return self.send(chat_id, "❌ Failed to fetch users").await;
            }
        };
        if users.is_empty() {
            return self.send(chat_id, "Vartotojų nėra.").await;
        }
        let mut lines = vec![format!("Vartotojai ({}):", users.len())];
        for user in &users {
            let status = if user.status.trim().is_empty() { "-" } else { user.status.trim() };
            lines.push(format!("- {}: {}", user.display_name(), status));
        }
        self.send(chat_id, &lines.join("\n")).await
    }

    async fn set_user_status(&self, user_id: i64, actor: &str, approve: bool) -> String {
        let Some(registry) = &self.registry else {
            return SHEETS_MISSING.to_string();
        };
        let result = if approve {
            registry.approve(user_id, actor, store_now()).await
        } else {
            registry.reject(user_id, actor, store_now()).await
        };
        match result {
            Ok(true) if approve => format!("✅ Vartotojas {user_id} patvirtintas."),
            Ok(true) => format!("✅ Vartotojas {user_id} atmestas."),
            Ok(false) => "Vartotojas nerastas.".to_string(),
            Err(err) => {
                warn!(user_id, error = %err, "user_status_update_failed");
                "❌ Failed to update user".to_string()
            }
        }
    }

    async fn cmd_set_status(
        &self,
        from: &TgUser,
        chat_id: i64,
        arg: Option<i64>,
        approve: bool,
    ) -> Result<(), TelegramError> {
        let Some(user_id) = arg else {
            let usage =
                if approve { "Naudojimas: /approve <user_id>" } else { "Naudojimas: /reject <user_id>" };
            return self.send(chat_id, usage).await;
        };
        let reply = self.set_user_status(user_id, &from.handle(), approve).await;
        self.send(chat_id, &reply).await
    }

    async fn cmd_sendtoday(&self, chat_id: i64) -> Result<(), TelegramError> {
        let reply = match self.reminder.run_daily().await {
            ReminderOutcome::NoData => "❌ Duomenų nėra. Naudokite /update.".to_string(),
            ReminderOutcome::NothingDue => "📭 No reminders to send today".to_string(),
            ReminderOutcome::NoRecipients => {
                "📭 No users or admins to send reminders to".to_string()
            }
            ReminderOutcome::Sent(report) => format!(
                "✅ Daily reminder sending completed: {} sent, {} errors",
                report.sent, report.failed
            ),
        };
        self.send(chat_id, &reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize::RawRow;
    use crate::io::sheets::{SheetsError, VehicleSource};
    use crate::services::broadcast::Broadcaster;
    use crate::services::testkit::{user_row, MockMessenger, MockRegistry};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::RwLock;

    struct FixedSource(Vec<RawRow>);

    #[async_trait]
    impl VehicleSource for FixedSource {
        async fn fetch_rows(&self) -> Result<Vec<RawRow>, SheetsError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        handler: CommandHandler,
        messenger: Arc<MockMessenger>,
        registry: Arc<MockRegistry>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with_registry(true)
    }

    fn fixture_with_registry(with_registry: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(RwLock::new(
            SnapshotStore::open(dir.path().join("vehicles.json")).unwrap(),
        ));
        let registry = Arc::new(MockRegistry::new(vec![
            user_row(7, "ona", Some(70), "approved"),
            user_row(8, "jonas", Some(80), "pending"),
            user_row(99, "boss", Some(990), "approved"),
        ]));
        let registry_opt: Option<Arc<dyn UserRegistry>> =
            with_registry.then(|| registry.clone() as Arc<dyn UserRegistry>);
        // Zero TTL keeps approval mutations visible to the next check.
        let directory = Arc::new(UserDirectory::new(
            registry_opt.clone(),
            vec![99],
            vec!["boss".to_string()],
            Duration::ZERO,
        ));
        let messenger = Arc::new(MockMessenger::new());
        // An expired deadline so the feed always produces a report.
        let source = Arc::new(FixedSource(vec![RawRow {
            plate: "AB123".to_string(),
            event_label: "CA draudimas iki".to_string(),
            expiry: "01/01/2020".to_string(),
            ..RawRow::default()
        }]));
        let sync = Arc::new(SyncEngine::new(source, store.clone()));
        let reminder = Arc::new(ReminderService::new(
            sync.clone(),
            store.clone(),
            directory.clone(),
            Broadcaster::new(messenger.clone(), Duration::ZERO, 4),
            chrono_tz::Europe::Vilnius,
        ));
        let handler = CommandHandler::new(
            store,
            registry_opt,
            directory,
            sync,
            reminder,
            messenger.clone(),
        );
        Fixture { handler, messenger, registry, _dir: dir }
    }

    fn msg(user_id: i64, username: Option<&str>, chat_id: i64, text: &str) -> Message {
        Message {
            message_id: 100,
            from: Some(TgUser {
                id: user_id,
                username: username.map(str::to_string),
                first_name: None,
            }),
            chat: crate::io::telegram::Chat { id: chat_id },
            text: Some(text.to_string()),
        }
    }

    fn callback(user_id: i64, chat_id: i64, data: &str) -> CallbackQuery {
        CallbackQuery {
            id: "cb1".to_string(),
            from: TgUser { id: user_id, username: None, first_name: None },
            message: Some(msg(user_id, None, chat_id, "placeholder")),
            data: Some(data.to_string()),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/pagalba"), Some(Command::Help));
        assert_eq!(parse_command("/id AB123"), Some(Command::Detail(Some("AB123".to_string()))));
        assert_eq!(parse_command("/id"), Some(Command::Detail(None)));
        assert_eq!(parse_command("/update@fleet_bot"), Some(Command::Update));
        assert_eq!(parse_command("/approve 42"), Some(Command::Approve(Some(42))));
        assert_eq!(parse_command("/approve jonas"), Some(Command::Approve(None)));
        assert_eq!(parse_command("/SENDTODAY"), Some(Command::SendToday));
        assert_eq!(parse_command("/kazkas"), Some(Command::Unknown));
        assert_eq!(parse_command("labas rytas"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(
            parse_callback("plate:AB123"),
            Some(CallbackAction::Plate("AB123".to_string()))
        );
        assert_eq!(parse_callback("approve:42"), Some(CallbackAction::Approve(42)));
        assert_eq!(parse_callback("reject:42"), Some(CallbackAction::Reject(42)));
        assert_eq!(parse_callback("approve:jonas"), None);
        assert_eq!(parse_callback("nonsense"), None);
    }

    #[tokio::test]
    async fn test_unapproved_user_blocked_from_info() {
        let fx = fixture();
        fx.handler.handle_message(&msg(5, None, 50, "/info")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(50), vec![NOT_APPROVED.to_string()]);
    }

    #[tokio::test]
    async fn test_pending_user_blocked_from_info() {
        let fx = fixture();
        fx.handler.handle_message(&msg(8, Some("jonas"), 80, "/info")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(80), vec![NOT_APPROVED.to_string()]);
    }

    #[tokio::test]
    async fn test_non_admin_blocked_from_update() {
        let fx = fixture();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/update")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(70), vec![NOT_ADMIN.to_string()]);
    }

    #[tokio::test]
    async fn test_admin_by_username_passes() {
        let fx = fixture();
        fx.handler.handle_message(&msg(1234, Some("Boss"), 12, "/dryrun")).await.unwrap();
        let texts = fx.messenger.texts_for(12);
        assert_eq!(texts, vec!["❌ Duomenų nėra. Naudokite /update.".to_string()]);
    }

    #[tokio::test]
    async fn test_start_registers_pending_user() {
        let fx = fixture();
        fx.handler.handle_message(&msg(5, Some("rasa"), 50, "/start")).await.unwrap();

        assert_eq!(
            fx.messenger.texts_for(50),
            vec!["Sveiki! Jūsų registracija pateikta. Laukite administratoriaus patvirtinimo."
                .to_string()]
        );
        let users = fx.registry.users.lock();
        let row = users.iter().find(|u| u.telegram_user_id == 5).unwrap();
        assert!(row.is_pending());
        assert_eq!(row.telegram_chat_id, Some(50));
    }

    #[tokio::test]
    async fn test_start_without_sheets_plain_greeting() {
        let fx = fixture_with_registry(false);
        fx.handler.handle_message(&msg(5, None, 50, "/start")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(50), vec!["Sveiki! Botas veikia. (/start)".to_string()]);
    }

    #[tokio::test]
    async fn test_whoami() {
        let fx = fixture();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/whoami")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(70), vec!["user_id=7, username=ona".to_string()]);
    }

    #[tokio::test]
    async fn test_status_of_pending_user() {
        let fx = fixture();
        fx.handler.handle_message(&msg(8, Some("jonas"), 80, "/status")).await.unwrap();
        assert_eq!(
            fx.messenger.texts_for(80),
            vec!["Jūsų registracija laukia patvirtinimo.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_status_for_admin_includes_data_line() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/status")).await.unwrap();
        let texts = fx.messenger.texts_for(990);
        assert_eq!(texts.len(), 1);
        let lines: Vec<&str> = texts[0].lines().collect();
        assert_eq!(lines[0], "Jūsų prieiga patvirtinta.");
        assert_eq!(lines[1], "❌ No data available - run /update to sync from Google Sheets");
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let fx = fixture();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/sarasas")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(70), vec!["Sąrašas tuščias.".to_string()]);
    }

    #[tokio::test]
    async fn test_list_after_sync_has_buttons() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/sarasas")).await.unwrap();

        assert_eq!(fx.messenger.texts_for(70), vec!["Numerių sąrašas:\nAB123".to_string()]);
        let keyboards = fx.messenger.keyboards.lock();
        assert_eq!(keyboards.len(), 1);
        assert_eq!(
            keyboards[0].1.inline_keyboard,
            vec![vec![InlineKeyboardButton::callback("AB123", "plate:AB123")]]
        );
    }

    #[tokio::test]
    async fn test_detail_usage_and_not_found() {
        let fx = fixture();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/id")).await.unwrap();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/id XX999")).await.unwrap();
        assert_eq!(
            fx.messenger.texts_for(70),
            vec!["Naudojimas: /id <numeris>".to_string(), "Numeris nerastas.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_detail_renders_expired_event() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        // Lowercase input still matches the stored plate.
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/id ab123")).await.unwrap();
        assert_eq!(
            fx.messenger.texts_for(70),
            vec!["AB123:\n- Draudimas: nebegalioja".to_string()]
        );
    }

    #[tokio::test]
    async fn test_update_edits_progress_message() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/update")).await.unwrap();

        assert_eq!(fx.messenger.texts_for(990), vec!["🔄 Atnaujinami duomenys...".to_string()]);
        let edits = fx.messenger.edits.lock();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, 990);
        assert_eq!(edits[0].2, "✅ Sync completed: 1 active vehicles, 0 excluded");
    }

    #[tokio::test]
    async fn test_remove_excludes_and_reports_list() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/remove ab123")).await.unwrap();

        let texts = fx.messenger.texts_for(990);
        assert_eq!(texts[0], "✅ Vehicle AB123 excluded from future reports");
        assert!(texts[1].starts_with("📋 Excluded vehicles:"));
        assert!(texts[1].contains("• AB123 (excluded"));
        assert!(texts[1].contains("by boss)"));
    }

    #[tokio::test]
    async fn test_remove_twice_and_unknown_plate() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/remove AB123")).await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/remove AB123")).await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/remove XX999")).await.unwrap();

        let texts = fx.messenger.texts_for(990);
        assert!(texts.contains(&"⚠️ Vehicle AB123 is already excluded".to_string()));
        assert!(texts.contains(&"❌ Vehicle XX999 not found in data".to_string()));
    }

    #[tokio::test]
    async fn test_excluded_vehicle_hidden_from_detail_and_list() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/remove AB123")).await.unwrap();

        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/id AB123")).await.unwrap();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/sarasas")).await.unwrap();
        assert_eq!(
            fx.messenger.texts_for(70),
            vec!["Numeris nerastas.".to_string(), "Sąrašas tuščias.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_restore_brings_vehicle_back() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/remove AB123")).await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/atstatyti AB123")).await.unwrap();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/atstatyti AB123")).await.unwrap();

        let texts = fx.messenger.texts_for(990);
        assert!(texts.contains(&"✅ Vehicle AB123 restored to reports".to_string()));
        assert!(texts.contains(&"📋 No vehicles are currently excluded".to_string()));
        assert!(texts.contains(&"⚠️ Vehicle AB123 is not excluded".to_string()));
    }

    #[tokio::test]
    async fn test_pending_list_with_approval_buttons() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/pending")).await.unwrap();

        assert_eq!(fx.messenger.texts_for(990), vec!["Laukiantys vartotojai (1):".to_string()]);
        let keyboards = fx.messenger.keyboards.lock();
        assert_eq!(
            keyboards[0].1.inline_keyboard,
            vec![vec![
                InlineKeyboardButton::callback("✅ jonas", "approve:8"),
                InlineKeyboardButton::callback("❌ jonas", "reject:8"),
            ]]
        );
    }

    #[tokio::test]
    async fn test_approve_command_updates_registry() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/approve 8")).await.unwrap();

        assert_eq!(fx.messenger.texts_for(990), vec!["✅ Vartotojas 8 patvirtintas.".to_string()]);
        assert!(fx.registry.users.lock().iter().find(|u| u.telegram_user_id == 8).unwrap().is_approved());
        // Freshly approved user can now read.
        fx.handler.handle_message(&msg(8, Some("jonas"), 80, "/sarasas")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(80), vec!["Sąrašas tuščias.".to_string()]);
    }

    #[tokio::test]
    async fn test_approve_unknown_user() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/approve 12345")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(990), vec!["Vartotojas nerastas.".to_string()]);
    }

    #[tokio::test]
    async fn test_reject_command() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/reject 8")).await.unwrap();
        assert_eq!(fx.messenger.texts_for(990), vec!["✅ Vartotojas 8 atmestas.".to_string()]);
    }

    #[tokio::test]
    async fn test_callback_plate_edits_detail() {
        let fx = fixture();
        fx.handler.sync.run_sync().await.unwrap();
        fx.handler.handle_callback(&callback(7, 70, "plate:AB123")).await.unwrap();

        let answers = fx.messenger.answers.lock();
        assert_eq!(answers[0], ("cb1".to_string(), Some("Apdorojama…".to_string())));
        let edits = fx.messenger.edits.lock();
        assert_eq!(edits[0].2, "AB123:\n- Draudimas: nebegalioja");
    }

    #[tokio::test]
    async fn test_callback_approve_needs_admin() {
        let fx = fixture();
        fx.handler.handle_callback(&callback(7, 70, "approve:8")).await.unwrap();
        assert!(fx.messenger.edits.lock().is_empty());
        assert!(fx.registry.users.lock().iter().find(|u| u.telegram_user_id == 8).unwrap().is_pending());

        fx.handler.handle_callback(&callback(99, 990, "approve:8")).await.unwrap();
        assert_eq!(fx.messenger.edits.lock()[0].2, "✅ Vartotojas 8 patvirtintas.");
    }

    #[tokio::test]
    async fn test_sendtoday_broadcasts_and_reports() {
        let fx = fixture();
        fx.handler.handle_message(&msg(99, Some("boss"), 990, "/sendtoday")).await.unwrap();

        // ona and boss have chat ids and are approved; jonas is pending.
        let texts = fx.messenger.texts_for(990);
        assert_eq!(texts.last().unwrap(), "✅ Daily reminder sending completed: 2 sent, 0 errors");
        let ona = fx.messenger.texts_for(70);
        assert_eq!(ona.len(), 1);
        assert!(ona[0].contains("Nebegalioja:"));
        assert!(ona[0].contains("AB123 — CA draudimas — nebegalioja nuo 2020-01-01"));
    }

    #[tokio::test]
    async fn test_plain_text_ignored() {
        let fx = fixture();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "labas")).await.unwrap();
        fx.handler.handle_message(&msg(7, Some("ona"), 70, "/kazkas")).await.unwrap();
        assert!(fx.messenger.sent.lock().is_empty());
    }
}
