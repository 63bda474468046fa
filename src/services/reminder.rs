//! The daily reminder flow: sync, classify, render, broadcast.
//!
//! A failed sync degrades rather than aborts. Whatever snapshot survived
//! the last good cycle is still worth reminding about; only an empty store
//! makes the day a no-op.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::summary::render_summary;
use crate::domain::window::classify;
use crate::io::store::SnapshotStore;
use crate::services::broadcast::{Broadcaster, DeliveryReport};
use crate::services::directory::UserDirectory;
use crate::services::sync::{SyncEngine, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// Nothing synced yet and nothing on disk.
    NoData,
    /// Snapshot present but no deadline sits in a reminder window today.
    NothingDue,
    NoRecipients,
    Sent(DeliveryReport),
}

pub struct ReminderService {
    sync: Arc<SyncEngine>,
    store: Arc<RwLock<SnapshotStore>>,
    directory: Arc<UserDirectory>,
    broadcaster: Broadcaster,
    timezone: Tz,
}

impl ReminderService {
    pub fn new(
        sync: Arc<SyncEngine>,
        store: Arc<RwLock<SnapshotStore>>,
        directory: Arc<UserDirectory>,
        broadcaster: Broadcaster,
        timezone: Tz,
    ) -> Self {
        Self { sync, store, directory, broadcaster, timezone }
    }

    /// Today's date on the reminder calendar, not the server's.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Renders today's summary from the snapshot alone, no sync. `None`
    /// means there is no snapshot to render from.
    pub async fn summary_text(&self) -> Option<String> {
        let store = self.store.read().await;
        if !store.has_data() {
            return None;
        }
        let report = classify(self.today(), &store.active_records());
        Some(render_summary(&report))
    }

    /// The full daily run, also reachable on demand via /sendtoday.
    pub async fn run_daily(&self) -> ReminderOutcome {
        match self.sync.run_sync().await {
            Ok(outcome) => {
                info!(active = outcome.stats.active, "daily_sync_ok");
            }
            Err(SyncError::AlreadyRunning) => {
                warn!("daily_sync_overlapped_using_snapshot");
            }
            Err(err) => {
                warn!(error = %err, "daily_sync_failed_using_snapshot");
            }
        }
        self.send_for(self.today()).await
    }

    async fn send_for(&self, today: NaiveDate) -> ReminderOutcome {
        let text = {
            let store = self.store.read().await;
            if !store.has_data() {
                warn!("daily_skipped_no_data");
                return ReminderOutcome::NoData;
            }
            let report = classify(today, &store.active_records());
            if report.is_empty() {
                info!(%today, "no_reminders_today");
                return ReminderOutcome::NothingDue;
            }
            info!(
                %today,
                upcoming = report.upcoming.len(),
                expired = report.expired.len(),
                "daily_summary_built"
            );
            render_summary(&report)
        };

        let recipients = match self.directory.recipients().await {
            Ok(recipients) => recipients,
            Err(err) => {
                warn!(error = %err, "recipient_resolution_failed");
                return ReminderOutcome::NoRecipients;
            }
        };
        if recipients.is_empty() {
            info!("daily_skipped_no_recipients");
            return ReminderOutcome::NoRecipients;
        }

        ReminderOutcome::Sent(self.broadcaster.broadcast(&recipients, &text).await)
    }
}
