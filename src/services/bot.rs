//! Long-poll loop feeding updates into the command handler.
//!
//! Updates are confirmed by advancing the offset past each one, so a crash
//! between poll and dispatch redelivers rather than drops. Poll failures
//! back off briefly instead of spinning against a dead network.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::io::telegram::{TelegramClient, Update};
use crate::services::commands::CommandHandler;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct BotLoop {
    client: Arc<TelegramClient>,
    handler: Arc<CommandHandler>,
    shutdown: watch::Receiver<bool>,
}

impl BotLoop {
    pub fn new(
        client: Arc<TelegramClient>,
        handler: Arc<CommandHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { client, handler, shutdown }
    }

    pub async fn run(mut self) {
        let mut offset = match self.client.drop_pending_updates().await {
            Ok(offset) => {
                info!("bot_loop_started");
                offset
            }
            Err(err) => {
                warn!(error = %err, "backlog_drop_failed");
                None
            }
        };

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("bot_loop_shutdown");
                        return;
                    }
                }
                result = self.client.get_updates(offset) => match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = Some(update.update_id + 1);
                            self.dispatch(&update).await;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "get_updates_failed");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, update: &Update) {
        if let Some(message) = &update.message {
            if let Err(err) = self.handler.handle_message(message).await {
                warn!(update_id = update.update_id, error = %err, "message_handling_failed");
            }
        }
        if let Some(callback) = &update.callback_query {
            if let Err(err) = self.handler.handle_callback(callback).await {
                warn!(update_id = update.update_id, error = %err, "callback_handling_failed");
            }
        }
    }
}
