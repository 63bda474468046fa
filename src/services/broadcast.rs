//! Fan-out of one message to many chats.
//!
//! Sends run with bounded concurrency and a small pause after each send so
//! a large recipient list stays inside Telegram's per-bot rate limits. One
//! refused chat never aborts the rest of the run; failures are tallied and
//! reported.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::io::telegram::{Messenger, TelegramError};
use crate::services::directory::Recipient;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct Broadcaster {
    messenger: Arc<dyn Messenger>,
    send_delay: Duration,
    max_in_flight: usize,
}

impl Broadcaster {
    pub fn new(messenger: Arc<dyn Messenger>, send_delay: Duration, max_in_flight: usize) -> Self {
        Self { messenger, send_delay, max_in_flight: max_in_flight.max(1) }
    }

    pub async fn broadcast(&self, recipients: &[Recipient], text: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut queue = recipients.iter().cloned();
        let mut tasks: JoinSet<(Recipient, Result<i64, TelegramError>)> = JoinSet::new();

        loop {
            while tasks.len() < self.max_in_flight {
                let Some(recipient) = queue.next() else { break };
                let messenger = self.messenger.clone();
                let text = text.to_string();
                let delay = self.send_delay;
                tasks.spawn(async move {
                    let result = messenger.send_message(recipient.chat_id, &text).await;
                    // The pause counts against this slot, pacing the whole run.
                    tokio::time::sleep(delay).await;
                    (recipient, result)
                });
            }

            match tasks.join_next().await {
                Some(Ok((recipient, Ok(_)))) => {
                    report.sent += 1;
                    debug!(chat_id = recipient.chat_id, name = %recipient.name, "reminder_sent");
                }
                Some(Ok((recipient, Err(err)))) => {
                    report.failed += 1;
                    warn!(chat_id = recipient.chat_id, error = %err, "reminder_send_failed");
                }
                Some(Err(join_err)) => {
                    report.failed += 1;
                    warn!(error = %join_err, "reminder_task_panicked");
                }
                None => break,
            }
        }

        info!(sent = report.sent, failed = report.failed, "broadcast_done");
        report
    }
}
