//! Service layer wiring the domain rules to Sheets and Telegram.
//!
//! - `sync`: one-flight pull of the data tab into the snapshot store
//! - `directory`: access control and recipient resolution with a cached
//!   approval set
//! - `broadcast`: rate-limited fan-out of one message to many chats
//! - `reminder`: the daily sync-classify-render-send flow
//! - `commands`: parsing and dispatch of bot commands and callbacks
//! - `bot`: the long-poll loop feeding updates into `commands`

pub mod bot;
pub mod broadcast;
pub mod commands;
pub mod directory;
pub mod reminder;
pub mod sync;

#[cfg(test)]
pub(crate) mod testkit;

pub use bot::BotLoop;
pub use broadcast::{Broadcaster, DeliveryReport};
pub use commands::CommandHandler;
pub use directory::{Recipient, UserDirectory};
pub use reminder::{ReminderOutcome, ReminderService};
pub use sync::{SyncEngine, SyncError, SyncOutcome};
