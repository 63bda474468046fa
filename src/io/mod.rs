//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `auth` - OAuth bearer tokens for the Sheets API
//! - `sheets` - Google Sheets REST client (data tab + Users tab)
//! - `telegram` - Telegram Bot API client
//! - `store` - local JSON snapshot store

pub mod auth;
pub mod sheets;
pub mod store;
pub mod telegram;

// Re-export commonly used types
pub use auth::{AuthError, OauthRefresher, StaticToken, TokenProvider};
pub use sheets::{
    SheetsClient, SheetsError, SheetsVehicleSource, UnconfiguredSource, UserRegistry, UserRow,
    UsersRepo, VehicleSource,
};
pub use store::{SnapshotStore, StoreError, StoreStats, VehicleSnapshot};
pub use telegram::{Messenger, TelegramClient, TelegramError};
