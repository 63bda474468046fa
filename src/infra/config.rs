//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! The bot token may additionally come from the TELEGRAM_BOT_TOKEN
//! environment variable, which overrides the file.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,
    #[serde(default)]
    pub admin_usernames: Vec<String>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_poll_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    /// Path to an OAuth authorized-user credentials JSON file
    #[serde(default)]
    pub credentials_path: Option<String>,
    /// Pre-issued bearer token, mostly for development
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_data_tab")]
    pub data_tab: String,
    #[serde(default = "default_users_tab")]
    pub users_tab: String,
}

fn default_data_tab() -> String {
    "Form Responses".to_string()
}

fn default_users_tab() -> String {
    "Users".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { snapshot_file: default_snapshot_file() }
    }
}

fn default_snapshot_file() -> String {
    "data/vehicles.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// 6-field cron expression (seconds first)
    #[serde(default = "default_cron")]
    pub cron: String,
    /// IANA timezone name for the cron expression and "today"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { cron: default_cron(), timezone: default_timezone() }
    }
}

fn default_cron() -> String {
    "0 0 8 * * *".to_string()
}

fn default_timezone() -> String {
    "Europe/Vilnius".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_users_cache_ttl_secs")]
    pub users_cache_ttl_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay_ms(),
            max_in_flight: default_max_in_flight(),
            users_cache_ttl_secs: default_users_cache_ttl_secs(),
        }
    }
}

fn default_send_delay_ms() -> u64 {
    1000
}

fn default_max_in_flight() -> usize {
    4
}

fn default_users_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    telegram_token: String,
    admin_user_ids: Vec<i64>,
    admin_usernames: Vec<String>,
    poll_timeout_secs: u64,
    spreadsheet_id: Option<String>,
    credentials_path: Option<String>,
    access_token: Option<String>,
    data_tab: String,
    users_tab: String,
    snapshot_file: String,
    schedule_cron: String,
    schedule_timezone: String,
    send_delay_ms: u64,
    max_in_flight: usize,
    users_cache_ttl_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            admin_user_ids: Vec::new(),
            admin_usernames: Vec::new(),
            poll_timeout_secs: default_poll_timeout_secs(),
            spreadsheet_id: None,
            credentials_path: None,
            access_token: None,
            data_tab: default_data_tab(),
            users_tab: default_users_tab(),
            snapshot_file: default_snapshot_file(),
            schedule_cron: default_cron(),
            schedule_timezone: default_timezone(),
            send_delay_ms: default_send_delay_ms(),
            max_in_flight: default_max_in_flight(),
            users_cache_ttl_secs: default_users_cache_ttl_secs(),
            config_file: "default".to_string(),
        }
    }
}

/// Admin usernames are matched case-insensitively without a leading '@'.
fn normalize_usernames(raw: Vec<String>) -> Vec<String> {
    raw.iter()
        .map(|u| u.trim().trim_start_matches('@').to_lowercase())
        .filter(|u| !u.is_empty())
        .collect()
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            telegram_token: toml_config.telegram.token,
            admin_user_ids: toml_config.telegram.admin_user_ids,
            admin_usernames: normalize_usernames(toml_config.telegram.admin_usernames),
            poll_timeout_secs: toml_config.telegram.poll_timeout_secs,
            spreadsheet_id: toml_config.sheets.spreadsheet_id,
            credentials_path: toml_config.sheets.credentials_path,
            access_token: toml_config.sheets.access_token,
            data_tab: toml_config.sheets.data_tab,
            users_tab: toml_config.sheets.users_tab,
            snapshot_file: toml_config.storage.snapshot_file,
            schedule_cron: toml_config.schedule.cron,
            schedule_timezone: toml_config.schedule.timezone,
            send_delay_ms: toml_config.broadcast.send_delay_ms,
            max_in_flight: toml_config.broadcast.max_in_flight,
            users_cache_ttl_secs: toml_config.broadcast.users_cache_ttl_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults.
    /// TELEGRAM_BOT_TOKEN from the environment overrides either source.
    pub fn load(args: &[String]) -> Self {
        let config_path = Self::resolve_config_path(args);

        let config = match Self::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        };
        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                self.telegram_token = token;
            }
        }
        self
    }

    /// Sheets-backed features need a spreadsheet id and some credential.
    pub fn sheets_configured(&self) -> bool {
        self.spreadsheet_id.is_some()
            && (self.credentials_path.is_some() || self.access_token.is_some())
    }

    // Getters for all config fields
    pub fn telegram_token(&self) -> &str {
        &self.telegram_token
    }

    pub fn admin_user_ids(&self) -> &[i64] {
        &self.admin_user_ids
    }

    pub fn admin_usernames(&self) -> &[String] {
        &self.admin_usernames
    }

    pub fn poll_timeout_secs(&self) -> u64 {
        self.poll_timeout_secs
    }

    pub fn spreadsheet_id(&self) -> Option<&str> {
        self.spreadsheet_id.as_deref()
    }

    pub fn credentials_path(&self) -> Option<&str> {
        self.credentials_path.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn data_tab(&self) -> &str {
        &self.data_tab
    }

    pub fn users_tab(&self) -> &str {
        &self.users_tab
    }

    pub fn snapshot_file(&self) -> &str {
        &self.snapshot_file
    }

    pub fn schedule_cron(&self) -> &str {
        &self.schedule_cron
    }

    pub fn schedule_timezone(&self) -> &str {
        &self.schedule_timezone
    }

    pub fn send_delay_ms(&self) -> u64 {
        self.send_delay_ms
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn users_cache_ttl_secs(&self) -> u64 {
        self.users_cache_ttl_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the admin allow-list
    #[cfg(test)]
    pub fn with_admins(mut self, ids: Vec<i64>, usernames: Vec<String>) -> Self {
        self.admin_user_ids = ids;
        self.admin_usernames = normalize_usernames(usernames);
        self
    }

    /// Builder method for tests to point the store at a temp file
    #[cfg(test)]
    pub fn with_snapshot_file(mut self, path: &str) -> Self {
        self.snapshot_file = path.to_string();
        self
    }
}
