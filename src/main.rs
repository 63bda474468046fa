//! Fleetminder - vehicle compliance deadline reminders over Telegram
//!
//! Pulls deadline rows from a Google Sheets form-responses tab, keeps a local
//! JSON snapshot, and messages approved Telegram users when documents come due.
//!
//! Module structure:
//! - `domain/` - Deadline engine (normalize, reconcile, window, summary)
//! - `io/` - External interfaces (Sheets, Telegram, snapshot store)
//! - `services/` - Orchestration (sync, reminders, command handling)
//! - `infra/` - Infrastructure (Config)

use chrono_tz::Tz;
use fleetminder::infra::Config;
use fleetminder::io::{
    OauthRefresher, SheetsClient, SheetsVehicleSource, SnapshotStore, StaticToken, TelegramClient,
    TokenProvider, UnconfiguredSource, UserRegistry, UsersRepo, VehicleSource,
};
use fleetminder::services::{
    BotLoop, Broadcaster, CommandHandler, ReminderService, SyncEngine, UserDirectory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "fleetminder starting");

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load(&args);

    if config.telegram_token().is_empty() {
        return Err("telegram token missing: set [telegram].token or TELEGRAM_BOT_TOKEN".into());
    }

    info!(
        config_file = %config.config_file(),
        snapshot_file = %config.snapshot_file(),
        sheets_configured = %config.sheets_configured(),
        data_tab = %config.data_tab(),
        users_tab = %config.users_tab(),
        schedule_cron = %config.schedule_cron(),
        schedule_timezone = %config.schedule_timezone(),
        admin_ids = ?config.admin_user_ids(),
        poll_timeout_secs = %config.poll_timeout_secs(),
        "config_loaded"
    );

    let timezone: Tz = config
        .schedule_timezone()
        .parse()
        .map_err(|e| format!("bad [schedule].timezone: {e}"))?;

    // Load the snapshot; a corrupt file is not fatal, the next sync rewrites it
    let store = match SnapshotStore::open(config.snapshot_file()) {
        Ok(store) => store,
        Err(err) => {
            warn!(error = %err, "snapshot_unreadable_starting_empty");
            SnapshotStore::empty(config.snapshot_file())
        }
    };
    let store = Arc::new(RwLock::new(store));

    // Sheets stack; without it the bot still serves the snapshot but /update fails
    let (source, registry): (Arc<dyn VehicleSource>, Option<Arc<dyn UserRegistry>>) =
        if config.sheets_configured() {
            let sheets = build_sheets_client(&config)?;
            let users = Arc::new(UsersRepo::new(sheets.clone(), config.users_tab()));
            if let Err(err) = users.ensure().await {
                warn!(error = %err, "users_tab_ensure_failed");
            }
            (Arc::new(SheetsVehicleSource::new(sheets, config.data_tab())), Some(users))
        } else {
            info!("sheets_not_configured_sync_disabled");
            (Arc::new(UnconfiguredSource), None)
        };

    let sync = Arc::new(SyncEngine::new(source, store.clone()));
    let directory = Arc::new(UserDirectory::new(
        registry.clone(),
        config.admin_user_ids().to_vec(),
        config.admin_usernames().to_vec(),
        Duration::from_secs(config.users_cache_ttl_secs()),
    ));

    let telegram = Arc::new(TelegramClient::new(
        config.telegram_token(),
        config.poll_timeout_secs(),
    )?);

    let broadcaster = Broadcaster::new(
        telegram.clone(),
        Duration::from_millis(config.send_delay_ms()),
        config.max_in_flight(),
    );
    let reminder = Arc::new(ReminderService::new(
        sync.clone(),
        store.clone(),
        directory.clone(),
        broadcaster,
        timezone,
    ));
    let handler = Arc::new(CommandHandler::new(
        store,
        registry,
        directory,
        sync,
        reminder.clone(),
        telegram.clone(),
    ));

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Schedule the daily reminder run in the configured timezone
    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| format!("scheduler init failed: {e}"))?;
    let job_reminder = reminder.clone();
    let daily = Job::new_async_tz(config.schedule_cron(), timezone, move |_uuid, _lock| {
        let reminder = job_reminder.clone();
        Box::pin(async move {
            let outcome = reminder.run_daily().await;
            info!(?outcome, "scheduled_run_finished");
        })
    })
    .map_err(|e| format!("bad [schedule].cron {:?}: {e}", config.schedule_cron()))?;
    scheduler.add(daily).await.map_err(|e| format!("scheduler add failed: {e}"))?;
    scheduler.start().await.map_err(|e| format!("scheduler start failed: {e}"))?;
    info!(cron = %config.schedule_cron(), timezone = %timezone, "scheduler_started");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the long poll loop until shutdown
    BotLoop::new(telegram, handler, shutdown_rx).run().await;

    if let Err(err) = scheduler.shutdown().await {
        warn!(error = %err, "scheduler_shutdown_failed");
    }

    info!("fleetminder shutdown complete");
    Ok(())
}

/// Builds the Sheets client, preferring a pre-issued access token over the
/// credentials-file refresher when both are configured.
fn build_sheets_client(config: &Config) -> Result<Arc<SheetsClient>, Box<dyn std::error::Error>> {
    let provider: Arc<dyn TokenProvider> = if let Some(token) = config.access_token() {
        Arc::new(StaticToken::new(token))
    } else {
        let path = config.credentials_path().ok_or("sheets credentials missing")?;
        Arc::new(OauthRefresher::from_credentials_file(path)?)
    };
    let spreadsheet_id = config.spreadsheet_id().ok_or("spreadsheet id missing")?;
    Ok(Arc::new(SheetsClient::new(provider, spreadsheet_id)?))
}
