//! Fleetminder Preview - offline rendering of reminder output
//!
//! Reads the local snapshot and prints what the bot would send, without
//! touching Telegram or Sheets. Useful for checking a snapshot after a sync
//! or rehearsing a future date.
//!
//! Usage:
//!   fleetminder-preview --config config/dev.toml
//!   fleetminder-preview --date 2026-03-15
//!   fleetminder-preview --plate AB123
//!   fleetminder-preview --excluded

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use clap::Parser;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use fleetminder::domain::summary::{render_excluded_list, render_summary, render_vehicle_detail};
use fleetminder::domain::types::{EventKind, Plate};
use fleetminder::domain::window::classify;
use fleetminder::infra::Config;
use fleetminder::io::SnapshotStore;

/// Fleetminder Preview - render reminder output from the local snapshot
#[derive(Parser, Debug)]
#[command(name = "fleetminder-preview", version, about, long_about = None)]
struct Args {
    /// Path to TOML configuration file
    ///
    /// Only the storage and schedule sections are used.
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Render for this date (YYYY-MM-DD) instead of today
    #[arg(short, long)]
    date: Option<String>,

    /// Show one vehicle's deadlines instead of the daily summary
    #[arg(short, long)]
    plate: Option<String>,

    /// Show the excluded-vehicles list instead of the daily summary
    #[arg(short = 'x', long)]
    excluded: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Quiet by default so stdout stays clean; RUST_LOG overrides
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {e}. Using defaults.");
            Config::default()
        }
    };

    let timezone: Tz = config
        .schedule_timezone()
        .parse()
        .map_err(|e| format!("bad [schedule].timezone: {e}"))?;
    let today = match args.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| format!("bad --date {raw:?}: {e}"))?,
        None => Utc::now().with_timezone(&timezone).date_naive(),
    };

    let store = SnapshotStore::open(config.snapshot_file())?;

    if let Some(raw) = args.plate.as_deref() {
        let plate = Plate::new(raw);
        match store.vehicle(&plate) {
            Some(vehicle) => {
                let events: Vec<(EventKind, Option<NaiveDate>)> =
                    vehicle.events.iter().map(|e| (e.kind, e.expires)).collect();
                println!("{}", render_vehicle_detail(&plate, &events, today));
                if vehicle.excluded {
                    println!("(excluded from reports)");
                }
            }
            None => println!("{plate} not in snapshot"),
        }
        return Ok(());
    }

    if args.excluded {
        println!("{}", render_excluded_list(&store.excluded_vehicles()));
        return Ok(());
    }

    let stats = store.stats();
    let updated = store
        .last_updated()
        .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("# {today} | {} active, {} excluded | updated {updated}", stats.active, stats.excluded);
    println!();
    println!("{}", render_summary(&classify(today, &store.active_records())));

    Ok(())
}
