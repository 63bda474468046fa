//! Sync cycle
//!
//! One cycle pulls the data tab, normalizes and reconciles the rows, then
//! merges the result into the snapshot store and persists it. Cycles never
//! overlap: the whole fetch-to-persist path runs under a try-acquire gate,
//! and a second caller is told to come back later instead of queueing.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::normalize::normalize_rows;
use crate::domain::reconcile::reconcile;
use crate::io::sheets::{SheetsError, VehicleSource};
use crate::io::store::{store_now, SnapshotStore, StoreError, StoreStats};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync cycle is already running")]
    AlreadyRunning,
    #[error("source fetch failed: {0}")]
    Source(#[from] SheetsError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub rows: usize,
    pub records: usize,
    pub pruned: usize,
    pub stats: StoreStats,
}

pub struct SyncEngine {
    source: Arc<dyn VehicleSource>,
    store: Arc<RwLock<SnapshotStore>>,
    gate: Mutex<()>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn VehicleSource>, store: Arc<RwLock<SnapshotStore>>) -> Self {
        Self { source, store, gate: Mutex::new(()) }
    }

    /// Runs one full sync cycle. Fails fast with [`SyncError::AlreadyRunning`]
    /// when another cycle holds the gate.
    pub async fn run_sync(&self) -> Result<SyncOutcome, SyncError> {
        let Ok(_guard) = self.gate.try_lock() else {
            warn!("sync_skipped_already_running");
            return Err(SyncError::AlreadyRunning);
        };

        let cycle = Uuid::now_v7();
        info!(cycle = %cycle, "sync_started");

        let rows = self.source.fetch_rows().await?;
        let observations = normalize_rows(&rows);
        let records = reconcile(observations);
        let record_count = records.len();

        let (pruned, stats) = {
            let mut store = self.store.write().await;
            let removed = store.apply_sync(records, store_now());
            for plate in &removed {
                info!(cycle = %cycle, plate = %plate, "vehicle_pruned");
            }
            store.save()?;
            (removed.len(), store.stats())
        };

        info!(
            cycle = %cycle,
            rows = rows.len(),
            records = record_count,
            pruned,
            active = stats.active,
            excluded = stats.excluded,
            "sync_completed"
        );
        Ok(SyncOutcome { rows: rows.len(), records: record_count, pruned, stats })
    }
}
