//! Local JSON snapshot store
//!
//! Holds the reconciled vehicle state between syncs and across restarts so
//! reminders keep working when the spreadsheet is unreachable. One JSON
//! document on disk, written atomically (temp file in the same directory,
//! then rename) so an interrupted sync never leaves a torn snapshot.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::types::{DeadlineRecord, DocRefs, EventKind, Plate};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read snapshot {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("snapshot {path} is not valid: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("snapshot schema version {found} is newer than supported {SCHEMA_VERSION}")]
    Version { found: u32 },
    #[error("failed to write snapshot {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("vehicle {0} not found")]
    NotFound(Plate),
    #[error("vehicle {0} is already excluded")]
    AlreadyExcluded(Plate),
    #[error("vehicle {0} is not excluded")]
    NotExcluded(Plate),
}

/// One persisted deadline entry, the stored form of a [`DeadlineRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub kind: EventKind,
    pub expires: Option<NaiveDate>,
    #[serde(default)]
    pub doc_refs: Vec<String>,
    #[serde(default)]
    pub observed_at: Option<NaiveDateTime>,
}

/// Persisted per-vehicle state. `events` is replaced wholesale on every sync;
/// the `excluded*` fields are admin state and survive syncs untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub events: Vec<StoredEvent>,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub excluded_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub excluded_by: Option<String>,
    pub last_seen: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    last_updated: Option<NaiveDateTime>,
    vehicles: BTreeMap<Plate, VehicleSnapshot>,
}

impl Default for SnapshotFile {
    fn default() -> Self {
        Self { version: SCHEMA_VERSION, last_updated: None, vehicles: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub excluded: usize,
}

#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    data: SnapshotFile,
}

impl SnapshotStore {
    /// Opens the snapshot at `path`. A missing file yields an empty store;
    /// an unreadable or unparseable one is an error so the caller can decide
    /// whether to start fresh.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            info!(path = %path.display(), "snapshot_missing_starting_empty");
            return Ok(Self { path, data: SnapshotFile::default() });
        }
        let content = fs::read_to_string(&path)
            .map_err(|source| StoreError::Read { path: path.clone(), source })?;
        let data: SnapshotFile = serde_json::from_str(&content)
            .map_err(|source| StoreError::Parse { path: path.clone(), source })?;
        if data.version > SCHEMA_VERSION {
            return Err(StoreError::Version { found: data.version });
        }
        info!(path = %path.display(), vehicles = data.vehicles.len(), "snapshot_loaded");
        Ok(Self { path, data })
    }

    /// An empty store bound to `path`, used when a corrupt snapshot is
    /// deliberately abandoned.
    pub fn empty<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), data: SnapshotFile::default() }
    }

    /// Persists the current state atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|source| StoreError::Parse { path: self.path.clone(), source })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .map_err(|source| StoreError::Write { path: tmp.clone(), source })?;
        fs::rename(&tmp, &self.path)
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
        debug!(path = %self.path.display(), vehicles = self.data.vehicles.len(), "snapshot_saved");
        Ok(())
    }

    /// Replaces vehicle events with the latest reconciled records, carrying
    /// exclusion state forward, then prunes vehicles that vanished from the
    /// source and are not excluded. Returns the pruned plates.
    pub fn apply_sync(&mut self, records: Vec<DeadlineRecord>, now: NaiveDateTime) -> Vec<Plate> {
        let mut incoming: BTreeMap<Plate, Vec<StoredEvent>> = BTreeMap::new();
        for record in records {
            incoming.entry(record.plate.clone()).or_default().push(StoredEvent {
                kind: record.kind,
                expires: record.expiry,
                doc_refs: record.doc_refs.to_vec(),
                observed_at: record.observed_at,
            });
        }

        for (plate, events) in &incoming {
            let snapshot = match self.data.vehicles.get(plate) {
                Some(existing) => VehicleSnapshot {
                    events: events.clone(),
                    excluded: existing.excluded,
                    excluded_at: existing.excluded_at,
                    excluded_by: existing.excluded_by.clone(),
                    last_seen: now,
                },
                None => VehicleSnapshot {
                    events: events.clone(),
                    excluded: false,
                    excluded_at: None,
                    excluded_by: None,
                    last_seen: now,
                },
            };
            self.data.vehicles.insert(plate.clone(), snapshot);
        }

        let removed: Vec<Plate> = self
            .data
            .vehicles
            .iter()
            .filter(|(plate, snapshot)| !incoming.contains_key(*plate) && !snapshot.excluded)
            .map(|(plate, _)| plate.clone())
            .collect();
        for plate in &removed {
            self.data.vehicles.remove(plate);
        }

        self.data.last_updated = Some(now);
        removed
    }

    pub fn exclude(
        &mut self,
        plate: &Plate,
        excluded_by: &str,
        now: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let snapshot = self
            .data
            .vehicles
            .get_mut(plate)
            .ok_or_else(|| StoreError::NotFound(plate.clone()))?;
        if snapshot.excluded {
            return Err(StoreError::AlreadyExcluded(plate.clone()));
        }
        snapshot.excluded = true;
        snapshot.excluded_at = Some(now);
        snapshot.excluded_by = Some(excluded_by.to_string());
        Ok(())
    }

    pub fn restore(&mut self, plate: &Plate) -> Result<(), StoreError> {
        let snapshot = self
            .data
            .vehicles
            .get_mut(plate)
            .ok_or_else(|| StoreError::NotFound(plate.clone()))?;
        if !snapshot.excluded {
            return Err(StoreError::NotExcluded(plate.clone()));
        }
        snapshot.excluded = false;
        snapshot.excluded_at = None;
        snapshot.excluded_by = None;
        Ok(())
    }

    /// All deadline records of non-excluded vehicles; input to classification.
    pub fn active_records(&self) -> Vec<DeadlineRecord> {
        let mut records = Vec::new();
        for (plate, snapshot) in &self.data.vehicles {
            if snapshot.excluded {
                continue;
            }
            for event in &snapshot.events {
                records.push(DeadlineRecord {
                    plate: plate.clone(),
                    kind: event.kind,
                    expiry: event.expires,
                    observed_at: event.observed_at,
                    doc_refs: DocRefs::from_iter(event.doc_refs.iter().cloned()),
                });
            }
        }
        records
    }

    /// Looks a vehicle up regardless of exclusion; callers decide how to
    /// present excluded ones.
    pub fn vehicle(&self, plate: &Plate) -> Option<&VehicleSnapshot> {
        self.data.vehicles.get(plate)
    }

    /// Sorted plates of non-excluded vehicles.
    pub fn active_plates(&self) -> Vec<Plate> {
        self.data
            .vehicles
            .iter()
            .filter(|(_, snapshot)| !snapshot.excluded)
            .map(|(plate, _)| plate.clone())
            .collect()
    }

    pub fn excluded_vehicles(&self) -> Vec<(Plate, Option<NaiveDateTime>, Option<String>)> {
        self.data
            .vehicles
            .iter()
            .filter(|(_, snapshot)| snapshot.excluded)
            .map(|(plate, snapshot)| {
                (plate.clone(), snapshot.excluded_at, snapshot.excluded_by.clone())
            })
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let total = self.data.vehicles.len();
        let excluded = self.data.vehicles.values().filter(|v| v.excluded).count();
        StoreStats { total, active: total - excluded, excluded }
    }

    pub fn last_updated(&self) -> Option<NaiveDateTime> {
        self.data.last_updated
    }

    pub fn has_data(&self) -> bool {
        !self.data.vehicles.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The store's notion of "now"; callers inject it so tests stay deterministic.
pub fn store_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
