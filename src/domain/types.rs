//! Shared types for the deadline engine

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Newtype wrapper for vehicle plate numbers to provide type safety.
///
/// Plates are stored uppercased with surrounding whitespace removed so that
/// lookups from chat commands and spreadsheet rows agree on a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Plate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical deadline categories tracked per vehicle.
///
/// This is a closed set; spreadsheet rows whose label does not map onto one
/// of these are dropped at the normalization boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LvRoadToll,
    LtRoadToll,
    Inspection,
    Insurance,
    RegistrationCertificate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LvRoadToll => "lv_road_toll",
            EventKind::LtRoadToll => "lt_road_toll",
            EventKind::Inspection => "inspection",
            EventKind::Insurance => "insurance",
            EventKind::RegistrationCertificate => "registration_certificate",
        }
    }

    /// Display label used in all outbound message text (fixed locale).
    pub fn label_lt(&self) -> &'static str {
        match self {
            EventKind::LvRoadToll => "LV kelių mokestis",
            EventKind::LtRoadToll => "LT kelių mokestis",
            EventKind::Inspection => "TA galiojimas",
            EventKind::Insurance => "CA draudimas",
            EventKind::RegistrationCertificate => "Registracijos liudijimas",
        }
    }

    /// Longer labels for the per-vehicle detail view.
    pub fn detail_label_lt(&self) -> &'static str {
        match self {
            EventKind::LvRoadToll => "LV kelių mokestis",
            EventKind::LtRoadToll => "LT kelių mokestis",
            EventKind::Inspection => "Techninė apžiūra",
            EventKind::Insurance => "Draudimas",
            EventKind::RegistrationCertificate => "Registracija",
        }
    }

    /// Registration certificates are document-only: they carry scans but no
    /// expiry semantics, so the window classifier never considers them.
    pub fn has_expiry_window(&self) -> bool {
        !matches!(self, EventKind::RegistrationCertificate)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document links attached to a row; the source carries at most two.
pub type DocRefs = SmallVec<[String; 2]>;

/// One normalized spreadsheet row. Ephemeral; produced per sync and consumed
/// by the reconciler, never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub plate: Plate,
    pub kind: EventKind,
    pub expiry: Option<NaiveDate>,
    pub observed_at: Option<NaiveDateTime>,
    pub doc_refs: DocRefs,
}

impl Observation {
    pub fn new(plate: Plate, kind: EventKind, expiry: Option<NaiveDate>) -> Self {
        Self { plate, kind, expiry, observed_at: None, doc_refs: DocRefs::new() }
    }

    pub fn with_observed_at(mut self, ts: NaiveDateTime) -> Self {
        self.observed_at = Some(ts);
        self
    }

    pub fn with_doc_refs(mut self, refs: DocRefs) -> Self {
        self.doc_refs = refs;
        self
    }
}

/// Current best-known state for one (plate, kind) pair.
///
/// Invariant: a reconciled set contains at most one record per (plate, kind).
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineRecord {
    pub plate: Plate,
    pub kind: EventKind,
    pub expiry: Option<NaiveDate>,
    pub observed_at: Option<NaiveDateTime>,
    pub doc_refs: DocRefs,
}

impl DeadlineRecord {
    /// Sort key used everywhere reconciled output must be deterministic.
    /// Kinds order by their code string so the ordering is stable across
    /// enum changes.
    pub fn sort_key(&self) -> (Option<NaiveDate>, &str, &'static str) {
        (self.expiry, self.plate.as_str(), self.kind.as_str())
    }
}
