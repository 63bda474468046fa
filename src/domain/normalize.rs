//! Row normalization
//!
//! Turns raw spreadsheet cells into typed [`Observation`]s. Rows that cannot
//! be normalized (unknown event label, blank plate) are dropped here so the
//! rest of the pipeline only ever sees the closed [`EventKind`] set.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::domain::types::{DocRefs, EventKind, Observation, Plate};

/// One row as read from the source sheet, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub plate: String,
    pub event_label: String,
    pub expiry: String,
    pub doc_primary: String,
    pub doc_secondary: String,
    pub timestamp: String,
}

/// Maps the exact sheet labels onto canonical kinds. Unknown labels return
/// `None`; matching is on the trimmed label, case preserved, because the form
/// emits these strings verbatim.
pub fn event_kind(raw_label: &str) -> Option<EventKind> {
    match raw_label.trim() {
        "LV Kelių mokestis" => Some(EventKind::LvRoadToll),
        "LT Kelių mokestis" => Some(EventKind::LtRoadToll),
        "TA galiojimas" => Some(EventKind::Inspection),
        "CA draudimas iki" => Some(EventKind::Insurance),
        "Registracijos liudijimas" => Some(EventKind::RegistrationCertificate),
        _ => None,
    }
}

/// Parses an expiry cell. The form writes US-style dates; both four- and
/// two-digit years occur in historical rows.
pub fn parse_expiry(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(cell, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(cell, "%m/%d/%y"))
        .ok()
}

/// Parses a submission timestamp cell.
pub fn parse_observed(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(cell, "%m/%d/%Y %H:%M:%S").ok()
}

/// Normalizes one raw row, or `None` when the row carries no usable signal.
pub fn normalize_row(row: &RawRow) -> Option<Observation> {
    let plate = row.plate.trim();
    if plate.is_empty() {
        return None;
    }
    let Some(kind) = event_kind(&row.event_label) else {
        debug!(label = %row.event_label.trim(), "row_label_unmapped");
        return None;
    };

    let mut doc_refs = DocRefs::new();
    for cell in [&row.doc_primary, &row.doc_secondary] {
        let cell = cell.trim();
        if !cell.is_empty() {
            doc_refs.push(cell.to_string());
        }
    }

    Some(Observation {
        plate: Plate::new(plate),
        kind,
        expiry: parse_expiry(&row.expiry),
        observed_at: parse_observed(&row.timestamp),
        doc_refs,
    })
}

/// Normalizes a batch, silently dropping unusable rows.
pub fn normalize_rows(rows: &[RawRow]) -> Vec<Observation> {
    rows.iter().filter_map(normalize_row).collect()
}
