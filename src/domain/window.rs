//! Reminder window classification

use chrono::NaiveDate;

use crate::domain::types::DeadlineRecord;

/// Days-until-expiry values that trigger an advance reminder.
pub const REMINDER_OFFSETS: [i64; 2] = [5, 1];

/// Records that warrant a mention today, split by urgency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowReport {
    pub upcoming: Vec<DeadlineRecord>,
    pub expired: Vec<DeadlineRecord>,
}

impl WindowReport {
    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty() && self.expired.is_empty()
    }
}

/// Buckets records by how far their expiry sits from `today`.
///
/// Only exact hits on the reminder offsets make the upcoming bucket; a
/// deadline four days out stays silent until the five-day mark has passed
/// and the one-day mark arrives. Anything already past expiry is reported
/// every day until the sheet gets a newer row.
pub fn classify(today: NaiveDate, records: &[DeadlineRecord]) -> WindowReport {
    let mut report = WindowReport::default();
    for record in records {
        if !record.kind.has_expiry_window() {
            continue;
        }
        let Some(expiry) = record.expiry else {
            continue;
        };
        let delta = (expiry - today).num_days();
        if REMINDER_OFFSETS.contains(&delta) {
            report.upcoming.push(record.clone());
        } else if delta < 0 {
            report.expired.push(record.clone());
        }
    }
    report
}
