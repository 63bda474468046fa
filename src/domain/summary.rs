//! Report rendering
//!
//! All outbound message text is produced here, in the one fixed locale the
//! recipients use. Rendering is deterministic: every list is sorted before
//! formatting so repeated runs over the same records emit identical text.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::types::{DeadlineRecord, EventKind, Plate};
use crate::domain::window::WindowReport;

pub const NO_REMINDERS: &str = "Šiandien priminimų nėra.";
const UPCOMING_HEADER: &str = "Artėjantys (5 d., 1 d.):";
const EXPIRED_HEADER: &str = "Nebegalioja:";

fn sorted(records: &[DeadlineRecord]) -> Vec<&DeadlineRecord> {
    let mut out: Vec<&DeadlineRecord> = records.iter().collect();
    out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    out
}

/// Renders the daily summary. Empty report collapses to the fixed
/// no-reminders sentence; each section header appears only when its bucket
/// has entries.
pub fn render_summary(report: &WindowReport) -> String {
    if report.is_empty() {
        return NO_REMINDERS.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    if !report.upcoming.is_empty() {
        lines.push(UPCOMING_HEADER.to_string());
        for record in sorted(&report.upcoming) {
            let Some(expiry) = record.expiry else { continue };
            lines.push(format!("{} — {} — {}", record.plate, record.kind.label_lt(), expiry));
        }
        lines.push(String::new());
    }
    if !report.expired.is_empty() {
        lines.push(EXPIRED_HEADER.to_string());
        for record in sorted(&report.expired) {
            let Some(expiry) = record.expiry else { continue };
            lines.push(format!(
                "{} — {} — nebegalioja nuo {}",
                record.plate,
                record.kind.label_lt(),
                expiry
            ));
        }
    }
    lines.join("\n")
}

/// Renders the per-vehicle detail view used by the plate lookup command and
/// the plate callback buttons.
pub fn render_vehicle_detail(
    plate: &Plate,
    events: &[(EventKind, Option<NaiveDate>)],
    today: NaiveDate,
) -> String {
    let mut lines = vec![format!("{plate}:")];
    for (kind, expiry) in events {
        let status = match expiry {
            Some(date) if *date < today => "nebegalioja".to_string(),
            Some(date) => format!("galioja iki {date}"),
            None => "(duomenų nėra)".to_string(),
        };
        lines.push(format!("- {}: {}", kind.detail_label_lt(), status));
    }
    lines.join("\n")
}

/// Renders the admin-facing exclusion list shown after exclude/restore.
pub fn render_excluded_list(
    excluded: &[(Plate, Option<NaiveDateTime>, Option<String>)],
) -> String {
    if excluded.is_empty() {
        return "📋 No vehicles are currently excluded".to_string();
    }
    let mut lines = vec!["📋 Excluded vehicles:".to_string()];
    for (plate, excluded_at, excluded_by) in excluded {
        let by = excluded_by.as_deref().unwrap_or("unknown");
        match excluded_at {
            Some(ts) => {
                lines.push(format!("• {} (excluded {} by {})", plate, ts.date(), by))
            }
            None => lines.push(format!("• {plate} (excluded by {by})")),
        }
    }
    lines.join("\n")
}
