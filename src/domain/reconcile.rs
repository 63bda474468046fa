//! Observation reconciliation
//!
//! The source sheet is append-only: renewing a deadline adds a new row, it
//! never edits the old one. Reconciliation folds all observations down to
//! one winning record per (plate, kind) pair.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::domain::types::{DeadlineRecord, EventKind, Observation, Plate};

/// Decides whether `candidate` displaces `winner` for the same (plate, kind).
///
/// A later expiry always wins; a missing expiry sorts below every real date.
/// On equal expiry the more recently submitted row wins, and a row without a
/// submission timestamp never displaces one that has it.
fn displaces(candidate: &Observation, winner: &Observation) -> bool {
    let cand_date = candidate.expiry.unwrap_or(NaiveDate::MIN);
    let win_date = winner.expiry.unwrap_or(NaiveDate::MIN);
    if cand_date > win_date {
        return true;
    }
    if candidate.expiry == winner.expiry {
        if let Some(cand_ts) = candidate.observed_at {
            return match winner.observed_at {
                Some(win_ts) => cand_ts > win_ts,
                None => true,
            };
        }
    }
    false
}

/// Folds observations into at most one record per (plate, kind).
///
/// Output is sorted by (expiry, plate, kind) so repeated runs over the same
/// rows, in any order, produce identical results.
pub fn reconcile(observations: Vec<Observation>) -> Vec<DeadlineRecord> {
    let mut winners: FxHashMap<(Plate, EventKind), Observation> = FxHashMap::default();
    for obs in observations {
        let key = (obs.plate.clone(), obs.kind);
        match winners.get(&key) {
            Some(current) if !displaces(&obs, current) => {}
            _ => {
                winners.insert(key, obs);
            }
        }
    }

    let mut records: Vec<DeadlineRecord> = winners
        .into_values()
        .map(|obs| DeadlineRecord {
            plate: obs.plate,
            kind: obs.kind,
            expiry: obs.expiry,
            observed_at: obs.observed_at,
            doc_refs: obs.doc_refs,
        })
        .collect();
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use smallvec::smallvec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    fn obs(plate: &str, kind: EventKind, expiry: Option<NaiveDate>) -> Observation {
        Observation::new(Plate::new(plate), kind, expiry)
    }

    #[test]
    fn test_later_expiry_wins() {
        let records = reconcile(vec![
            obs("AB123", EventKind::Insurance, Some(date(2025, 6, 1))),
            obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1))),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].expiry, Some(date(2026, 6, 1)));
    }

    #[test]
    fn test_order_independence() {
        let a = obs("AB123", EventKind::Insurance, Some(date(2025, 6, 1)));
        let b = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)));
        let c = obs("CD456", EventKind::Inspection, Some(date(2025, 9, 1)));
        let fwd = reconcile(vec![a.clone(), b.clone(), c.clone()]);
        let rev = reconcile(vec![c, b, a]);
        assert_eq!(fwd, rev);
    }

    #[test]
    fn test_dated_beats_dateless() {
        let records = reconcile(vec![
            obs("AB123", EventKind::Inspection, Some(date(2025, 2, 1))),
            obs("AB123", EventKind::Inspection, None),
        ]);
        assert_eq!(records[0].expiry, Some(date(2025, 2, 1)));

        let records = reconcile(vec![
            obs("AB123", EventKind::Inspection, None),
            obs("AB123", EventKind::Inspection, Some(date(2025, 2, 1))),
        ]);
        assert_eq!(records[0].expiry, Some(date(2025, 2, 1)));
    }

    #[test]
    fn test_equal_expiry_newer_submission_wins() {
        let old = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)))
            .with_observed_at(ts(2025, 5, 1, 9))
            .with_doc_refs(smallvec!["old-doc".to_string()]);
        let new = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)))
            .with_observed_at(ts(2025, 5, 2, 9))
            .with_doc_refs(smallvec!["new-doc".to_string()]);
        let records = reconcile(vec![old.clone(), new.clone()]);
        assert_eq!(records[0].doc_refs.as_slice(), ["new-doc".to_string()]);

        let records = reconcile(vec![new, old]);
        assert_eq!(records[0].doc_refs.as_slice(), ["new-doc".to_string()]);
    }

    #[test]
    fn test_equal_expiry_timestamped_beats_untimestamped() {
        let plain = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)));
        let stamped = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)))
            .with_observed_at(ts(2025, 5, 1, 9));
        let records = reconcile(vec![plain.clone(), stamped.clone()]);
        assert!(records[0].observed_at.is_some());

        // An untimestamped row never displaces a timestamped one.
        let records = reconcile(vec![stamped, plain]);
        assert!(records[0].observed_at.is_some());
    }

    #[test]
    fn test_both_dateless_keeps_first_without_timestamps() {
        let first = obs("AB123", EventKind::RegistrationCertificate, None)
            .with_doc_refs(smallvec!["doc-a".to_string()]);
        let second = obs("AB123", EventKind::RegistrationCertificate, None)
            .with_doc_refs(smallvec!["doc-b".to_string()]);
        let records = reconcile(vec![first, second]);
        assert_eq!(records[0].doc_refs.as_slice(), ["doc-a".to_string()]);
    }

    #[test]
    fn test_exact_tie_keeps_first_seen_docs() {
        let first = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)))
            .with_observed_at(ts(2025, 5, 1, 9))
            .with_doc_refs(smallvec!["doc-a".to_string()]);
        let second = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)))
            .with_observed_at(ts(2025, 5, 1, 9))
            .with_doc_refs(smallvec!["doc-b".to_string()]);
        let records = reconcile(vec![first, second]);
        assert_eq!(records[0].doc_refs.as_slice(), ["doc-a".to_string()]);
    }

    #[test]
    fn test_distinct_kinds_kept_separately() {
        let records = reconcile(vec![
            obs("AB123", EventKind::Insurance, Some(date(2025, 6, 1))),
            obs("AB123", EventKind::Inspection, Some(date(2025, 7, 1))),
            obs("CD456", EventKind::Insurance, Some(date(2025, 8, 1))),
        ]);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_output_sorted() {
        let records = reconcile(vec![
            obs("ZZ999", EventKind::Insurance, Some(date(2026, 1, 1))),
            obs("AA111", EventKind::Insurance, Some(date(2025, 1, 1))),
            obs("MM555", EventKind::Inspection, None),
        ]);
        assert_eq!(records[0].expiry, None);
        assert_eq!(records[1].plate.as_str(), "AA111");
        assert_eq!(records[2].plate.as_str(), "ZZ999");
    }

    #[test]
    fn test_docs_follow_winner() {
        let loser = obs("AB123", EventKind::Insurance, Some(date(2025, 6, 1)))
            .with_doc_refs(smallvec!["stale".to_string()]);
        let winner = obs("AB123", EventKind::Insurance, Some(date(2026, 6, 1)))
            .with_doc_refs(smallvec!["fresh".to_string()]);
        let records = reconcile(vec![loser, winner]);
        assert_eq!(records[0].doc_refs.as_slice(), ["fresh".to_string()]);
    }
}
