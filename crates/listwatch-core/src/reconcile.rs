//! Snapshot reconciliation: candidate snapshot + history → next history.
//!
//! A reconciliation run folds the raw snapshot into one entry per identity,
//! merges those entries into the history (creating, updating, or
//! re-activating records), and, only when the snapshot is trusted as
//! complete, marks every active record that the snapshot no longer lists as
//! removed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  history::History,
  record::{Attributes, EntityRecord, Identity, RawRecord, RecordStatus},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Default floor below which a crawl is not trusted to drive removals.
pub const DEFAULT_MIN_EXPECTED_RECORDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
  /// A snapshot with fewer identified records than this is incomplete.
  pub min_expected_records: usize,
}

impl Default for ReconcileOptions {
  fn default() -> Self {
    Self {
      min_expected_records: DEFAULT_MIN_EXPECTED_RECORDS,
    }
  }
}

// ─── Completeness ────────────────────────────────────────────────────────────

/// Whether a snapshot of `scraped` records is too small to drive removals.
/// An empty snapshot is never trusted.
pub fn is_incomplete(scraped: usize, min_expected_records: usize) -> bool {
  scraped == 0 || scraped < min_expected_records
}

/// Whether an incomplete snapshot is so much smaller than the active set that
/// it is worth warning about. Advisory only; suppression is decided by
/// [`is_incomplete`] alone.
pub fn disparity_warning(
  active_before: usize,
  scraped: usize,
  min_expected_records: usize,
) -> bool {
  is_incomplete(scraped, min_expected_records)
    && active_before > scraped.saturating_mul(2)
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// What a reconciliation run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
  /// Identities seen for the first time, in snapshot order.
  pub new:                 Vec<Identity>,
  /// Existing identities whose tracked attributes changed or that were
  /// re-activated.
  pub updated:             Vec<Identity>,
  /// Existing identities where only an untracked attribute (the detail-page
  /// reference) changed. The new value is persisted but the record is not
  /// counted as updated.
  pub untracked_refreshed: Vec<Identity>,
  /// Identities transitioned to `removed` by this run.
  pub removed:             Vec<Identity>,
  /// Existing identities observed again (updated or not).
  pub still_present:       usize,
  /// Identified records in the snapshot, duplicates included.
  pub total_in_snapshot:   usize,
  /// Raw records dropped for lacking an identity.
  pub dropped_malformed:   usize,
  pub active_before:       usize,
  /// The snapshot was too small to drive removals; the removal pass was
  /// skipped.
  pub incomplete:          bool,
  pub disparity_warning:   bool,
}

impl ChangeReport {
  pub fn removal_pass_ran(&self) -> bool { !self.incomplete }
}

// ─── Snapshot folding ────────────────────────────────────────────────────────

/// A snapshot reduced to one attribute set per identity.
struct FoldedSnapshot {
  /// Unique identities in first-occurrence order, with merged attributes.
  entries: Vec<(Identity, Attributes)>,
  scraped: usize,
  dropped: usize,
}

/// Drop unidentifiable records and merge duplicates. Later occurrences
/// override earlier ones field by field.
fn fold_snapshot(snapshot: Vec<RawRecord>) -> FoldedSnapshot {
  let mut entries: Vec<(Identity, Attributes)> = Vec::new();
  let mut index: HashMap<Identity, usize> = HashMap::new();
  let mut scraped = 0;
  let mut dropped = 0;

  for raw in snapshot {
    let Some(identity) = Identity::derive(&raw) else {
      dropped += 1;
      continue;
    };
    scraped += 1;
    match index.get(&identity) {
      Some(&i) => entries[i].1.overlay(raw.attributes),
      None => {
        index.insert(identity.clone(), entries.len());
        entries.push((identity, raw.attributes));
      }
    }
  }

  FoldedSnapshot {
    entries,
    scraped,
    dropped,
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Merge `snapshot` into `history` as observed on `today`.
///
/// `now` stamps the metadata's `last_updated`. The history is mutated in
/// place; persisting it is the caller's job.
pub fn reconcile(
  history: &mut History,
  snapshot: Vec<RawRecord>,
  options: &ReconcileOptions,
  today: NaiveDate,
  now: DateTime<Utc>,
) -> ChangeReport {
  let folded = fold_snapshot(snapshot);
  let active_before = history.active_count();

  let mut report = ChangeReport {
    total_in_snapshot: folded.scraped,
    dropped_malformed: folded.dropped,
    active_before,
    incomplete: is_incomplete(folded.scraped, options.min_expected_records),
    disparity_warning: disparity_warning(
      active_before,
      folded.scraped,
      options.min_expected_records,
    ),
    ..ChangeReport::default()
  };

  if report.dropped_malformed > 0 {
    debug!(
      dropped = report.dropped_malformed,
      "dropped raw records without an identity"
    );
  }
  if report.disparity_warning {
    warn!(
      scraped = folded.scraped,
      active = active_before,
      "snapshot is far smaller than the active set; it looks incomplete"
    );
  }

  // ── Merge ───────────────────────────────────────────────────────────────
  let mut seen: HashSet<Identity> = HashSet::with_capacity(folded.entries.len());
  for (identity, attributes) in folded.entries {
    seen.insert(identity.clone());
    merge_one(history, identity, attributes, today, &mut report);
  }

  // ── Removal pass ────────────────────────────────────────────────────────
  if report.incomplete {
    warn!(
      scraped = folded.scraped,
      min_expected = options.min_expected_records,
      "snapshot below the completeness threshold; skipping removals"
    );
  } else {
    for (identity, record) in history.records.iter_mut() {
      if record.is_active() && !seen.contains(identity) {
        record.status = RecordStatus::Removed;
        record.removed_on = Some(today);
        debug!(%identity, "removed");
        report.removed.push(identity.clone());
      }
    }
  }

  // ── Metadata ────────────────────────────────────────────────────────────
  history.refresh_metadata();
  history.metadata.last_updated = Some(now);
  history.metadata.total_runs += 1;

  info!(
    new = report.new.len(),
    updated = report.updated.len(),
    removed = report.removed.len(),
    still_present = report.still_present,
    total_in_snapshot = report.total_in_snapshot,
    "reconciliation finished"
  );

  report
}

fn merge_one(
  history: &mut History,
  identity: Identity,
  attributes: Attributes,
  today: NaiveDate,
  report: &mut ChangeReport,
) {
  let Some(record) = history.records.get_mut(&identity) else {
    debug!(%identity, "new");
    report.new.push(identity.clone());
    history.records.insert(
      identity.clone(),
      EntityRecord::first_observed(identity, attributes, today),
    );
    return;
  };

  let changed = record.attributes.changed_fields(&attributes);
  let tracked_changed = changed.iter().any(|f| f.is_tracked());
  let untracked_changed = changed.iter().any(|f| !f.is_tracked());
  let reactivated = record.status == RecordStatus::Removed;

  record.attributes.overlay(attributes);
  record.last_seen = record.last_seen.max(today);
  record.observation_count += 1;
  if reactivated {
    record.status = RecordStatus::Active;
    record.removed_on = None;
    debug!(%identity, "re-activated");
  }

  if tracked_changed || reactivated {
    report.updated.push(identity);
  } else if untracked_changed {
    report.untracked_refreshed.push(identity);
  }
  report.still_present += 1;
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 6, d).unwrap() }

  fn at(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, d, 12, 0, 0).unwrap()
  }

  fn opts(min: usize) -> ReconcileOptions {
    ReconcileOptions {
      min_expected_records: min,
    }
  }

  fn raw(name: &str) -> RawRecord { RawRecord::named(name) }

  fn raw_with_charge(name: &str, charge: &str) -> RawRecord {
    let mut r = raw(name);
    r.attributes.charge = Some(charge.into());
    r
  }

  fn names(n: usize) -> Vec<RawRecord> {
    (0..n).map(|i| raw(&format!("Person {i}"))).collect()
  }

  fn status(h: &History, name: &str) -> RecordStatus { h.get(name).unwrap().status }

  #[test]
  fn creates_new_records() {
    let mut h = History::new();
    let report =
      reconcile(&mut h, vec![raw("A"), raw("B")], &opts(1), day(1), at(1));

    assert_eq!(report.new, vec![Identity::from("A"), Identity::from("B")]);
    let a = h.get("A").unwrap();
    assert_eq!(a.first_seen, day(1));
    assert_eq!(a.last_seen, day(1));
    assert_eq!(a.status, RecordStatus::Active);
    assert_eq!(a.observation_count, 1);
    assert_eq!(h.metadata.total_runs, 1);
    assert_eq!(h.metadata.active_records, 2);
    assert_eq!(h.metadata.last_updated, Some(at(1)));
  }

  #[test]
  fn same_day_rerun_is_idempotent() {
    let mut h = History::new();
    let snapshot = vec![raw("A"), raw("B"), raw("C")];
    reconcile(&mut h, snapshot.clone(), &opts(3), day(1), at(1));
    let before = h.clone();

    let report = reconcile(&mut h, snapshot, &opts(3), day(1), at(1));
    assert!(report.new.is_empty());
    assert!(report.removed.is_empty());
    assert!(report.updated.is_empty());
    assert_eq!(report.still_present, 3);

    for (id, rec) in &h.records {
      let old = &before.records[id];
      assert_eq!(rec.first_seen, old.first_seen);
      assert_eq!(rec.status, old.status);
      assert_eq!(rec.removed_on, old.removed_on);
      assert_eq!(rec.observation_count, old.observation_count + 1);
    }
    assert_eq!(h.metadata.total_runs, 2);
  }

  #[test]
  fn partial_crawl_never_removes() {
    let mut h = History::new();
    reconcile(&mut h, names(100), &opts(100), day(1), at(1));
    assert_eq!(h.active_count(), 100);

    let report = reconcile(&mut h, names(10), &opts(100), day(2), at(2));
    assert!(report.incomplete);
    assert!(report.disparity_warning);
    assert!(report.removed.is_empty());
    assert_eq!(h.active_count(), 100);
  }

  #[test]
  fn incomplete_without_disparity_still_skips_removals() {
    let mut h = History::new();
    reconcile(&mut h, names(4), &opts(1), day(1), at(1));

    // 3 scraped, 4 active: incomplete against 5, but 4 <= 2 * 3.
    let report = reconcile(&mut h, names(3), &opts(5), day(2), at(2));
    assert!(report.incomplete);
    assert!(!report.disparity_warning);
    assert!(report.removed.is_empty());
    assert_eq!(h.active_count(), 4);
  }

  #[test]
  fn complete_crawl_removes_missing() {
    let mut h = History::new();
    reconcile(&mut h, vec![raw("A"), raw("B"), raw("C")], &opts(1), day(1), at(1));

    let mut more = vec![raw("A"), raw("B")];
    more.extend(names(3));
    let report = reconcile(&mut h, more, &opts(5), day(2), at(2));

    assert!(!report.incomplete);
    assert_eq!(report.removed, vec![Identity::from("C")]);
    let c = h.get("C").unwrap();
    assert_eq!(c.status, RecordStatus::Removed);
    assert_eq!(c.removed_on, Some(day(2)));
    assert_eq!(c.last_seen, day(1));
    for name in ["A", "B"] {
      let r = h.get(name).unwrap();
      assert_eq!(r.status, RecordStatus::Active);
      assert_eq!(r.last_seen, day(2));
    }
  }

  #[test]
  fn reappearing_record_is_reactivated_as_update() {
    let mut h = History::new();
    reconcile(&mut h, vec![raw("A"), raw("B"), raw("C")], &opts(2), day(1), at(1));
    reconcile(&mut h, vec![raw("A"), raw("B")], &opts(2), day(2), at(2));
    assert_eq!(status(&h, "C"), RecordStatus::Removed);

    let report =
      reconcile(&mut h, vec![raw("A"), raw("B"), raw("C")], &opts(2), day(5), at(5));
    assert_eq!(report.updated, vec![Identity::from("C")]);
    assert!(report.new.is_empty());

    let c = h.get("C").unwrap();
    assert_eq!(c.status, RecordStatus::Active);
    assert_eq!(c.first_seen, day(1));
    assert_eq!(c.last_seen, day(5));
    assert_eq!(c.removed_on, None);
    assert_eq!(c.observation_count, 2);
  }

  #[test]
  fn first_seen_survives_cycles() {
    let mut h = History::new();
    let full = vec![raw("A"), raw("B")];
    let partial = vec![raw("B")];
    for d in 1..=6 {
      let snap = if d % 2 == 0 { partial.clone() } else { full.clone() };
      reconcile(&mut h, snap, &opts(1), day(d), at(d));
      assert_eq!(h.get("A").unwrap().first_seen, day(1));
      assert_eq!(h.get("B").unwrap().first_seen, day(1));
    }
    assert_eq!(status(&h, "A"), RecordStatus::Removed);
  }

  #[test]
  fn tracked_change_is_reported() {
    let mut h = History::new();
    reconcile(&mut h, vec![raw_with_charge("A", "theft")], &opts(1), day(1), at(1));

    let report =
      reconcile(&mut h, vec![raw_with_charge("A", "burglary")], &opts(1), day(2), at(2));
    assert_eq!(report.updated, vec![Identity::from("A")]);
    assert_eq!(h.get("A").unwrap().attributes.charge.as_deref(), Some("burglary"));

    let report =
      reconcile(&mut h, vec![raw_with_charge("A", "burglary")], &opts(1), day(3), at(3));
    assert!(report.updated.is_empty());
    assert_eq!(report.still_present, 1);
  }

  #[test]
  fn absent_incoming_field_is_not_a_change() {
    let mut h = History::new();
    reconcile(&mut h, vec![raw_with_charge("A", "theft")], &opts(1), day(1), at(1));

    let report = reconcile(&mut h, vec![raw("A")], &opts(1), day(2), at(2));
    assert!(report.updated.is_empty());
    assert_eq!(h.get("A").unwrap().attributes.charge.as_deref(), Some("theft"));
  }

  #[test]
  fn detail_url_change_is_applied_but_not_an_update() {
    let mut h = History::new();
    let mut first = raw("A");
    first.attributes.detail_url = Some("https://example.gov/1".into());
    reconcile(&mut h, vec![first], &opts(1), day(1), at(1));

    let mut second = raw("A");
    second.attributes.detail_url = Some("https://example.gov/2".into());
    let report = reconcile(&mut h, vec![second], &opts(1), day(2), at(2));

    assert!(report.updated.is_empty());
    assert_eq!(report.untracked_refreshed, vec![Identity::from("A")]);
    assert_eq!(
      h.get("A").unwrap().attributes.detail_url.as_deref(),
      Some("https://example.gov/2")
    );
  }

  #[test]
  fn duplicates_fold_with_last_occurrence_winning() {
    let mut h = History::new();
    let mut second = raw_with_charge("A", "burglary");
    second.attributes.origin = Some("PERU".into());
    let mut first = raw_with_charge("A", "theft");
    first.attributes.location = Some("Reno, NV".into());

    let report = reconcile(&mut h, vec![first, second], &opts(1), day(1), at(1));
    assert_eq!(report.new.len(), 1);
    assert_eq!(report.total_in_snapshot, 2);

    let a = h.get("A").unwrap();
    assert_eq!(a.observation_count, 1);
    assert_eq!(a.attributes.charge.as_deref(), Some("burglary"));
    assert_eq!(a.attributes.origin.as_deref(), Some("PERU"));
    assert_eq!(a.attributes.location.as_deref(), Some("Reno, NV"));
  }

  #[test]
  fn empty_snapshot_never_removes() {
    let mut h = History::new();
    reconcile(&mut h, names(5), &opts(1), day(1), at(1));

    for min in [0, 1, 100] {
      let report = reconcile(&mut h, Vec::new(), &opts(min), day(2), at(2));
      assert!(report.incomplete);
      assert!(report.removed.is_empty());
    }
    assert_eq!(h.active_count(), 5);
    assert_eq!(h.metadata.total_runs, 4);
  }

  #[test]
  fn malformed_records_do_not_count_toward_completeness() {
    let mut h = History::new();
    reconcile(&mut h, vec![raw("A"), raw("B"), raw("C")], &opts(1), day(1), at(1));

    let mut snap = vec![raw("A"), raw("B")];
    snap.push(RawRecord::default());
    snap.push(raw("   "));
    let report = reconcile(&mut h, snap, &opts(2), day(2), at(2));

    assert_eq!(report.dropped_malformed, 2);
    assert_eq!(report.total_in_snapshot, 2);
    assert!(!report.incomplete);
    assert_eq!(report.removed, vec![Identity::from("C")]);
  }

  #[test]
  fn malformed_noise_cannot_make_a_small_crawl_look_complete() {
    let mut h = History::new();
    reconcile(&mut h, names(5), &opts(1), day(1), at(1));

    let mut snap = vec![raw("Person 0")];
    snap.extend((0..10).map(|_| RawRecord::default()));
    let report = reconcile(&mut h, snap, &opts(5), day(2), at(2));
    assert!(report.incomplete);
    assert!(report.removed.is_empty());
  }

  #[test]
  fn last_seen_never_moves_backwards() {
    let mut h = History::new();
    reconcile(&mut h, vec![raw("A")], &opts(1), day(10), at(10));
    reconcile(&mut h, vec![raw("A")], &opts(1), day(9), at(9));
    assert_eq!(h.get("A").unwrap().last_seen, day(10));
  }

  #[test]
  fn completeness_predicates_are_independent() {
    assert!(is_incomplete(10, 100));
    assert!(!is_incomplete(100, 100));
    assert!(is_incomplete(0, 0));
    assert!(disparity_warning(100, 10, 100));
    assert!(!disparity_warning(20, 10, 100));
    assert!(!disparity_warning(1_000, 200, 100));
  }
}
