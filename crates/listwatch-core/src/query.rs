//! Read-side queries over a [`History`]: filtering and summary statistics.
//!
//! Everything here is read-only. `status` is the only authority on whether
//! an entity is currently listed.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  history::History,
  record::{EntityRecord, RecordStatus},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`History::search`]. Every set filter must match.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
  /// Case-insensitive substring of the identity.
  pub name:            Option<String>,
  pub status:          Option<RecordStatus>,
  /// Case-insensitive exact origin.
  pub origin:          Option<String>,
  /// State name or postal abbreviation, compared after normalisation.
  pub state:           Option<String>,
  /// Inclusive lower bound on `first_seen`.
  pub first_seen_from: Option<NaiveDate>,
  /// Inclusive upper bound on `first_seen`.
  pub first_seen_to:   Option<NaiveDate>,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

impl RecordQuery {
  pub fn matches(&self, record: &EntityRecord) -> bool {
    if let Some(name) = &self.name
      && !record
        .identity
        .as_str()
        .to_lowercase()
        .contains(&name.to_lowercase())
    {
      return false;
    }
    if let Some(status) = self.status
      && record.status != status
    {
      return false;
    }
    if let Some(origin) = &self.origin
      && !record
        .attributes
        .origin
        .as_deref()
        .is_some_and(|o| o.eq_ignore_ascii_case(origin.trim()))
    {
      return false;
    }
    if let Some(state) = &self.state {
      let wanted = normalize_state(state);
      let actual = record.attributes.location.as_deref().and_then(state_of);
      if actual.as_deref() != Some(wanted.as_str()) {
        return false;
      }
    }
    if self.first_seen_from.is_some_and(|from| record.first_seen < from) {
      return false;
    }
    if self.first_seen_to.is_some_and(|to| record.first_seen > to) {
      return false;
    }
    true
  }
}

// ─── Statistics ──────────────────────────────────────────────────────────────

const TOP_N: usize = 10;

/// A label and how many active records carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
  pub label: String,
  pub count: usize,
}

/// Summary of a history, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
  pub total_records:         usize,
  pub active_records:        usize,
  pub removed_records:       usize,
  /// Origins of active records, most common first.
  pub top_origins:           Vec<Tally>,
  /// States parsed from active records' locations, most common first.
  pub top_states:            Vec<Tally>,
  pub top_charge_categories: Vec<Tally>,
  pub last_updated:          Option<DateTime<Utc>>,
  pub total_runs:            u64,
}

impl History {
  /// Records matching `query`, ordered by identity.
  pub fn search(&self, query: &RecordQuery) -> Vec<&EntityRecord> {
    self
      .records
      .values()
      .filter(|r| query.matches(r))
      .skip(query.offset.unwrap_or(0))
      .take(query.limit.unwrap_or(usize::MAX))
      .collect()
  }

  pub fn statistics(&self) -> Statistics {
    let active: Vec<&EntityRecord> =
      self.records.values().filter(|r| r.is_active()).collect();

    let top_origins = tally(active.iter().map(|r| {
      Some(
        r.attributes
          .origin
          .clone()
          .unwrap_or_else(|| "Unknown".to_owned()),
      )
    }));
    let top_states = tally(
      active
        .iter()
        .map(|r| r.attributes.location.as_deref().and_then(state_of)),
    );
    let top_charge_categories = tally(active.iter().map(|r| {
      let charge = r.attributes.charge.as_deref().unwrap_or("");
      ChargeCategory::classify(charge).map(|c| c.to_string())
    }));

    Statistics {
      total_records: self.records.len(),
      active_records: active.len(),
      removed_records: self.records.len() - active.len(),
      top_origins,
      top_states,
      top_charge_categories,
      last_updated: self.metadata.last_updated,
      total_runs: self.metadata.total_runs,
    }
  }
}

/// Count labels, most common first, ties broken alphabetically.
fn tally(labels: impl Iterator<Item = Option<String>>) -> Vec<Tally> {
  let mut counts: HashMap<String, usize> = HashMap::new();
  for label in labels.flatten() {
    *counts.entry(label).or_default() += 1;
  }
  let mut out: Vec<Tally> = counts
    .into_iter()
    .map(|(label, count)| Tally { label, count })
    .collect();
  out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
  out.truncate(TOP_N);
  out
}

// ─── States ──────────────────────────────────────────────────────────────────

const STATES: &[(&str, &str)] = &[
  ("AL", "Alabama"),
  ("AK", "Alaska"),
  ("AZ", "Arizona"),
  ("AR", "Arkansas"),
  ("CA", "California"),
  ("CO", "Colorado"),
  ("CT", "Connecticut"),
  ("DE", "Delaware"),
  ("FL", "Florida"),
  ("GA", "Georgia"),
  ("HI", "Hawaii"),
  ("ID", "Idaho"),
  ("IL", "Illinois"),
  ("IN", "Indiana"),
  ("IA", "Iowa"),
  ("KS", "Kansas"),
  ("KY", "Kentucky"),
  ("LA", "Louisiana"),
  ("ME", "Maine"),
  ("MD", "Maryland"),
  ("MA", "Massachusetts"),
  ("MI", "Michigan"),
  ("MN", "Minnesota"),
  ("MS", "Mississippi"),
  ("MO", "Missouri"),
  ("MT", "Montana"),
  ("NE", "Nebraska"),
  ("NV", "Nevada"),
  ("NH", "New Hampshire"),
  ("NJ", "New Jersey"),
  ("NM", "New Mexico"),
  ("NY", "New York"),
  ("NC", "North Carolina"),
  ("ND", "North Dakota"),
  ("OH", "Ohio"),
  ("OK", "Oklahoma"),
  ("OR", "Oregon"),
  ("PA", "Pennsylvania"),
  ("RI", "Rhode Island"),
  ("SC", "South Carolina"),
  ("SD", "South Dakota"),
  ("TN", "Tennessee"),
  ("TX", "Texas"),
  ("UT", "Utah"),
  ("VT", "Vermont"),
  ("VA", "Virginia"),
  ("WA", "Washington"),
  ("WV", "West Virginia"),
  ("WI", "Wisconsin"),
  ("WY", "Wyoming"),
  ("DC", "District of Columbia"),
];

/// Map a postal abbreviation or state name to the canonical state name.
fn canonical_state(s: &str) -> Option<&'static str> {
  let s = s.trim();
  STATES
    .iter()
    .find(|(abbr, name)| abbr.eq_ignore_ascii_case(s) || name.eq_ignore_ascii_case(s))
    .map(|(_, name)| *name)
}

/// Normalise a user-supplied state filter; unknown values pass through
/// trimmed.
fn normalize_state(s: &str) -> String {
  canonical_state(s).map_or_else(|| s.trim().to_owned(), str::to_owned)
}

/// The state of a `"City, State"` location.
///
/// The part after the last comma is canonicalised when it is a known state
/// and returned as written otherwise. A location without a comma only yields
/// a state if the whole string is one.
pub fn state_of(location: &str) -> Option<String> {
  match location.rsplit_once(',') {
    Some((_, tail)) => {
      let tail = tail.trim();
      if tail.is_empty() {
        return None;
      }
      Some(canonical_state(tail).map_or_else(|| tail.to_owned(), str::to_owned))
    }
    None => canonical_state(location).map(str::to_owned),
  }
}

// ─── Charge categories ───────────────────────────────────────────────────────

/// A coarse bucket for free-text charge descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeCategory {
  DrugTrafficking,
  SexualAssault,
  Murder,
  Assault,
  Dui,
  Theft,
  Other,
}

impl ChargeCategory {
  /// Checked in order; the first category with a matching keyword wins.
  const KEYWORDS: &'static [(Self, &'static [&'static str])] = &[
    (Self::DrugTrafficking, &[
      "drug",
      "narcotic",
      "trafficking",
      "cocaine",
      "heroin",
      "meth",
    ]),
    (Self::SexualAssault, &["sex", "rape", "sexual", "assault", "child", "abuse"]),
    (Self::Murder, &["murder", "homicide", "manslaughter", "kill"]),
    (Self::Assault, &["assault", "battery"]),
    (Self::Dui, &["dui", "dwi", "driving", "influence"]),
    (Self::Theft, &["theft", "burglary", "robbery", "larceny"]),
  ];

  /// Bucket a charge description. Blank text has no category.
  pub fn classify(charge: &str) -> Option<Self> {
    let text = charge.trim().to_lowercase();
    if text.is_empty() {
      return None;
    }
    let category = Self::KEYWORDS
      .iter()
      .find(|(_, words)| words.iter().any(|w| text.contains(w)))
      .map_or(Self::Other, |(c, _)| *c);
    Some(category)
  }
}

impl fmt::Display for ChargeCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::DrugTrafficking => "Drug Trafficking",
      Self::SexualAssault => "Sexual Assault",
      Self::Murder => "Murder",
      Self::Assault => "Assault",
      Self::Dui => "DUI",
      Self::Theft => "Theft",
      Self::Other => "Other",
    })
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
