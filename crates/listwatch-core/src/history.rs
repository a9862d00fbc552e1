//! The history document: every record ever observed plus cached run metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
  Result,
  record::{EntityRecord, Identity},
};

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Run counters and cached totals.
///
/// The totals are derived from the record set and recomputed on every
/// reconciliation; nothing reads them as a source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  /// When the last reconciliation finished.
  #[serde(default, deserialize_with = "lenient_timestamp")]
  pub last_updated:   Option<DateTime<Utc>>,
  /// How many reconciliations have run against this document.
  #[serde(default, alias = "total_scrapes")]
  pub total_runs:     u64,
  #[serde(default)]
  pub total_records:  usize,
  #[serde(default)]
  pub active_records: usize,
}

/// Accepts RFC 3339 timestamps and the zone-less ISO form written by the
/// earlier tracker (interpreted as UTC).
fn lenient_timestamp<'de, D>(
  deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let Some(raw) = Option::<String>::deserialize(deserializer)? else {
    return Ok(None);
  };
  if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
    return Ok(Some(dt.with_timezone(&Utc)));
  }
  raw
    .parse::<NaiveDateTime>()
    .map(|naive| Some(naive.and_utc()))
    .map_err(serde::de::Error::custom)
}

// ─── History ─────────────────────────────────────────────────────────────────

/// The complete persisted state: records keyed by identity, plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
  #[serde(default)]
  pub records:  BTreeMap<Identity, EntityRecord>,
  #[serde(default)]
  pub metadata: Metadata,
}

impl History {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, identity: &str) -> Option<&EntityRecord> {
    self.records.get(identity)
  }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn active_count(&self) -> usize {
    self.records.values().filter(|r| r.is_active()).count()
  }

  /// Recompute the cached totals from the record set.
  pub fn refresh_metadata(&mut self) {
    self.metadata.total_records = self.records.len();
    self.metadata.active_records = self.active_count();
  }

  /// Decode a history document. An empty input is an empty history.
  pub fn from_json(bytes: &[u8]) -> Result<Self> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(Self::default());
    }
    let mut history: Self = serde_json::from_slice(bytes)?;
    history.refresh_metadata();
    Ok(history)
  }

  /// Encode the whole document as pretty-printed JSON.
  pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(self)?)
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
