//! Entity records: the unit of tracked history.
//!
//! A record is keyed by an [`Identity`] derived from the entity's name. Its
//! attributes are free text and follow last-writer-wins; its dates and status
//! are owned by the reconciliation engine.

use std::{borrow::Borrow, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Error;

// ─── Identity ────────────────────────────────────────────────────────────────

/// The key under which an entity is tracked.
///
/// Two entities with the same identity string are indistinguishable. All
/// derivation goes through [`Identity::derive`], so changing the key (for
/// example to name + origin) is a change to that one function.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
  /// Derive the identity for a raw record. Returns `None` when the record
  /// carries no usable name.
  pub fn derive(raw: &RawRecord) -> Option<Self> {
    let name = raw.name.as_deref()?.trim();
    if name.is_empty() {
      return None;
    }
    Some(Self(name.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl Borrow<str> for Identity {
  fn borrow(&self) -> &str { &self.0 }
}

impl From<&str> for Identity {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for Identity {
  fn from(s: String) -> Self { Self(s) }
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// One of the free-text attribute slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeField {
  Origin,
  Charge,
  Location,
  ImageUrl,
  DetailUrl,
}

impl AttributeField {
  pub const ALL: [Self; 5] = [
    Self::Origin,
    Self::Charge,
    Self::Location,
    Self::ImageUrl,
    Self::DetailUrl,
  ];

  /// Whether a change in this field marks a record as updated.
  /// `DetailUrl` is refreshed on every observation but never reported as an
  /// update.
  pub fn is_tracked(self) -> bool { !matches!(self, Self::DetailUrl) }

  pub fn key(self) -> &'static str {
    match self {
      Self::Origin => "origin",
      Self::Charge => "charge",
      Self::Location => "location",
      Self::ImageUrl => "image_url",
      Self::DetailUrl => "detail_url",
    }
  }
}

/// The fixed set of free-text fields scraped for an entity.
///
/// The aliases accept documents written by the earlier tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
  #[serde(default, alias = "country", skip_serializing_if = "Option::is_none")]
  pub origin:     Option<String>,
  #[serde(
    default,
    alias = "convicted_of",
    skip_serializing_if = "Option::is_none"
  )]
  pub charge:     Option<String>,
  #[serde(
    default,
    alias = "arrested_location",
    skip_serializing_if = "Option::is_none"
  )]
  pub location:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url:  Option<String>,
  #[serde(
    default,
    alias = "press_release_url",
    skip_serializing_if = "Option::is_none"
  )]
  pub detail_url: Option<String>,
}

impl Attributes {
  pub fn get(&self, field: AttributeField) -> Option<&str> {
    match field {
      AttributeField::Origin => self.origin.as_deref(),
      AttributeField::Charge => self.charge.as_deref(),
      AttributeField::Location => self.location.as_deref(),
      AttributeField::ImageUrl => self.image_url.as_deref(),
      AttributeField::DetailUrl => self.detail_url.as_deref(),
    }
  }

  fn slot_mut(&mut self, field: AttributeField) -> &mut Option<String> {
    match field {
      AttributeField::Origin => &mut self.origin,
      AttributeField::Charge => &mut self.charge,
      AttributeField::Location => &mut self.location,
      AttributeField::ImageUrl => &mut self.image_url,
      AttributeField::DetailUrl => &mut self.detail_url,
    }
  }

  /// Fields present in `incoming` whose value differs from `self`.
  /// Fields absent from `incoming` are never reported.
  pub fn changed_fields(&self, incoming: &Attributes) -> Vec<AttributeField> {
    AttributeField::ALL
      .into_iter()
      .filter(|&f| {
        incoming
          .get(f)
          .is_some_and(|value| self.get(f) != Some(value))
      })
      .collect()
  }

  /// Copy every field present in `incoming` over `self`.
  pub fn overlay(&mut self, incoming: Attributes) {
    let mut incoming = incoming;
    for field in AttributeField::ALL {
      if let Some(value) = incoming.slot_mut(field).take() {
        *self.slot_mut(field) = Some(value);
      }
    }
  }
}

// ─── Raw record ──────────────────────────────────────────────────────────────

/// One entity as yielded by an extractor, before reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
  #[serde(default)]
  pub name:       Option<String>,
  #[serde(flatten)]
  pub attributes: Attributes,
}

impl RawRecord {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name:       Some(name.into()),
      attributes: Attributes::default(),
    }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Whether an entity is currently listed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
  #[default]
  Active,
  Removed,
}

impl RecordStatus {
  pub fn is_active(self) -> bool { matches!(self, Self::Active) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Removed => "removed",
    }
  }
}

impl fmt::Display for RecordStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RecordStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "active" => Ok(Self::Active),
      "removed" => Ok(Self::Removed),
      _ => Err(Error::UnknownStatus(s.to_owned())),
    }
  }
}

// ─── Entity record ───────────────────────────────────────────────────────────

/// The tracked history of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
  #[serde(rename = "name")]
  pub identity:          Identity,
  #[serde(flatten)]
  pub attributes:        Attributes,
  /// Date of the first crawl that observed this identity. Never changes.
  #[serde(alias = "first_seen_date")]
  pub first_seen:        NaiveDate,
  #[serde(alias = "last_seen_date")]
  pub last_seen:         NaiveDate,
  #[serde(default)]
  pub status:            RecordStatus,
  /// Date of the trusted crawl that first missed this identity. Cleared on
  /// re-activation.
  #[serde(
    default,
    alias = "removed_date",
    skip_serializing_if = "Option::is_none"
  )]
  pub removed_on:        Option<NaiveDate>,
  #[serde(default, alias = "scrape_count")]
  pub observation_count: u64,
}

impl EntityRecord {
  /// A record for an identity observed for the first time on `today`.
  pub fn first_observed(
    identity: Identity,
    attributes: Attributes,
    today: NaiveDate,
  ) -> Self {
    Self {
      identity,
      attributes,
      first_seen: today,
      last_seen: today,
      status: RecordStatus::Active,
      removed_on: None,
      observation_count: 1,
    }
  }

  pub fn is_active(&self) -> bool { self.status.is_active() }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
