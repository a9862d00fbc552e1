//! Handlers for `/records` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/records` | Filters: `name`, `status`, `origin`, `state`, `first_seen_from`, `first_seen_to`, `limit`, `offset` |
//! | `GET`  | `/records/{identity}` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use listwatch_core::{
  query::RecordQuery,
  record::{EntityRecord, RecordStatus},
  store::HistoryStore,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  /// Case-insensitive substring of the name.
  pub name:            Option<String>,
  /// `active` or `removed`.
  pub status:          Option<String>,
  pub origin:          Option<String>,
  /// Full state name or postal abbreviation.
  pub state:           Option<String>,
  pub first_seen_from: Option<NaiveDate>,
  pub first_seen_to:   Option<NaiveDate>,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

impl ListParams {
  fn into_query(self) -> Result<RecordQuery, ApiError> {
    let status = self
      .status
      .as_deref()
      .map(str::parse::<RecordStatus>)
      .transpose()
      .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let (Some(from), Some(to)) = (self.first_seen_from, self.first_seen_to)
      && from > to
    {
      return Err(ApiError::BadRequest(format!(
        "first_seen_from {from} is after first_seen_to {to}"
      )));
    }

    Ok(RecordQuery {
      name: self.name,
      status,
      origin: self.origin,
      state: self.state,
      first_seen_from: self.first_seen_from,
      first_seen_to: self.first_seen_to,
      limit: self.limit,
      offset: self.offset,
    })
  }
}

/// `GET /records[?name=...][&status=...][&origin=...][&state=...][&limit=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<EntityRecord>>, ApiError>
where
  S: HistoryStore,
{
  let query = params.into_query()?;
  let history = store.load().await.map_err(ApiError::store)?;
  let records = history.search(&query).into_iter().cloned().collect();
  Ok(Json(records))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /records/{identity}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(identity): Path<String>,
) -> Result<Json<EntityRecord>, ApiError>
where
  S: HistoryStore,
{
  let history = store.load().await.map_err(ApiError::store)?;
  let record = history
    .get(&identity)
    .cloned()
    .ok_or_else(|| ApiError::NotFound(format!("record {identity:?} not found")))?;
  Ok(Json(record))
}
