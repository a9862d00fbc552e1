//! Handlers for `GET /stats` and `GET /metadata`.

use std::sync::Arc;

use axum::{Json, extract::State};
use listwatch_core::{history::Metadata, query::Statistics, store::HistoryStore};

use crate::error::ApiError;

/// `GET /stats`
pub async fn statistics<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Statistics>, ApiError>
where
  S: HistoryStore,
{
  let history = store.load().await.map_err(ApiError::store)?;
  Ok(Json(history.statistics()))
}

/// `GET /metadata`: run bookkeeping as persisted.
pub async fn metadata<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Metadata>, ApiError>
where
  S: HistoryStore,
{
  let history = store.load().await.map_err(ApiError::store)?;
  Ok(Json(history.metadata))
}
