//! Read-only JSON API over the listing history.
//!
//! Exposes an axum [`Router`] backed by any
//! [`listwatch_core::store::HistoryStore`]. Every request re-reads the
//! store, so a crawl that lands between two requests is visible to the
//! second one. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", listwatch_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod records;
pub mod stats;

use std::sync::Arc;

use axum::{Router, routing::get};
use listwatch_core::store::HistoryStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: HistoryStore + 'static,
{
  Router::new()
    .route("/records", get(records::list::<S>))
    .route("/records/{identity}", get(records::get_one::<S>))
    .route("/stats", get(stats::statistics::<S>))
    .route("/metadata", get(stats::metadata::<S>))
    .with_state(store)
}
