//! The `HistoryStore` trait.
//!
//! Implemented by persistence backends (e.g. `listwatch-store-json`). The
//! crawler and the API depend on this abstraction, not on a concrete backend.

use std::future::Future;

use crate::history::History;

/// Whole-document persistence for a [`History`].
///
/// A run loads the complete history, reconciles it in memory, and saves it
/// back in one piece. `save` must be atomic: after a failed save, `load`
/// returns the previous document unchanged.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded runtimes (e.g. tokio with `axum`).
pub trait HistoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the full history. A store that has never been saved yields an
  /// empty history.
  fn load(&self) -> impl Future<Output = Result<History, Self::Error>> + Send + '_;

  /// Replace the persisted history with `history`.
  fn save<'a>(
    &'a self,
    history: &'a History,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
