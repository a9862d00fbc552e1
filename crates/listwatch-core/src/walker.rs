//! The page walker: drives an [`Extractor`] across a bounded page range.
//!
//! Pages are fetched strictly in order with a fixed delay between requests.
//! Each page gets a few attempts; a page that stays empty after every attempt
//! counts towards a consecutive-empty circuit breaker. The walker never
//! judges whether the result is complete enough to trust; that is left to
//! [`crate::reconcile`].

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use serde::Serialize;
use tracing::{info, warn};

use crate::{Error, Result, record::RawRecord};

// ─── Extractor ───────────────────────────────────────────────────────────────

/// A source of raw records, one page at a time.
///
/// Implementations may fail or return nothing for any page; the walker
/// retries and carries on. Only [`Extractor::open_session`] failing aborts a
/// walk.
pub trait Extractor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Prepare the source before the first page is requested. Should not hit
  /// the network: a failure here is fatal, while page fetches are retried.
  fn open_session(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Fetch page `page_index` (zero-based) and extract its records.
  fn extract(
    &self,
    page_index: u32,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + '_;
}

// ─── Configuration ───────────────────────────────────────────────────────────

pub const DEFAULT_RETRY_COUNT: u32 = 2;
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkConfig {
  /// Pages `[0, max_pages)` are walked.
  pub max_pages:         u32,
  /// Stop once this many records are collected, truncating to exactly this
  /// many.
  pub max_results:       Option<usize>,
  /// Pause before every fetch except the first.
  pub delay:             Duration,
  /// Extra pause after an attempt that yielded nothing.
  pub retry_backoff:     Duration,
  /// Attempts per page.
  pub retry_count:       u32,
  /// Consecutive empty pages that stop the walk.
  pub breaker_threshold: u32,
}

impl Default for WalkConfig {
  fn default() -> Self {
    Self {
      max_pages:         50,
      max_results:       None,
      delay:             Duration::from_secs(2),
      retry_backoff:     Duration::from_secs(2),
      retry_count:       DEFAULT_RETRY_COUNT,
      breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
    }
  }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Cooperative stop flag, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
  pub fn new() -> Self { Self::default() }

  pub fn stop(&self) { self.0.store(true, Ordering::SeqCst); }

  pub fn is_stopped(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Why a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
  /// Every page in range was walked.
  Exhausted,
  /// Too many consecutive empty pages.
  CircuitBreaker,
  /// `max_results` was reached.
  ResultCap,
  /// The [`StopSignal`] was raised.
  Cancelled,
}

/// The raw result of one crawl attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSnapshot {
  /// All yielded records, in page order.
  pub records:      Vec<RawRecord>,
  pub pages_walked: u32,
  pub stop_reason:  StopReason,
}

// ─── Loop state ──────────────────────────────────────────────────────────────

/// State threaded through the walk loop.
#[derive(Debug, Default)]
struct WalkState {
  page_index:        u32,
  pages_walked:      u32,
  consecutive_empty: u32,
  fetches:           u32,
  records:           Vec<RawRecord>,
}

impl WalkState {
  /// Fold one page's records into the state, returning a stop reason if the
  /// walk should end here.
  fn absorb(
    &mut self,
    page: Vec<RawRecord>,
    config: &WalkConfig,
  ) -> Option<StopReason> {
    let page_index = self.page_index;
    self.page_index += 1;
    self.pages_walked += 1;

    if page.is_empty() {
      self.consecutive_empty += 1;
      warn!(
        page = page_index,
        consecutive = self.consecutive_empty,
        "page empty after all attempts"
      );
      if self.consecutive_empty >= config.breaker_threshold {
        warn!(
          consecutive = self.consecutive_empty,
          "consecutive empty pages; stopping walk"
        );
        return Some(StopReason::CircuitBreaker);
      }
      return None;
    }

    self.consecutive_empty = 0;
    self.records.extend(page);
    info!(
      page = page_index,
      total = self.records.len(),
      "page collected"
    );
    self.cap_reached(config)
  }

  fn cap_reached(&mut self, config: &WalkConfig) -> Option<StopReason> {
    let cap = config.max_results?;
    if self.records.len() < cap {
      return None;
    }
    self.records.truncate(cap);
    Some(StopReason::ResultCap)
  }

  fn finish(self, stop_reason: StopReason) -> CandidateSnapshot {
    CandidateSnapshot {
      records: self.records,
      pages_walked: self.pages_walked,
      stop_reason,
    }
  }
}

// ─── Walker ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PageWalker {
  config: WalkConfig,
}

impl PageWalker {
  pub fn new(config: WalkConfig) -> Self { Self { config } }

  pub fn config(&self) -> &WalkConfig { &self.config }

  /// Walk the configured page range and collect a candidate snapshot.
  ///
  /// Returns [`Error::Session`] if the extractor cannot open a session;
  /// per-page failures are absorbed.
  pub async fn walk<E: Extractor>(
    &self,
    extractor: &E,
    stop: &StopSignal,
  ) -> Result<CandidateSnapshot> {
    extractor
      .open_session()
      .await
      .map_err(|e| Error::Session(Box::new(e)))?;

    let mut state = WalkState::default();
    let reason = loop {
      if let Some(reason) = state.cap_reached(&self.config) {
        break reason;
      }
      if state.page_index >= self.config.max_pages {
        break StopReason::Exhausted;
      }
      if stop.is_stopped() {
        info!(page = state.page_index, "walk cancelled");
        break StopReason::Cancelled;
      }
      let page = self.fetch_page(extractor, &mut state).await;
      if let Some(reason) = state.absorb(page, &self.config) {
        break reason;
      }
    };

    let snapshot = state.finish(reason);
    info!(
      records = snapshot.records.len(),
      pages = snapshot.pages_walked,
      reason = ?snapshot.stop_reason,
      "walk finished"
    );
    Ok(snapshot)
  }

  /// Fetch the current page with retries. Errors count as empty attempts.
  async fn fetch_page<E: Extractor>(
    &self,
    extractor: &E,
    state: &mut WalkState,
  ) -> Vec<RawRecord> {
    let page_index = state.page_index;
    let attempts = self.config.retry_count.max(1);

    for attempt in 1..=attempts {
      if state.fetches > 0 {
        pause(self.config.delay).await;
      }
      state.fetches += 1;

      match extractor.extract(page_index).await {
        Ok(records) if !records.is_empty() => return records,
        Ok(_) => warn!(page = page_index, attempt, attempts, "no records"),
        Err(e) => {
          warn!(page = page_index, attempt, attempts, error = %e, "extraction failed")
        }
      }

      if attempt < attempts {
        pause(self.config.retry_backoff).await;
      }
    }

    Vec::new()
  }
}

async fn pause(duration: Duration) {
  if !duration.is_zero() {
    tokio::time::sleep(duration).await;
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
