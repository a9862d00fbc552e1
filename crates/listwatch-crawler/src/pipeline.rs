//! One crawl run: load history, walk the listing, reconcile, save.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use listwatch_core::{
  history::History,
  query::Statistics,
  reconcile::{ChangeReport, ReconcileOptions, reconcile},
  record::Identity,
  store::HistoryStore,
  walker::{Extractor, PageWalker, StopReason, StopSignal},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{Error, Result};

/// Names listed per section in the printed summary.
const LISTED_NAMES: usize = 10;
/// Rows per ranking in the printed summary.
const TOP_ROWS: usize = 5;

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
  pub started_at:   DateTime<Utc>,
  pub pages_walked: u32,
  pub stop_reason:  StopReason,
  pub changes:      ChangeReport,
  pub statistics:   Statistics,
}

/// A finished run and the history it saved.
#[derive(Debug)]
pub struct RunOutcome {
  pub summary: RunSummary,
  pub history: History,
}

/// Run the full pipeline against `extractor` and `store`.
///
/// The store is only written after a successful walk and merge. A session
/// failure or an unreadable store aborts the run with the persisted history
/// untouched.
pub async fn run<E, S>(
  extractor: &E,
  store: &S,
  walker: &PageWalker,
  options: &ReconcileOptions,
  stop: &StopSignal,
  today: NaiveDate,
  now: DateTime<Utc>,
) -> Result<RunOutcome>
where
  E: Extractor,
  S: HistoryStore,
{
  let mut history = store.load().await.map_err(Error::store)?;
  info!(
    records = history.len(),
    active = history.active_count(),
    "history loaded"
  );

  let snapshot = walker.walk(extractor, stop).await?;
  if snapshot.stop_reason == StopReason::Cancelled {
    warn!("walk was cancelled; reconciling the partial snapshot");
  }

  let changes = reconcile(&mut history, snapshot.records, options, today, now);
  store.save(&history).await.map_err(Error::store)?;

  let summary = RunSummary {
    started_at: now,
    pages_walked: snapshot.pages_walked,
    stop_reason: snapshot.stop_reason,
    changes,
    statistics: history.statistics(),
  };
  Ok(RunOutcome { summary, history })
}

// ─── Printing ────────────────────────────────────────────────────────────────

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let c = &self.changes;
    let rule = "=".repeat(70);

    writeln!(f, "{rule}")?;
    writeln!(f, "RUN SUMMARY ({})", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(f, "{rule}")?;
    writeln!(f, "Pages walked:      {} ({})", self.pages_walked, stop_label(self.stop_reason))?;
    writeln!(f, "Records scraped:   {}", c.total_in_snapshot)?;
    if c.dropped_malformed > 0 {
      writeln!(f, "Dropped (no name): {}", c.dropped_malformed)?;
    }
    writeln!(f, "New:               {}", c.new.len())?;
    writeln!(f, "Updated:           {}", c.updated.len())?;
    if !c.untracked_refreshed.is_empty() {
      writeln!(f, "Link refreshed:    {}", c.untracked_refreshed.len())?;
    }
    writeln!(f, "Still present:     {}", c.still_present)?;
    writeln!(f, "Removed:           {}", c.removed.len())?;

    if c.incomplete {
      writeln!(
        f,
        "\n! Crawl looked incomplete; nothing was marked removed this run."
      )?;
    }
    if c.disparity_warning {
      writeln!(
        f,
        "! Only {} records scraped against {} previously active.",
        c.total_in_snapshot, c.active_before
      )?;
    }

    write_names(f, "NEW ARRIVALS", &c.new)?;
    write_names(f, "REMOVED", &c.removed)?;

    let s = &self.statistics;
    writeln!(f, "\n{rule}")?;
    writeln!(f, "DATABASE")?;
    writeln!(f, "{rule}")?;
    writeln!(f, "Total records:     {}", s.total_records)?;
    writeln!(f, "Active records:    {}", s.active_records)?;
    writeln!(f, "Removed records:   {}", s.removed_records)?;
    writeln!(f, "Total runs:        {}", s.total_runs)?;

    writeln!(f, "\nTop origins:")?;
    for t in s.top_origins.iter().take(TOP_ROWS) {
      writeln!(f, "   {}: {}", t.label, t.count)?;
    }
    writeln!(f, "\nTop states:")?;
    for t in s.top_states.iter().take(TOP_ROWS) {
      writeln!(f, "   {}: {}", t.label, t.count)?;
    }
    Ok(())
  }
}

fn write_names(f: &mut fmt::Formatter<'_>, title: &str, names: &[Identity]) -> fmt::Result {
  if names.is_empty() {
    return Ok(());
  }
  writeln!(f, "\n{title} ({}):", names.len())?;
  for name in names.iter().take(LISTED_NAMES) {
    writeln!(f, "   - {name}")?;
  }
  if names.len() > LISTED_NAMES {
    writeln!(f, "   ... and {} more", names.len() - LISTED_NAMES)?;
  }
  Ok(())
}

fn stop_label(reason: StopReason) -> &'static str {
  match reason {
    StopReason::Exhausted => "page limit reached",
    StopReason::CircuitBreaker => "stopped after consecutive empty pages",
    StopReason::ResultCap => "result cap reached",
    StopReason::Cancelled => "cancelled",
  }
}
