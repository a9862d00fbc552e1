//! End-to-end tests against a local fake listing served by axum.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::{Duration, Instant},
};

use axum::{
  Router,
  extract::{RawQuery, State},
  http::StatusCode,
  response::{Html, IntoResponse, Response},
  routing::get,
};
use chrono::{NaiveDate, TimeZone, Utc};
use listwatch_core::{
  record::{Identity, RecordStatus},
  store::HistoryStore,
  walker::{Extractor, PageWalker, StopReason, StopSignal},
};
use listwatch_store_json::JsonFileStore;
use tempfile::TempDir;

use crate::{CrawlerConfig, HttpPageSource, ListingFilter, probe, run};

// ─── Fake listing ────────────────────────────────────────────────────────────

/// Pages by zero-based index; `None` answers 500. Pages past the end are
/// valid but empty. The first `unavailable` requests answer 503 whatever
/// page they ask for.
struct FakeSite {
  pages:       Vec<Option<String>>,
  queries:     Mutex<Vec<String>>,
  unavailable: AtomicUsize,
}

async fn listing(State(site): State<Arc<FakeSite>>, RawQuery(query): RawQuery) -> Response {
  let query = query.unwrap_or_default();
  site.queries.lock().unwrap().push(query.clone());
  if site
    .unavailable
    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
    .is_ok()
  {
    return StatusCode::SERVICE_UNAVAILABLE.into_response();
  }

  let index = query
    .split('&')
    .find_map(|kv| kv.strip_prefix("page="))
    .and_then(|v| v.parse::<usize>().ok())
    .unwrap_or(0);
  match site.pages.get(index) {
    Some(Some(html)) => Html(html.clone()).into_response(),
    Some(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    None => Html(page(&[])).into_response(),
  }
}

async fn serve(pages: Vec<Option<String>>) -> (String, Arc<FakeSite>) {
  serve_flaky(pages, 0).await
}

async fn serve_flaky(
  pages: Vec<Option<String>>,
  unavailable: usize,
) -> (String, Arc<FakeSite>) {
  let site = Arc::new(FakeSite {
    pages,
    queries: Mutex::new(Vec::new()),
    unavailable: AtomicUsize::new(unavailable),
  });
  let app = Router::new()
    .route("/wall", get(listing))
    .with_state(site.clone());
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await });
  (format!("http://{addr}/wall"), site)
}

fn card(name: &str, origin: &str, location: &str) -> String {
  format!(
    r#"<li class="usa-card">
  <div class="usa-card__header"><p>{origin}</p></div>
  <div class="usa-card__body">
    <p>Convicted of:</p><p>Robbery</p>
    <p>Arrested:</p><p>{location}</p>
    <p>Name:</p><p>{name}</p>
  </div>
  <a class="usa-card__more" href="/news/{slug}">&gt;&gt;</a>
</li>"#,
    slug = name.to_lowercase().replace(' ', "-"),
  )
}

fn page(cards: &[(&str, &str, &str)]) -> String {
  let body: String = cards.iter().map(|(n, o, l)| card(n, o, l)).collect();
  format!("<html><body><ul class=\"usa-card-group\">{body}</ul></body></html>")
}

const ANA: (&str, &str, &str) = ("Ana Ruiz", "MEXICO", "Houston, Texas");
const BORIS: (&str, &str, &str) = ("Boris Vega", "HONDURAS", "Miami, FL");
const CARLA: (&str, &str, &str) = ("Carla Soto", "MEXICO", "Phoenix, Arizona");
const DIEGO: (&str, &str, &str) = ("Diego Lara", "GUATEMALA", "Newark, NJ");

// ─── Harness ─────────────────────────────────────────────────────────────────

fn config(base_url: &str, dir: &TempDir) -> CrawlerConfig {
  CrawlerConfig {
    base_url: base_url.to_owned(),
    store_path: dir.path().join("history.json"),
    export_dir: dir.path().join("exports"),
    max_pages: 10,
    delay_secs: 0.0,
    retry_backoff_secs: 0.0,
    min_expected_records: 3,
    ..CrawlerConfig::default()
  }
}

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 9, d).unwrap() }

async fn crawl(
  cfg: &CrawlerConfig,
  d: u32,
) -> crate::Result<crate::RunOutcome> {
  let source = HttpPageSource::new(cfg, &ListingFilter::default())?;
  let store = JsonFileStore::new(cfg.store_path());
  run(
    &source,
    &store,
    &PageWalker::new(cfg.walk_config()),
    &cfg.reconcile_options(),
    &StopSignal::new(),
    day(d),
    Utc.with_ymd_and_hms(2025, 9, d, 7, 30, 0).unwrap(),
  )
  .await
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_run_records_everything() {
  let (url, _site) = serve(vec![
    Some(page(&[ANA, BORIS])),
    Some(page(&[CARLA, DIEGO])),
  ])
  .await;
  let dir = tempfile::tempdir().unwrap();
  let cfg = config(&url, &dir);

  let out = crawl(&cfg, 1).await.unwrap();
  let s = &out.summary;
  assert_eq!(s.stop_reason, StopReason::CircuitBreaker);
  assert_eq!(s.changes.new.len(), 4);
  assert!(!s.changes.incomplete);
  assert_eq!(s.statistics.active_records, 4);

  let ana = out.history.get("Ana Ruiz").unwrap();
  assert_eq!(ana.attributes.charge.as_deref(), Some("Robbery"));
  assert_eq!(
    ana.attributes.detail_url.as_deref(),
    Some(format!("{}/news/ana-ruiz", url.trim_end_matches("/wall")).as_str())
  );

  let saved = JsonFileStore::new(cfg.store_path()).load().await.unwrap();
  assert_eq!(saved, out.history);
  assert!(s.to_string().contains("NEW ARRIVALS (4)"));
}

#[tokio::test]
async fn complete_second_run_removes_missing_records() {
  let dir = tempfile::tempdir().unwrap();

  let (url, _site) = serve(vec![Some(page(&[ANA, BORIS, CARLA, DIEGO]))]).await;
  crawl(&config(&url, &dir), 1).await.unwrap();

  let (url, _site) = serve(vec![Some(page(&[ANA, BORIS])), Some(page(&[CARLA]))]).await;
  let out = crawl(&config(&url, &dir), 2).await.unwrap();

  assert_eq!(out.summary.changes.removed, vec![Identity::from("Diego Lara")]);
  let diego = out.history.get("Diego Lara").unwrap();
  assert_eq!(diego.status, RecordStatus::Removed);
  assert_eq!(diego.removed_on, Some(day(2)));
  assert_eq!(out.history.get("Ana Ruiz").unwrap().last_seen, day(2));
  assert_eq!(out.history.metadata.total_runs, 2);
}

#[tokio::test]
async fn short_crawl_removes_nothing() {
  let dir = tempfile::tempdir().unwrap();

  let (url, _site) = serve(vec![Some(page(&[ANA, BORIS, CARLA, DIEGO]))]).await;
  crawl(&config(&url, &dir), 1).await.unwrap();

  let (url, _site) = serve(vec![Some(page(&[ANA]))]).await;
  let out = crawl(&config(&url, &dir), 2).await.unwrap();

  let c = &out.summary.changes;
  assert!(c.incomplete);
  assert!(c.disparity_warning);
  assert!(c.removed.is_empty());
  assert_eq!(out.history.active_count(), 4);
  assert!(out.summary.to_string().contains("nothing was marked removed"));
}

#[tokio::test]
async fn failing_page_is_retried_then_skipped() {
  let (url, site) = serve(vec![
    Some(page(&[ANA, BORIS])),
    None,
    Some(page(&[CARLA])),
  ])
  .await;
  let dir = tempfile::tempdir().unwrap();

  let out = crawl(&config(&url, &dir), 1).await.unwrap();
  assert_eq!(out.summary.changes.new.len(), 3);

  let queries = site.queries.lock().unwrap();
  assert_eq!(queries.iter().filter(|q| q.is_empty()).count(), 1);
  assert_eq!(queries.iter().filter(|q| q.as_str() == "page=1").count(), 2);
  assert_eq!(queries.iter().filter(|q| q.as_str() == "page=2").count(), 1);
}

#[tokio::test]
async fn transient_outage_on_first_page_is_retried() {
  let (url, site) = serve_flaky(vec![Some(page(&[ANA, BORIS, CARLA]))], 1).await;
  let dir = tempfile::tempdir().unwrap();

  let out = crawl(&config(&url, &dir), 1).await.unwrap();
  assert_eq!(out.summary.changes.new.len(), 3);
  assert!(!out.summary.changes.incomplete);

  let queries = site.queries.lock().unwrap();
  assert_eq!(queries.iter().filter(|q| q.is_empty()).count(), 2);
}

#[tokio::test]
async fn unreachable_listing_is_an_incomplete_run() {
  let dir = tempfile::tempdir().unwrap();

  let (url, _site) = serve(vec![Some(page(&[ANA, BORIS, CARLA, DIEGO]))]).await;
  crawl(&config(&url, &dir), 1).await.unwrap();

  let (url, _site) = serve(vec![None, None, None]).await;
  let out = crawl(&config(&url, &dir), 2).await.unwrap();

  let s = &out.summary;
  assert_eq!(s.stop_reason, StopReason::CircuitBreaker);
  assert!(s.changes.new.is_empty());
  assert!(s.changes.removed.is_empty());
  assert!(s.changes.incomplete);
  assert_eq!(out.history.active_count(), 4);
  assert!(s.to_string().contains("nothing was marked removed"));
}

#[tokio::test]
async fn first_page_waits_out_the_delay_once() {
  let (url, site) = serve(vec![Some(page(&[ANA])), Some(page(&[BORIS]))]).await;
  let dir = tempfile::tempdir().unwrap();
  let cfg = CrawlerConfig {
    max_pages: 2,
    delay_secs: 0.3,
    ..config(&url, &dir)
  };

  let started = Instant::now();
  crawl(&cfg, 1).await.unwrap();
  assert!(started.elapsed() >= Duration::from_millis(300));

  let queries = site.queries.lock().unwrap();
  assert_eq!(*queries, ["", "page=1"]);
}

#[tokio::test]
async fn result_cap_truncates_the_snapshot() {
  let (url, _site) = serve(vec![
    Some(page(&[ANA, BORIS])),
    Some(page(&[CARLA, DIEGO])),
  ])
  .await;
  let dir = tempfile::tempdir().unwrap();
  let cfg = config(&url, &dir);

  let source = HttpPageSource::new(&cfg, &ListingFilter::default()).unwrap();
  let mut walk = cfg.walk_config();
  walk.max_results = Some(3);
  let snapshot = PageWalker::new(walk)
    .walk(&source, &StopSignal::new())
    .await
    .unwrap();
  assert_eq!(snapshot.stop_reason, StopReason::ResultCap);
  let names: Vec<_> = snapshot.records.iter().filter_map(|r| r.name.as_deref()).collect();
  assert_eq!(names, ["Ana Ruiz", "Boris Vega", "Carla Soto"]);
}

// ─── Page source ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn filters_are_sent_with_every_request() {
  let (url, site) = serve(vec![Some(page(&[ANA]))]).await;
  let dir = tempfile::tempdir().unwrap();
  let cfg = config(&url, &dir);
  let source = HttpPageSource::new(&cfg, &ListingFilter {
    country: None,
    state:   Some("Texas".to_owned()),
  })
  .unwrap();

  source.open_session().await.unwrap();
  assert_eq!(source.extract(0).await.unwrap().len(), 1);
  assert!(source.extract(1).await.unwrap().is_empty());

  let queries = site.queries.lock().unwrap();
  assert_eq!(*queries, ["field_state_value=Texas", "field_state_value=Texas&page=1"]);
}

#[tokio::test]
async fn probe_reports_each_page() {
  let (url, _site) = serve(vec![Some(page(&[ANA, BORIS])), None]).await;
  let dir = tempfile::tempdir().unwrap();
  let source =
    HttpPageSource::new(&config(&url, &dir), &ListingFilter::default()).unwrap();

  let probes = probe::probe_pages(&source, &[1, 2, 5], Duration::ZERO).await;
  assert_eq!(probes.len(), 3);
  assert_eq!(probes[0].cards, 2);
  assert_eq!(probes[0].first_name.as_deref(), Some("Ana Ruiz"));
  assert!(probes[1].error.as_deref().is_some_and(|e| e.contains("500")));
  assert_eq!(probes[2].cards, 0);
  assert!(probes[2].url.ends_with("?page=4"));
}
