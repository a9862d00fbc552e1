//! `listwatch` command-line entry point.
//!
//! Reads `listwatch.toml` (or the path given with `--config`) and
//! `LISTWATCH_*` environment variables, then runs one of the subcommands
//! below against the JSON history file.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, bail};
use chrono::{Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use listwatch_core::{
  query::RecordQuery,
  record::RecordStatus,
  store::HistoryStore,
  walker::{PageWalker, StopSignal},
};
use listwatch_crawler::{
  CrawlerConfig, HttpPageSource, ListingFilter,
  config::seconds,
  export::{export_csv, export_path},
  probe::{parse_page_numbers, probe_pages},
};
use listwatch_store_json::JsonFileStore;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Track a paginated public listing over time")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "listwatch.toml", global = true)]
  config: PathBuf,

  /// History file; overrides `store_path` from the configuration.
  #[arg(long, global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Crawl the listing and merge the result into the history
  Run(RunArgs),
  /// Show history statistics
  Stats {
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
  },
  /// Search the history
  Search(SearchArgs),
  /// Write every record to a CSV file
  Export {
    /// Output file (default: a timestamped file in `export_dir`)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Fetch specific pages and report their card counts
  Probe(ProbeArgs),
  /// Serve the read-only JSON API
  Serve {
    #[arg(long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
  },
}

#[derive(Args)]
struct RunArgs {
  /// Maximum pages to walk [default: 50]
  #[arg(long)]
  max_pages: Option<u32>,
  /// Stop after this many records
  #[arg(long)]
  max_results: Option<usize>,
  /// Seconds between requests [default: 2.0]
  #[arg(long)]
  delay: Option<f64>,
  /// Below this many records, nothing is marked removed [default: 100]
  #[arg(long)]
  min_expected_records: Option<usize>,
  #[arg(long)]
  country: Option<String>,
  #[arg(long)]
  state: Option<String>,
  /// Also export the history to CSV after the run
  #[arg(long)]
  export_csv: bool,
}

#[derive(Args)]
struct SearchArgs {
  /// Case-insensitive substring of the name
  #[arg(long)]
  name: Option<String>,
  /// `active` or `removed`
  #[arg(short, long)]
  status: Option<RecordStatus>,
  #[arg(short, long)]
  origin: Option<String>,
  /// State name or postal abbreviation
  #[arg(long)]
  state: Option<String>,
  /// First seen on or after (YYYY-MM-DD)
  #[arg(long)]
  first_seen_from: Option<NaiveDate>,
  /// First seen on or before (YYYY-MM-DD)
  #[arg(long)]
  first_seen_to: Option<NaiveDate>,
  /// Max rows to display
  #[arg(short = 'n', long, default_value = "50")]
  limit: usize,
  /// Print JSON instead of a table
  #[arg(long)]
  json: bool,
}

#[derive(Args)]
struct ProbeArgs {
  /// Comma-separated 1-based page numbers
  #[arg(long, default_value = "1")]
  pages: String,
  /// Seconds between requests
  #[arg(long)]
  delay: Option<f64>,
  #[arg(long)]
  country: Option<String>,
  #[arg(long)]
  state: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = CrawlerConfig::load(&cli.config).with_context(|| {
    format!("failed to read configuration from {}", cli.config.display())
  })?;
  if let Some(store) = cli.store {
    cfg.store_path = store;
  }
  let store = JsonFileStore::new(cfg.store_path());

  match cli.command {
    Command::Run(args) => run(cfg, store, args).await,
    Command::Stats { json } => stats(&store, json).await,
    Command::Search(args) => search(&store, args).await,
    Command::Export { output } => {
      let history = store.load().await.context("failed to load history")?;
      let path = output
        .unwrap_or_else(|| export_path(&cfg.export_dir(), Local::now().naive_local()));
      let rows = export_csv(&path, history.records.values()).await?;
      println!("Exported {rows} records to {}", path.display());
      Ok(())
    }
    Command::Probe(args) => probe(cfg, args).await,
    Command::Serve { host, port } => {
      serve(&cfg, store, host.unwrap_or_else(|| cfg.host.clone()), port.unwrap_or(cfg.port))
        .await
    }
  }
}

// ─── run ─────────────────────────────────────────────────────────────────────

async fn run(
  mut cfg: CrawlerConfig,
  store: JsonFileStore,
  args: RunArgs,
) -> anyhow::Result<()> {
  if let Some(v) = args.max_pages {
    cfg.max_pages = v;
  }
  if let Some(v) = args.delay {
    cfg.delay_secs = v;
  }
  if let Some(v) = args.min_expected_records {
    cfg.min_expected_records = v;
  }
  let filter = ListingFilter {
    country: args.country,
    state:   args.state,
  };

  let mut walk = cfg.walk_config();
  walk.max_results = args.max_results;

  info!(
    url = %cfg.base_url,
    store = %store.path().display(),
    max_pages = walk.max_pages,
    delay_secs = cfg.delay_secs,
    ?filter,
    "starting run"
  );

  let source =
    HttpPageSource::new(&cfg, &filter).context("failed to set up page source")?;

  let stop = StopSignal::new();
  tokio::spawn({
    let stop = stop.clone();
    async move {
      if signal::ctrl_c().await.is_ok() {
        warn!("interrupted; finishing after the current page");
        stop.stop();
      }
    }
  });

  let outcome = listwatch_crawler::run(
    &source,
    &store,
    &PageWalker::new(walk),
    &cfg.reconcile_options(),
    &stop,
    Local::now().date_naive(),
    Utc::now(),
  )
  .await
  .context("run failed")?;

  println!("{}", outcome.summary);

  if args.export_csv {
    let path = export_path(&cfg.export_dir(), Local::now().naive_local());
    let rows = export_csv(&path, outcome.history.records.values()).await?;
    println!("\nExported {rows} records to {}", path.display());
  }
  Ok(())
}

// ─── stats / search ──────────────────────────────────────────────────────────

async fn stats(store: &JsonFileStore, json: bool) -> anyhow::Result<()> {
  let history = store.load().await.context("failed to load history")?;
  let s = history.statistics();

  if json {
    println!("{}", serde_json::to_string_pretty(&s)?);
    return Ok(());
  }

  println!("Total records:   {}", s.total_records);
  println!("Active records:  {}", s.active_records);
  println!("Removed records: {}", s.removed_records);
  println!("Total runs:      {}", s.total_runs);
  match s.last_updated {
    Some(at) => println!("Last run:        {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
    None => println!("Last run:        never"),
  }
  for (title, rows) in [
    ("Top origins", &s.top_origins),
    ("Top states", &s.top_states),
    ("Top charge categories", &s.top_charge_categories),
  ] {
    println!("\n{title}:");
    for t in rows {
      println!("   {:<28} {:>5}", t.label, t.count);
    }
  }
  Ok(())
}

async fn search(store: &JsonFileStore, args: SearchArgs) -> anyhow::Result<()> {
  if let (Some(from), Some(to)) = (args.first_seen_from, args.first_seen_to)
    && from > to
  {
    bail!("--first-seen-from {from} is after --first-seen-to {to}");
  }

  let history = store.load().await.context("failed to load history")?;
  let query = RecordQuery {
    name:            args.name,
    status:          args.status,
    origin:          args.origin,
    state:           args.state,
    first_seen_from: args.first_seen_from,
    first_seen_to:   args.first_seen_to,
    limit:           Some(args.limit),
    offset:          None,
  };
  let rows = history.search(&query);

  if args.json {
    println!("{}", serde_json::to_string_pretty(&rows)?);
    return Ok(());
  }
  if rows.is_empty() {
    println!("No matching records.");
    return Ok(());
  }

  println!(
    "{:<28} | {:<14} | {:<7} | {:<10} | {:<10} | {:<24}",
    "Name", "Origin", "Status", "First seen", "Last seen", "Location"
  );
  println!("{}", "-".repeat(108));
  for r in &rows {
    println!(
      "{:<28} | {:<14} | {:<7} | {:<10} | {:<10} | {:<24}",
      truncate(r.identity.as_str(), 28),
      truncate(r.attributes.origin.as_deref().unwrap_or("-"), 14),
      r.status,
      r.first_seen,
      r.last_seen,
      truncate(r.attributes.location.as_deref().unwrap_or("-"), 24),
    );
  }
  println!("\n{} records", rows.len());
  Ok(())
}

fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_owned();
  }
  let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
  out.push('…');
  out
}

// ─── probe ───────────────────────────────────────────────────────────────────

async fn probe(cfg: CrawlerConfig, args: ProbeArgs) -> anyhow::Result<()> {
  let pages = parse_page_numbers(&args.pages).map_err(anyhow::Error::msg)?;
  if pages.is_empty() {
    bail!("no pages to probe");
  }
  let filter = ListingFilter {
    country: args.country,
    state:   args.state,
  };
  let delay = args.delay.map_or_else(|| cfg.walk_config().delay, seconds);
  let source =
    HttpPageSource::new(&cfg, &filter).context("failed to set up page source")?;

  println!("Probing pages {pages:?} (delay {:.1}s)\n", delay.as_secs_f64());
  let probes = probe_pages(&source, &pages, delay).await;
  for p in &probes {
    println!("{p}");
  }
  let empty = probes.iter().filter(|p| p.cards == 0).count();
  if empty > 0 {
    println!("\n{empty} of {} pages had no cards", probes.len());
  }
  Ok(())
}

// ─── serve ───────────────────────────────────────────────────────────────────

async fn serve(
  cfg: &CrawlerConfig,
  store: JsonFileStore,
  host: String,
  port: u16,
) -> anyhow::Result<()> {
  let app = listwatch_api::api_router(Arc::new(store)).layer(TraceLayer::new_for_http());
  let address = format!("{host}:{port}");

  info!(store = %cfg.store_path().display(), "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = signal::ctrl_c().await;
      info!("shutting down");
    })
    .await
    .context("server error")?;
  Ok(())
}
