//! Crawler configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `LISTWATCH_*` environment variables. Command-line flags are
//! applied on top by the binary.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use listwatch_core::{
  reconcile::{DEFAULT_MIN_EXPECTED_RECORDS, ReconcileOptions},
  walker::{DEFAULT_BREAKER_THRESHOLD, DEFAULT_RETRY_COUNT, WalkConfig},
};
use serde::Deserialize;

use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://www.dhs.gov/wow";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
  /// Listing URL; page `N > 0` is requested as `{base_url}?page=N`.
  pub base_url:             String,
  pub store_path:           PathBuf,
  /// Where `--export-csv` and `export` write their files.
  pub export_dir:           PathBuf,
  pub user_agent:           String,
  pub request_timeout_secs: u64,
  /// Query parameter carrying the country filter.
  pub country_param:        String,
  /// Query parameter carrying the state filter.
  pub state_param:          String,
  pub host:                 String,
  pub port:                 u16,
  pub max_pages:            u32,
  pub delay_secs:           f64,
  pub retry_count:          u32,
  pub retry_backoff_secs:   f64,
  pub breaker_threshold:    u32,
  pub min_expected_records: usize,
}

impl Default for CrawlerConfig {
  fn default() -> Self {
    Self {
      base_url:             DEFAULT_BASE_URL.to_owned(),
      store_path:           PathBuf::from("data/history.json"),
      export_dir:           PathBuf::from("data"),
      user_agent:           DEFAULT_USER_AGENT.to_owned(),
      request_timeout_secs: 30,
      country_param:        "field_country_of_origin_target_id".to_owned(),
      state_param:          "field_state_value".to_owned(),
      host:                 "127.0.0.1".to_owned(),
      port:                 8080,
      max_pages:            50,
      delay_secs:           2.0,
      retry_count:          DEFAULT_RETRY_COUNT,
      retry_backoff_secs:   2.0,
      breaker_threshold:    DEFAULT_BREAKER_THRESHOLD,
      min_expected_records: DEFAULT_MIN_EXPECTED_RECORDS,
    }
  }
}

impl CrawlerConfig {
  /// Read `file` (if it exists) and the environment over the defaults.
  pub fn load(file: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(
        config::Environment::with_prefix("LISTWATCH").try_parsing(true),
      )
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// `store_path` with a leading `~` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  /// `export_dir` with a leading `~` expanded.
  pub fn export_dir(&self) -> PathBuf { expand_tilde(&self.export_dir) }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  /// Walk settings; `max_results` is per-run and starts unset.
  pub fn walk_config(&self) -> WalkConfig {
    WalkConfig {
      max_pages:         self.max_pages,
      max_results:       None,
      delay:             seconds(self.delay_secs),
      retry_backoff:     seconds(self.retry_backoff_secs),
      retry_count:       self.retry_count,
      breaker_threshold: self.breaker_threshold,
    }
  }

  pub fn reconcile_options(&self) -> ReconcileOptions {
    ReconcileOptions {
      min_expected_records: self.min_expected_records,
    }
  }
}

/// Negative or non-finite values mean no delay.
pub fn seconds(secs: f64) -> Duration {
  Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
