//! CSV export of the record set.

use std::{
  io::{self, Write},
  path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use listwatch_core::record::EntityRecord;
use tokio::fs;
use tracing::info;

use crate::{Error, Result};

pub const COLUMNS: [&str; 11] = [
  "name",
  "origin",
  "charge",
  "location",
  "image_url",
  "detail_url",
  "first_seen",
  "last_seen",
  "status",
  "removed_on",
  "observation_count",
];

fn needs_quotes(field: &str) -> bool {
  field.contains([',', '"', '\n', '\r'])
}

fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
  for (i, cell) in row.iter().enumerate() {
    if i > 0 {
      w.write_all(b",")?;
    }
    if needs_quotes(cell) {
      write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
    } else {
      w.write_all(cell.as_bytes())?;
    }
  }
  w.write_all(b"\r\n")
}

fn row_of(record: &EntityRecord) -> Vec<String> {
  let a = &record.attributes;
  let opt = |v: &Option<String>| v.clone().unwrap_or_default();
  vec![
    record.identity.to_string(),
    opt(&a.origin),
    opt(&a.charge),
    opt(&a.location),
    opt(&a.image_url),
    opt(&a.detail_url),
    record.first_seen.to_string(),
    record.last_seen.to_string(),
    record.status.to_string(),
    record.removed_on.map(|d| d.to_string()).unwrap_or_default(),
    record.observation_count.to_string(),
  ]
}

/// Header plus one row per record, CRLF-terminated.
pub fn write_csv<'a, W, I>(w: &mut W, records: I) -> io::Result<()>
where
  W: Write,
  I: IntoIterator<Item = &'a EntityRecord>,
{
  let header: Vec<String> = COLUMNS.iter().map(|c| (*c).to_owned()).collect();
  write_row(w, &header)?;
  for record in records {
    write_row(w, &row_of(record))?;
  }
  Ok(())
}

/// `dir/export_YYYYMMDD_HHMMSS.csv`
pub fn export_path(dir: &Path, at: NaiveDateTime) -> PathBuf {
  dir.join(format!("export_{}.csv", at.format("%Y%m%d_%H%M%S")))
}

/// Write `records` to `path`, creating parent directories. Returns the
/// number of rows written.
pub async fn export_csv<'a, I>(path: &Path, records: I) -> Result<usize>
where
  I: IntoIterator<Item = &'a EntityRecord>,
{
  let mut buf = Vec::new();
  let mut rows = 0;
  let counted = records.into_iter().inspect(|_| rows += 1);
  write_csv(&mut buf, counted).map_err(|e| Error::io(path, e))?;

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)
      .await
      .map_err(|e| Error::io(parent, e))?;
  }
  fs::write(path, &buf).await.map_err(|e| Error::io(path, e))?;

  info!(path = %path.display(), rows, "csv exported");
  Ok(rows)
}
