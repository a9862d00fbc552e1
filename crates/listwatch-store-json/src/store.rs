//! [`JsonFileStore`], the JSON file implementation of [`HistoryStore`].

use std::{
  ffi::OsString,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use listwatch_core::{history::History, store::HistoryStore};
use tokio::{fs, io::AsyncWriteExt as _};
use tracing::{debug, info};

use crate::{Error, Result};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A history store backed by a single JSON file.
///
/// Cloning is cheap; clones address the same file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
  path:      PathBuf,
  temp_path: PathBuf,
}

impl JsonFileStore {
  /// Address the document at `path`. Nothing is read or created until the
  /// first `load` or `save`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let temp_path = temp_path_for(&path);
    Self { path, temp_path }
  }

  pub fn path(&self) -> &Path { &self.path }

  async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
    match fs::read(&self.path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(Error::io(&self.path, e)),
    }
  }

  /// Write `bytes` to the temp file and flush it to disk.
  async fn write_temp(&self, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(&self.temp_path)
      .await
      .map_err(|e| Error::io(&self.temp_path, e))?;
    file
      .write_all(bytes)
      .await
      .map_err(|e| Error::io(&self.temp_path, e))?;
    file
      .sync_all()
      .await
      .map_err(|e| Error::io(&self.temp_path, e))?;
    Ok(())
  }
}

/// `history.json` → `history.json.tmp`, in the same directory so the final
/// rename never crosses file systems.
fn temp_path_for(path: &Path) -> PathBuf {
  let mut name = path
    .file_name()
    .map(OsString::from)
    .unwrap_or_else(|| OsString::from("history.json"));
  name.push(".tmp");
  path.with_file_name(name)
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for JsonFileStore {
  type Error = Error;

  async fn load(&self) -> Result<History> {
    let Some(bytes) = self.read_bytes().await? else {
      debug!(path = %self.path.display(), "no history yet; starting empty");
      return Ok(History::new());
    };
    let history = History::from_json(&bytes)?;
    debug!(
      path = %self.path.display(),
      records = history.len(),
      "history loaded"
    );
    Ok(history)
  }

  async fn save(&self, history: &History) -> Result<()> {
    let bytes = history.to_json_pretty()?;

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::io(parent, e))?;
    }

    if let Err(e) = self.write_temp(&bytes).await {
      // Best effort; the original document is untouched either way.
      let _ = fs::remove_file(&self.temp_path).await;
      return Err(e);
    }

    if let Err(e) = fs::rename(&self.temp_path, &self.path).await {
      let _ = fs::remove_file(&self.temp_path).await;
      return Err(Error::io(&self.path, e));
    }

    info!(
      path = %self.path.display(),
      records = history.len(),
      "history saved"
    );
    Ok(())
  }
}
