//! Error types for the listing-page codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid pattern: {0}")]
  Pattern(#[from] regex::Error),

  #[error("site origin must be an absolute http(s) URL: {0:?}")]
  InvalidOrigin(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
