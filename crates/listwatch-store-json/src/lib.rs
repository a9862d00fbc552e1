//! Single-document JSON backend for the listwatch history.
//!
//! The whole history lives in one file. Saves go to a sibling temp file that
//! is flushed to disk and then renamed over the original, so a crash or a
//! failed write never leaves a half-written document behind.

mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::JsonFileStore;
