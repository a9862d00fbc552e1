//! The `listwatch` crawler: configuration, the HTTP page source, the run
//! pipeline, CSV export, and page probing.
//!
//! The binary in `main.rs` wires these to the command line; everything here
//! is usable on its own.

pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod pipeline;
pub mod probe;

pub use config::CrawlerConfig;
pub use error::{Error, Result};
pub use fetch::{HttpPageSource, ListingFilter};
pub use pipeline::{RunOutcome, RunSummary, run};

#[cfg(test)]
mod tests;
