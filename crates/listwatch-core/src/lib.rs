//! Core types, the reconciliation engine, and the page walker for listwatch.
//!
//! This crate is deliberately free of HTTP and file-system dependencies.
//! Backends (`listwatch-store-json`) and page sources (`listwatch-crawler`)
//! plug in through the [`store::HistoryStore`] and [`walker::Extractor`]
//! traits.

// We intentionally use native `async fn` in trait impls (stabilised in Rust
// 1.75). Suppress the advisory lint about `Send` bounds on returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod history;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod walker;

pub use error::{Error, Result};
