//! Listing-page codec.
//!
//! Turns the HTML of one listing page into [`RawRecord`]s. Each
//! `<li class="usa-card">` element is one card; its rendered text is split
//! into lines and the fields are picked out by their section markers
//! (`Convicted of:`, `Arrested:`, `Name:`).
//!
//! The codec is pure and synchronous. Fetching pages is the crawler's job.

mod card;
pub mod error;
mod html;

pub use error::{Error, Result};
use listwatch_core::record::RawRecord;
use tracing::trace;

use crate::html::{Patterns, absolutize};

const CARD_CLASS: &str = "usa-card";
const MORE_LINK_CLASS: &str = "usa-card__more";

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Reusable page parser. Holds the compiled patterns and the site origin
/// used to absolutise root-relative links.
pub struct CardParser {
  patterns:    Patterns,
  site_origin: String,
}

impl CardParser {
  /// `site_origin` is the scheme and host, e.g. `https://www.example.gov`.
  /// A trailing path is ignored.
  pub fn new(site_origin: &str) -> Result<Self> {
    let site_origin = origin_of(site_origin)
      .ok_or_else(|| Error::InvalidOrigin(site_origin.to_owned()))?;
    Ok(Self {
      patterns: Patterns::new()?,
      site_origin,
    })
  }

  pub fn site_origin(&self) -> &str { &self.site_origin }

  /// Number of card elements on the page, including ones that would be
  /// skipped for lacking a name.
  pub fn count_cards(&self, html: &str) -> usize {
    self.patterns.blocks_with_class(html, CARD_CLASS).len()
  }

  /// Every named card on the page, in document order.
  pub fn parse_page(&self, html: &str) -> Vec<RawRecord> {
    let blocks = self.patterns.blocks_with_class(html, CARD_CLASS);
    let total = blocks.len();

    let records: Vec<RawRecord> = blocks
      .into_iter()
      .filter_map(|(start, end)| self.parse_card(&html[start..end]))
      .collect();

    trace!(cards = total, records = records.len(), "page parsed");
    records
  }

  fn parse_card(&self, fragment: &str) -> Option<RawRecord> {
    let lines = self.patterns.text_lines(fragment);
    let image_url = self
      .patterns
      .first_img_src(fragment)
      .map(|u| absolutize(&u, &self.site_origin));
    let detail_url = self
      .patterns
      .anchor_href_with_class(fragment, MORE_LINK_CLASS)
      .map(|u| absolutize(&u, &self.site_origin));
    card::parse_lines(&lines, image_url, detail_url)
  }
}

/// One-shot convenience over [`CardParser`].
pub fn parse_page(html: &str, site_origin: &str) -> Result<Vec<RawRecord>> {
  Ok(CardParser::new(site_origin)?.parse_page(html))
}

/// `https://host[:port]/any/path?q` → `https://host[:port]`.
fn origin_of(url: &str) -> Option<String> {
  let (scheme, rest) = url.split_once("://")?;
  if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
    return None;
  }
  let host = rest.split(['/', '?', '#']).next()?;
  if host.is_empty() {
    return None;
  }
  Some(format!("{scheme}://{host}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
