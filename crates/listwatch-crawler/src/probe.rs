//! Pagination debugging: fetch chosen pages and report what each holds.
//!
//! Page numbers here are the 1-based numbers a visitor sees; page `N` is
//! requested with the zero-based index `N - 1`.

use std::{fmt, time::Duration};

use serde::Serialize;
use tracing::warn;

use crate::fetch::HttpPageSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageProbe {
  pub page_number: u32,
  pub url:         String,
  /// Card elements on the page, named or not.
  pub cards:       usize,
  /// Cards that parsed into a named record.
  pub records:     usize,
  pub first_name:  Option<String>,
  pub error:       Option<String>,
}

impl fmt::Display for PageProbe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "page {:>4}  {}  ", self.page_number, self.url)?;
    match (&self.error, self.cards) {
      (Some(e), _) => write!(f, "error: {e}"),
      (None, 0) => write!(f, "no cards"),
      (None, cards) => {
        write!(f, "{cards} cards, {} records", self.records)?;
        if let Some(name) = &self.first_name {
          write!(f, " (first: {name})")?;
        }
        Ok(())
      }
    }
  }
}

/// Parse `"208,209,210"` into page numbers. Zero and junk are rejected.
pub fn parse_page_numbers(arg: &str) -> Result<Vec<u32>, String> {
  arg
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| match s.parse::<u32>() {
      Ok(n) if n > 0 => Ok(n),
      _ => Err(format!("invalid page number {s:?}; pages are 1-based")),
    })
    .collect()
}

/// Probe each page in order, pausing `delay` between requests. Failures are
/// reported per page.
pub async fn probe_pages(
  source: &HttpPageSource,
  page_numbers: &[u32],
  delay: Duration,
) -> Vec<PageProbe> {
  let mut out = Vec::with_capacity(page_numbers.len());
  for (i, &page_number) in page_numbers.iter().enumerate() {
    if i > 0 && !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    let index = page_number.saturating_sub(1);
    let url = source.page_url(index).to_string();

    let probe = match source.fetch_html(index).await {
      Ok(html) => {
        let records = source.parser().parse_page(&html);
        PageProbe {
          page_number,
          url,
          cards: source.parser().count_cards(&html),
          records: records.len(),
          first_name: records.into_iter().find_map(|r| r.name),
          error: None,
        }
      }
      Err(e) => {
        warn!(page = page_number, error = %e, "probe failed");
        PageProbe {
          page_number,
          url,
          cards: 0,
          records: 0,
          first_name: None,
          error: Some(e.to_string()),
        }
      }
    };
    out.push(probe);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_numbers_parse() {
    assert_eq!(parse_page_numbers("208, 209,210").unwrap(), vec![208, 209, 210]);
    assert_eq!(parse_page_numbers("1,").unwrap(), vec![1]);
    assert!(parse_page_numbers("0").is_err());
    assert!(parse_page_numbers("3,x").is_err());
  }

  #[test]
  fn display_reports_errors_and_counts() {
    let mut p = PageProbe {
      page_number: 3,
      url:         "http://x.test/?page=2".to_owned(),
      cards:       12,
      records:     11,
      first_name:  Some("Ana Ruiz".to_owned()),
      error:       None,
    };
    assert!(p.to_string().ends_with("12 cards, 11 records (first: Ana Ruiz)"));
    p.error = Some("GET failed".to_owned());
    assert!(p.to_string().ends_with("error: GET failed"));
  }
}
