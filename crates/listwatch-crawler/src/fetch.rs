//! [`HttpPageSource`]: fetches listing pages over HTTP and feeds them to the
//! card parser.

use listwatch_core::{record::RawRecord, walker::Extractor};
use listwatch_extract::CardParser;
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::{CrawlerConfig, Error, Result};

/// Optional pre-filters passed to the listing as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
  pub country: Option<String>,
  pub state:   Option<String>,
}

impl ListingFilter {
  pub fn is_empty(&self) -> bool {
    self.country.is_none() && self.state.is_none()
  }
}

// ─── Page source ─────────────────────────────────────────────────────────────

/// Cheap to share across tasks; the inner [`reqwest::Client`] is
/// `Arc`-based and the parser is immutable.
pub struct HttpPageSource {
  client:  Client,
  base:    Url,
  filters: Vec<(String, String)>,
  parser:  CardParser,
}

impl HttpPageSource {
  pub fn new(config: &CrawlerConfig, filter: &ListingFilter) -> Result<Self> {
    let base = Url::parse(&config.base_url).map_err(|e| Error::InvalidUrl {
      url:    config.base_url.clone(),
      reason: e.to_string(),
    })?;
    let parser = CardParser::new(&config.base_url)?;
    let client = Client::builder()
      .user_agent(config.user_agent.as_str())
      .timeout(config.request_timeout())
      .build()?;

    let mut filters = Vec::new();
    if let Some(country) = &filter.country {
      filters.push((config.country_param.clone(), country.clone()));
    }
    if let Some(state) = &filter.state {
      filters.push((config.state_param.clone(), state.clone()));
    }

    Ok(Self {
      client,
      base,
      filters,
      parser,
    })
  }

  /// URL of zero-based `page_index`. Page 0 carries no `page` parameter.
  pub fn page_url(&self, page_index: u32) -> Url {
    let mut url = self.base.clone();
    if !self.filters.is_empty() || page_index > 0 {
      let mut pairs = url.query_pairs_mut();
      for (key, value) in &self.filters {
        pairs.append_pair(key, value);
      }
      if page_index > 0 {
        pairs.append_pair("page", &page_index.to_string());
      }
    }
    url
  }

  pub fn parser(&self) -> &CardParser { &self.parser }

  /// Raw HTML of one page. Non-success statuses are errors.
  pub async fn fetch_html(&self, page_index: u32) -> Result<String> {
    let url = self.page_url(page_index);
    debug!(%url, "fetching page");
    let resp = self.client.get(url.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status {
        url: url.to_string(),
        status,
      });
    }
    Ok(resp.text().await?)
  }
}

// ─── Extractor impl ──────────────────────────────────────────────────────────

impl Extractor for HttpPageSource {
  type Error = Error;

  /// The client and URLs are settled in [`HttpPageSource::new`]; nothing
  /// is fetched here, so page 0 goes through the walker's retry and delay.
  async fn open_session(&self) -> Result<()> {
    info!(url = %self.page_url(0), filters = self.filters.len(), "session open");
    Ok(())
  }

  async fn extract(&self, page_index: u32) -> Result<Vec<RawRecord>> {
    let html = self.fetch_html(page_index).await?;
    let records = self.parser.parse_page(&html);
    debug!(page = page_index, records = records.len(), "page extracted");
    Ok(records)
  }
}
