//! Search client
//!
//! Turns a (neighborhood slug, filters, page) request into one API call and
//! decodes the response.

use crate::config::{CrawlConfig, SiteConfig};
use crate::crawler::fetcher::Transport;
use crate::crawler::parser::{decode_page, PageResult};
use crate::Result;
use async_trait::async_trait;
use url::Url;

/// Optional search filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub beds: Option<u32>,
    pub max_price: Option<u32>,
}

impl SearchFilters {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            beds: config.beds,
            max_price: config.max_price,
        }
    }

    /// Pipe-delimited path segment, e.g. `price:-4000|beds:1`
    ///
    /// `None` when no filter is set; the API rejects an empty segment.
    pub fn segment(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(max_price) = self.max_price {
            parts.push(format!("price:-{}", max_price));
        }
        if let Some(beds) = self.beds {
            parts.push(format!("beds:{}", beds));
        }
        (!parts.is_empty()).then(|| parts.join("|"))
    }
}

/// Builds the search URL for one page
///
/// Shape: `{api-base}/{listing-path}/{slug}[/{filters}]?page={page}`
pub fn build_search_url(
    site: &SiteConfig,
    slug: &str,
    filters: &SearchFilters,
    page: u32,
) -> Result<Url> {
    let mut raw = format!(
        "{}/{}/{}",
        site.api_base.trim_end_matches('/'),
        site.listing_path.trim_matches('/'),
        slug
    );
    if let Some(segment) = filters.segment() {
        raw.push('/');
        raw.push_str(&segment);
    }

    let mut url = Url::parse(&raw)?;
    url.query_pairs_mut()
        .append_pair("page", &page.to_string());
    Ok(url)
}

/// A paginated listing search
#[async_trait]
pub trait ListingSource: Send {
    /// Fetches and decodes one page of results for `slug`
    ///
    /// Transport failures that survive retries are errors; payloads that
    /// cannot be understood come back as `PageResult::Malformed`.
    async fn search(&mut self, slug: &str, filters: &SearchFilters, page: u32)
        -> Result<PageResult>;
}

/// Listing search over the site's JSON API
pub struct SearchClient {
    transport: Transport,
    site: SiteConfig,
}

impl SearchClient {
    pub fn new(transport: Transport, site: SiteConfig) -> Self {
        Self { transport, site }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[async_trait]
impl ListingSource for SearchClient {
    async fn search(
        &mut self,
        slug: &str,
        filters: &SearchFilters,
        page: u32,
    ) -> Result<PageResult> {
        let url = build_search_url(&self.site, slug, filters, page)?;
        let body = self.transport.fetch(url.as_str(), true).await?;
        Ok(decode_page(&body, &self.site.base_url, &self.site.source))
    }
}
