//! Crawler module for listing search and ingestion
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport with session rotation and backoff
//! - Search URL construction and payload decoding
//! - Request pacing
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod pacer;
mod parser;
mod search;

pub use coordinator::{run_crawl, Coordinator, CrawlOptions, CrawlSummary, HaltPoint, UnitOutcome};
pub use fetcher::{build_http_client, Transport, USER_AGENTS};
pub use pacer::{Backoff, Pacer};
pub use parser::{decode_page, normalize_timestamp, PageResult};
pub use search::{build_search_url, ListingSource, SearchClient, SearchFilters};
