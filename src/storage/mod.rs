//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent listing upserts keyed on (source, external_id)
//! - Price-history sighting log
//! - Neighborhood catalog persistence
//! - Run tracking

mod columns;
mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteStorage;
pub use traits::{ListingSink, Storage, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, crate::CrawlError> {
    SqliteStorage::new(path)
}

/// How `insert_many` treats rows that collide with an existing key
#[derive(Debug, Clone, Copy)]
pub enum InsertMode<'a> {
    /// Keep the existing row, drop the new one
    IgnoreDuplicates,

    /// Overwrite every non-key column of the existing row
    Upsert { key: &'a [&'a str] },
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub units_completed: u64,
    pub units_failed: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Halted,
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Halted => "halted",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "halted" => Some(Self::Halted),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// One row of `listing_read_view`
///
/// Every column except the natural key may be null.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub id: i64,
    pub source: String,
    pub external_id: String,
    pub url: Option<String>,
    pub address: Option<String>,
    pub area_name: Option<String>,
    pub borough: Option<String>,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub living_area_size: Option<i64>,
    pub price: Option<i64>,
    pub fee: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<String>,
    pub available_at: Option<String>,
    pub off_market_at: Option<String>,
    pub zip_code: Option<String>,
}
