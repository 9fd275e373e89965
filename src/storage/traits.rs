//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::catalog::Neighborhood;
use crate::listing::RawListingRecord;
use crate::storage::{InsertMode, ListingRow, RunRecord, RunStatus};
use rusqlite::types::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Row has {got} values, expected {expected}")]
    RowWidth { expected: usize, got: usize },

    #[error("Listing key missing: {0}")]
    MissingKey(&'static str),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for decoded listings
///
/// Implementations must make one call atomic: every record in `records`
/// lands, or none do.
pub trait ListingSink {
    /// Upserts a batch of listings, returning each entity id in input order
    fn upsert_listings(&mut self, records: &[RawListingRecord]) -> StorageResult<Vec<i64>>;
}

/// Trait for storage backend implementations
pub trait Storage: ListingSink {
    // ===== Listing Ingestion =====

    /// Upserts one listing and returns its entity id
    fn upsert(&mut self, record: &RawListingRecord) -> StorageResult<i64>;

    /// Inserts rows into `table` in one transaction
    ///
    /// Values bound for nullable columns must be `Value::Null`, never a
    /// placeholder; NaN reals are stored as NULL.
    fn insert_many(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
        mode: InsertMode<'_>,
    ) -> StorageResult<usize>;

    // ===== Run Management =====

    /// Creates a new crawl run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Closes a run with its final status and unit tallies
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        units_completed: u64,
        units_failed: u64,
    ) -> StorageResult<()>;

    // ===== Catalog =====

    /// Upserts neighborhoods by id
    fn upsert_neighborhoods(&mut self, neighborhoods: &[Neighborhood]) -> StorageResult<usize>;

    /// Loads the whole catalog ordered by id
    fn load_neighborhoods(&self) -> StorageResult<Vec<Neighborhood>>;

    // ===== Read Interface =====

    /// Reads rows from the listing read view, most recently seen first
    fn read_listings(&self, limit: usize) -> StorageResult<Vec<ListingRow>>;

    // ===== Statistics =====

    /// Gets total listing count
    fn count_listings(&self) -> StorageResult<u64>;

    /// Gets total price-history row count
    fn count_price_history(&self) -> StorageResult<u64>;

    /// Gets price-history row count for one listing
    fn count_price_history_for(&self, listing_id: i64) -> StorageResult<u64>;

    /// Gets catalog size
    fn count_neighborhoods(&self) -> StorageResult<u64>;
}
