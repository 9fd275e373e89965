//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::catalog::Neighborhood;
use crate::config::PriceHistoryPolicy;
use crate::listing::RawListingRecord;
use crate::storage::columns::listing_columns;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ListingSink, Storage, StorageError, StorageResult};
use crate::storage::{InsertMode, ListingRow, RunRecord, RunStatus};
use crate::CrawlError;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::path::Path;

/// Columns written once on insert and never touched by the conflict update
const INSERT_ONLY_COLUMNS: [&str; 3] = ["source", "external_id", "first_seen_at"];

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    price_history: PriceHistoryPolicy,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn,
            price_history: PriceHistoryPolicy::default(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn,
            price_history: PriceHistoryPolicy::default(),
        })
    }

    /// Sets when price-history rows are appended
    pub fn with_price_history(mut self, policy: PriceHistoryPolicy) -> Self {
        self.price_history = policy;
        self
    }
}

/// Upserts one listing inside an open transaction
///
/// Returns the entity id. Appends a price-history row when the stored
/// entity carries a price and the policy allows it.
fn upsert_listing(
    tx: &Transaction<'_>,
    record: &RawListingRecord,
    policy: PriceHistoryPolicy,
    now: &str,
) -> StorageResult<i64> {
    if record.source.is_empty() {
        return Err(StorageError::MissingKey("source"));
    }
    if record.external_id.is_empty() {
        return Err(StorageError::MissingKey("external_id"));
    }

    let mut names: Vec<&str> = vec!["source", "external_id", "first_seen_at", "last_seen_at"];
    let mut values: Vec<Value> = vec![
        Value::Text(record.source.clone()),
        Value::Text(record.external_id.clone()),
        Value::Text(now.to_string()),
        Value::Text(now.to_string()),
    ];
    for (name, value) in listing_columns(record) {
        names.push(name);
        values.push(value);
    }

    let placeholders = (1..=names.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = names
        .iter()
        .filter(|name| !INSERT_ONLY_COLUMNS.contains(name))
        .map(|name| format!("{name} = excluded.{name}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO listings ({}) VALUES ({})
         ON CONFLICT(source, external_id) DO UPDATE SET {}
         RETURNING id, price",
        names.join(", "),
        placeholders,
        updates
    );

    let (listing_id, price): (i64, Option<i64>) =
        tx.query_row(&sql, params_from_iter(values.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    if let Some(price) = price {
        let append = match policy {
            PriceHistoryPolicy::EverySighting => true,
            PriceHistoryPolicy::OnChange => {
                let last: Option<i64> = tx
                    .query_row(
                        "SELECT price FROM price_history WHERE listing_id = ?1
                         ORDER BY id DESC LIMIT 1",
                        params![listing_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                last != Some(price)
            }
        };

        if append {
            tx.execute(
                "INSERT INTO price_history (listing_id, price, observed_at) VALUES (?1, ?2, ?3)",
                params![listing_id, price, now],
            )?;
        }
    }

    Ok(listing_id)
}

/// Accepts plain SQL identifiers only
fn validate_identifier(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

/// NaN and infinities have no numeric meaning downstream; store NULL
fn sanitize(value: &Value) -> Value {
    match value {
        Value::Real(f) if !f.is_finite() => Value::Null,
        other => other.clone(),
    }
}

fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        units_completed: row.get::<_, i64>(5)? as u64,
        units_failed: row.get::<_, i64>(6)? as u64,
    })
}

impl ListingSink for SqliteStorage {
    fn upsert_listings(&mut self, records: &[RawListingRecord]) -> StorageResult<Vec<i64>> {
        let now = Utc::now().to_rfc3339();
        let policy = self.price_history;
        let tx = self.conn.transaction()?;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(upsert_listing(&tx, record, policy, &now)?);
        }

        tx.commit()?;
        Ok(ids)
    }
}

impl Storage for SqliteStorage {
    // ===== Listing Ingestion =====

    fn upsert(&mut self, record: &RawListingRecord) -> StorageResult<i64> {
        let ids = self.upsert_listings(std::slice::from_ref(record))?;
        Ok(ids[0])
    }

    fn insert_many(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
        mode: InsertMode<'_>,
    ) -> StorageResult<usize> {
        validate_identifier(table)?;
        for column in columns {
            validate_identifier(column)?;
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = match mode {
            InsertMode::IgnoreDuplicates => format!(
                "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            ),
            InsertMode::Upsert { key } => {
                for column in key {
                    validate_identifier(column)?;
                    if !columns.contains(column) {
                        return Err(StorageError::InvalidIdentifier(format!(
                            "key column {} not among inserted columns",
                            column
                        )));
                    }
                }
                let updates = columns
                    .iter()
                    .filter(|c| !key.contains(c))
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect::<Vec<_>>();
                let action = if updates.is_empty() {
                    "DO NOTHING".to_string()
                } else {
                    format!("DO UPDATE SET {}", updates.join(", "))
                };
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
                    table,
                    columns.join(", "),
                    placeholders,
                    key.join(", "),
                    action
                )
            }
        };

        let tx = self.conn.transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                if row.len() != columns.len() {
                    return Err(StorageError::RowWidth {
                        expected: columns.len(),
                        got: row.len(),
                    });
                }
                affected += stmt.execute(params_from_iter(row.iter().map(sanitize)))?;
            }
        }
        tx.commit()?;

        Ok(affected)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, units_completed, units_failed
                 FROM crawl_runs WHERE id = ?1",
                params![run_id],
                map_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        units_completed: u64,
        units_failed: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, units_completed = ?3, units_failed = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                units_completed as i64,
                units_failed as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Catalog =====

    fn upsert_neighborhoods(&mut self, neighborhoods: &[Neighborhood]) -> StorageResult<usize> {
        let to_row = |n: &Neighborhood| {
            vec![
                Value::Integer(n.id),
                Value::Text(n.name.clone()),
                n.level.map(Value::Integer).unwrap_or(Value::Null),
                n.parent_id.map(Value::Integer).unwrap_or(Value::Null),
            ]
        };

        // A dump without slugs must not wipe slugs curated earlier
        let (with_slug, without_slug): (Vec<&Neighborhood>, Vec<&Neighborhood>) =
            neighborhoods.iter().partition(|n| n.slug.is_some());

        let plain_rows: Vec<Vec<Value>> = without_slug.into_iter().map(to_row).collect();
        let mut written = self.insert_many(
            "neighborhoods",
            &["id", "name", "level", "parent_id"],
            &plain_rows,
            InsertMode::Upsert { key: &["id"] },
        )?;

        let slug_rows: Vec<Vec<Value>> = with_slug
            .into_iter()
            .map(|n| {
                let mut row = to_row(n);
                row.push(n.slug.clone().map(Value::Text).unwrap_or(Value::Null));
                row
            })
            .collect();
        written += self.insert_many(
            "neighborhoods",
            &["id", "name", "level", "parent_id", "slug"],
            &slug_rows,
            InsertMode::Upsert { key: &["id"] },
        )?;

        Ok(written)
    }

    fn load_neighborhoods(&self) -> StorageResult<Vec<Neighborhood>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, level, parent_id, slug FROM neighborhoods ORDER BY id")?;

        let neighborhoods = stmt
            .query_map([], |row| {
                Ok(Neighborhood {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    level: row.get(2)?,
                    parent_id: row.get(3)?,
                    slug: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(neighborhoods)
    }

    // ===== Read Interface =====

    fn read_listings(&self, limit: usize) -> StorageResult<Vec<ListingRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, external_id, url, address, area_name, borough, beds, baths,
             living_area_size, price, fee, latitude, longitude, status, available_at,
             off_market_at, zip_code
             FROM listing_read_view ORDER BY last_seen_at DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ListingRow {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    external_id: row.get(2)?,
                    url: row.get(3)?,
                    address: row.get(4)?,
                    area_name: row.get(5)?,
                    borough: row.get(6)?,
                    beds: row.get(7)?,
                    baths: row.get(8)?,
                    living_area_size: row.get(9)?,
                    price: row.get(10)?,
                    fee: row.get(11)?,
                    latitude: row.get(12)?,
                    longitude: row.get(13)?,
                    status: row.get(14)?,
                    available_at: row.get(15)?,
                    off_market_at: row.get(16)?,
                    zip_code: row.get(17)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ===== Statistics =====

    fn count_listings(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_price_history(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_price_history_for(&self, listing_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM price_history WHERE listing_id = ?1",
            params![listing_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_neighborhoods(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM neighborhoods", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
