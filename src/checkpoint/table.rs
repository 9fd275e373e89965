use crate::checkpoint::{CheckpointResult, CheckpointStore};
use crate::storage::initialize_schema;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;

/// Checkpoints kept in the crawl database's `checkpoints` table
///
/// Holds its own connection so the orchestrator can own it independently
/// of the ingestion sink.
pub struct TableCheckpointStore {
    conn: Connection,
}

impl TableCheckpointStore {
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    fn new_in_memory() -> CheckpointResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl CheckpointStore for TableCheckpointStore {
    fn is_complete(&self, unit: &str) -> CheckpointResult<bool> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM checkpoints WHERE unit = ?1",
            params![unit],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    fn mark_complete(&mut self, unit: &str) -> CheckpointResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO checkpoints (unit, completed_at) VALUES (?1, ?2)",
            params![unit, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn completed_count(&self) -> CheckpointResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        self.conn.execute("DELETE FROM checkpoints", [])?;
        Ok(())
    }
}
