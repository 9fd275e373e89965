//! Checkpoint stores
//!
//! A checkpoint store is the durable set of work units whose pages were all
//! drained. The orchestrator consults it before a unit and appends to it
//! after the unit's last page; nothing finer than unit completion is kept.
//!
//! Two backends exist:
//! - [`FileCheckpointStore`]: append-only text file, one unit per line
//! - [`TableCheckpointStore`]: the `checkpoints` table of the crawl database

mod file;
mod table;

pub use file::FileCheckpointStore;
pub use table::TableCheckpointStore;

use crate::config::{CheckpointBackend, Config};
use std::path::Path;
use thiserror::Error;

/// Errors raised by checkpoint stores
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint table error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Durable set of completed work units
///
/// Appends are at-least-once: marking a unit that is already complete is
/// not an error.
pub trait CheckpointStore {
    /// Whether `unit` finished in an earlier (or the current) run
    fn is_complete(&self, unit: &str) -> CheckpointResult<bool>;

    /// Records `unit` as finished; durable when this returns
    fn mark_complete(&mut self, unit: &str) -> CheckpointResult<()>;

    /// Number of distinct completed units
    fn completed_count(&self) -> CheckpointResult<usize>;

    /// Forgets every completed unit
    fn clear(&mut self) -> CheckpointResult<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn is_complete(&self, unit: &str) -> CheckpointResult<bool> {
        (**self).is_complete(unit)
    }

    fn mark_complete(&mut self, unit: &str) -> CheckpointResult<()> {
        (**self).mark_complete(unit)
    }

    fn completed_count(&self) -> CheckpointResult<usize> {
        (**self).completed_count()
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        (**self).clear()
    }
}

/// Opens the checkpoint backend selected in `config`
pub fn open_checkpoint_store(config: &Config) -> CheckpointResult<Box<dyn CheckpointStore>> {
    match config.checkpoint.backend {
        CheckpointBackend::File => Ok(Box::new(FileCheckpointStore::open(Path::new(
            &config.checkpoint.path,
        ))?)),
        CheckpointBackend::Table => Ok(Box::new(TableCheckpointStore::open(Path::new(
            &config.storage.database_path,
        ))?)),
    }
}
