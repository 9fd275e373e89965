use crate::checkpoint::{CheckpointResult, CheckpointStore};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Append-only line file of completed units
///
/// The whole file is read once at open; every `mark_complete` appends a line
/// in one write and syncs it before returning, so a crash never loses an
/// acknowledged unit. A torn last line left by a crash is dropped at open.
/// Duplicate lines are harmless.
pub struct FileCheckpointStore {
    completed: HashSet<String>,
    file: File,
}

impl FileCheckpointStore {
    /// Opens (or creates) the checkpoint file, creating parent directories
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let content = fs::read_to_string(path)?;

        // An unterminated last line is an append cut short by a crash. It was
        // never acknowledged, so it is dropped before anything is appended.
        let (acknowledged, torn) = match content.rfind('\n') {
            Some(end) => content.split_at(end + 1),
            None => ("", content.as_str()),
        };
        if !torn.is_empty() {
            warn!(path = %path.display(), line = %torn, "Dropping torn checkpoint line");
            file.set_len(acknowledged.len() as u64)?;
            file.sync_data()?;
        }

        let completed = acknowledged
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            completed,
            file,
        })
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn is_complete(&self, unit: &str) -> CheckpointResult<bool> {
        Ok(self.completed.contains(unit))
    }

    fn mark_complete(&mut self, unit: &str) -> CheckpointResult<()> {
        self.file.write_all(format!("{}\n", unit).as_bytes())?;
        self.file.sync_data()?;
        self.completed.insert(unit.to_string());
        Ok(())
    }

    fn completed_count(&self) -> CheckpointResult<usize> {
        Ok(self.completed.len())
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        self.file.set_len(0)?;
        self.file.sync_data()?;
        self.completed.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("processed.txt");

        {
            let mut store = FileCheckpointStore::open(&path).unwrap();
            store.mark_complete("midtown").unwrap();
            store.mark_complete("soho").unwrap();
        }

        let store = FileCheckpointStore::open(&path).unwrap();
        assert!(store.is_complete("midtown").unwrap());
        assert!(store.is_complete("soho").unwrap());
        assert!(!store.is_complete("tribeca").unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "midtown\nsoho\n"
        );
    }

    #[test]
    fn test_duplicate_marks_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");
        fs::write(&path, "midtown\nmidtown\n\n").unwrap();

        let mut store = FileCheckpointStore::open(&path).unwrap();
        store.mark_complete("midtown").unwrap();

        assert_eq!(store.completed_count().unwrap(), 1);
    }

    #[test]
    fn test_torn_last_line_does_not_swallow_next_mark() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");
        fs::write(&path, "midtown\nchel").unwrap();

        {
            let mut store = FileCheckpointStore::open(&path).unwrap();
            assert!(store.is_complete("midtown").unwrap());
            assert!(!store.is_complete("chel").unwrap());
            store.mark_complete("soho").unwrap();
        }

        let store = FileCheckpointStore::open(&path).unwrap();
        assert!(store.is_complete("midtown").unwrap());
        assert!(store.is_complete("soho").unwrap());
        assert!(!store.is_complete("chel").unwrap());
        assert!(!store.is_complete("chelsoho").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "midtown\nsoho\n");
    }

    #[test]
    fn test_clear_truncates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");

        let mut store = FileCheckpointStore::open(&path).unwrap();
        store.mark_complete("midtown").unwrap();
        store.clear().unwrap();
        store.mark_complete("soho").unwrap();

        assert!(!store.is_complete("midtown").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "soho\n");
    }
}
