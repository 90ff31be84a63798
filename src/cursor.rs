//! Durable cursor persistence
//!
//! The cursor is a single decimal integer in a text file: the last sequence
//! number fully processed. Saves go through a sibling temp file in the same
//! directory followed by an atomic rename, so a crash mid-write leaves
//! either the old value or the new one, never a torn file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum PersistenceError {
    Io(std::io::Error),
    /// Cursor file exists but does not hold a decimal integer
    Corrupt(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "Cursor I/O error: {}", e),
            PersistenceError::Corrupt(s) => write!(f, "Corrupt cursor file: {:?}", s),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

/// File-backed cursor store with atomic-replace writes
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted cursor; 0 when no file exists yet
    pub fn load(&self) -> Result<u64, PersistenceError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let contents = fs::read_to_string(&self.path)?;
        let trimmed = contents.trim();
        trimmed
            .parse()
            .map_err(|_| PersistenceError::Corrupt(trimmed.to_string()))
    }

    /// Persist the cursor crash-safely.
    ///
    /// Writes to `<path>.tmp`, syncs, then renames over the target. On any
    /// failure the temp artifact is removed and the previous file is left
    /// intact.
    pub fn save(&self, value: u64) -> Result<(), PersistenceError> {
        let tmp_path = self.tmp_path();

        let result = (|| -> Result<(), PersistenceError> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(value.to_string().as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        })();

        if result.is_err() && tmp_path.exists() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
