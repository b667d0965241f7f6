//! Sale archive progress for one chain.
//!
//! `<chain dir>/cursor.json` records the last block whose sales are in the
//! archive, so the next `archive` run only scans the delta.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "cursor.json";

/// Archive progress for a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// The last block whose sales have been written to the archive.
    pub last_block: u64,
    /// Chain timestamp of `last_block` (Unix seconds).
    pub last_block_time: u64,
    /// Wall-clock time of the archive run that wrote this cursor.
    pub synced_at: DateTime<Utc>,
}

impl Cursor {
    /// Cursor at `last_block`, stamped with the current time.
    #[must_use]
    pub fn now(last_block: u64, last_block_time: u64) -> Self {
        Self {
            last_block,
            last_block_time,
            synced_at: Utc::now(),
        }
    }

    /// First block the next run has to scan.
    #[must_use]
    pub const fn next_block(&self) -> u64 {
        self.last_block + 1
    }

    /// Read the cursor from `dir`.
    ///
    /// Returns `None` on the first run, and also when the file is corrupted
    /// (logged), which triggers a fresh archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Self>(&data) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupted cursor, archiving from scratch");
                Ok(None)
            }
        }
    }

    /// Write the cursor to `dir` via a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let path = dir.join(FILE_NAME);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("shmdomains-cursor-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_then_load() {
        let dir = scratch_dir("roundtrip");
        let cursor = Cursor::now(1_234, 99);
        cursor.save(&dir).unwrap();

        let loaded = Cursor::load(&dir).unwrap().unwrap();
        assert_eq!(loaded, cursor, "persisted");
        assert_eq!(loaded.next_block(), 1_235, "resume point");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupted_cursor_starts_fresh() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(FILE_NAME), "{not json").unwrap();

        assert_eq!(Cursor::load(&dir).unwrap(), None, "ignored");
        assert_eq!(Cursor::load(&dir.join("missing")).unwrap(), None, "first run");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
