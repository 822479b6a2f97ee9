//! JSON-file-backed `SchedulerReader`/`SchedulerWriter` (§6), the CLI's
//! stand-in for the real playlist/command scheduler's on-disk list. Atomic
//! replace follows the same temp-write-then-rename shape as
//! `calsched_core::store::StateStore` (itself grounded on
//! `caldir-core/src/calendar_state.rs::CalendarState::save`).

use std::path::{Path, PathBuf};

use calsched_core::scheduler_row::{SchedulerReader, SchedulerRow, SchedulerWriter};
use calsched_core::{Error, Result};

pub struct JsonSchedulerFile {
    path: PathBuf,
}

impl JsonSchedulerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSchedulerFile { path: path.into() }
    }

    /// The schedule file's own mtime, in epoch seconds - the single signal
    /// `StateStore::rebuild_updated_at_from_schedule_mtime` seeds missing
    /// per-identity timestamps from, since individual scheduler rows carry
    /// no timestamp of their own.
    pub fn mtime_epoch(&self) -> Result<i64> {
        let metadata = std::fs::metadata(&self.path)?;
        let modified = metadata.modified()?;
        let epoch = modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(epoch)
    }
}

impl SchedulerReader for JsonSchedulerFile {
    fn read(&self) -> Result<Vec<SchedulerRow>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl SchedulerWriter for JsonSchedulerFile {
    fn write(&self, rows: &[SchedulerRow]) -> Result<()> {
        atomic_write(&self.path, &serde_json::to_string_pretty(rows)?)
    }
}

fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
