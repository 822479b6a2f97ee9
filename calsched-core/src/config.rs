//! Ambient pipeline configuration (SPEC_FULL.md §1.3), grounded on
//! `caldir-core/src/config/global_config.rs`'s `GlobalConfig`: a
//! `~/.config/<name>/config.toml` loaded with `toml`/`serde`, falling back
//! to defaults when absent.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::reconcile::SyncMode;

fn default_horizon_days() -> i64 {
    90
}

fn default_sync_mode() -> String {
    "both".into()
}

fn default_calendar_scope() -> String {
    "default".into()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("~/.local/state/calsched")
}

fn default_calendar_source() -> String {
    String::new()
}

fn default_scheduler_path() -> PathBuf {
    PathBuf::from("~/.local/state/calsched/schedule.json")
}

/// `PipelineConfig` (§4.A horizon `H`, §4.G `sync_mode`, active
/// `calendar_scope`, state directory). Deserialized straight from
/// `config.toml`; `sync_mode` is kept as a string on the wire (readable
/// config files) and converted to [`SyncMode`] by [`Self::sync_mode`].
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,

    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,

    #[serde(default = "default_calendar_scope")]
    pub calendar_scope: String,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// An `http(s)://` URL or a local file path; `calsched-cli` decides
    /// which by the scheme (§1.4).
    #[serde(default = "default_calendar_source")]
    pub calendar_source: String,

    #[serde(default = "default_scheduler_path")]
    pub scheduler_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            horizon_days: default_horizon_days(),
            sync_mode: default_sync_mode(),
            calendar_scope: default_calendar_scope(),
            state_dir: default_state_dir(),
            calendar_source: default_calendar_source(),
            scheduler_path: default_scheduler_path(),
        }
    }
}

impl PipelineConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".into()))?
            .join("calsched");
        Ok(config_dir.join("config.toml"))
    }

    /// Loads `path` if it exists, otherwise returns the default
    /// configuration - there is no "create a default file" step here since
    /// this pipeline runs unattended, with no interactive setup prompt.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn sync_mode(&self) -> Result<SyncMode> {
        match self.sync_mode.as_str() {
            "both" => Ok(SyncMode::Both),
            "calendar_to_scheduler" => Ok(SyncMode::CalendarToScheduler),
            "scheduler_to_calendar" => Ok(SyncMode::SchedulerToCalendar),
            other => Err(Error::Config(format!("unknown sync_mode '{other}'"))),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        expand_tilde(&self.state_dir)
    }

    pub fn scheduler_path(&self) -> PathBuf {
        expand_tilde(&self.scheduler_path)
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let Some(path_str) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
