//! `StateStore` (§4.I): persists the Manifest, tombstone table, and
//! per-identity update timestamps under a state directory, with atomic
//! temp-write-then-rename replace (grounded on `CalendarState::save` in the
//! teacher's `caldir-core/src/calendar_state.rs`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ViolationContext};
use crate::event::ManifestEvent;
use crate::manifest::Manifest;
use crate::reconcile::Tombstones;

const EVENT_TIMESTAMPS_VERSION: u32 = 1;

/// One identity's last-known `updated_at`/`last_seen`/`state_hash` (§6
/// `event-timestamps.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTimestampEntry {
    pub updated_at_epoch: i64,
    pub last_seen_epoch: i64,
    pub state_hash: String,
}

/// `event-timestamps.json`: `{version, schedule_mtime_epoch, events}` (§6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTimestamps {
    pub version: u32,
    pub schedule_mtime_epoch: Option<i64>,
    pub events: BTreeMap<String, EventTimestampEntry>,
}

impl EventTimestamps {
    fn empty() -> Self {
        EventTimestamps {
            version: EVENT_TIMESTAMPS_VERSION,
            schedule_mtime_epoch: None,
            events: BTreeMap::new(),
        }
    }

    pub fn updated_at_map(&self) -> BTreeMap<String, i64> {
        self.events.iter().map(|(id, e)| (id.clone(), e.updated_at_epoch)).collect()
    }
}

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        StateStore { dir: dir.into() }
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    fn draft_path(&self) -> PathBuf {
        self.dir.join("manifest.draft.json")
    }

    fn timestamps_path(&self) -> PathBuf {
        self.dir.join("event-timestamps.json")
    }

    fn tombstones_path(&self) -> PathBuf {
        self.dir.join("tombstones.json")
    }

    /// `None` on first run, before any Manifest has ever been saved.
    pub fn load_manifest(&self) -> Result<Option<Manifest>> {
        let Some(raw) = read_optional(&self.manifest_path())? else {
            return Ok(None);
        };
        let manifest = Manifest::from_json(&raw)?;
        for event in manifest.events.values() {
            event.validate()?;
        }
        Ok(Some(manifest))
    }

    /// Validates every event before the atomic replace; a partially-invalid
    /// Manifest never reaches disk (§7: IOError/invariant failures leave
    /// prior state intact).
    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        for event in manifest.events.values() {
            event.validate()?;
        }
        atomic_write(&self.manifest_path(), &manifest.to_pretty_json()?)
    }

    /// Non-invariant-enforcing variant used while an adoption is staged but
    /// not yet confirmed.
    pub fn load_draft(&self) -> Result<Option<Manifest>> {
        read_optional(&self.draft_path())?.map(|raw| Manifest::from_json(&raw)).transpose()
    }

    pub fn save_draft(&self, manifest: &Manifest) -> Result<()> {
        atomic_write(&self.draft_path(), &manifest.to_pretty_json()?)
    }

    /// Insert or replace `event` in `manifest`, recomputing nothing but
    /// validating that an existing entry at this id isn't silently mutated
    /// into a different identity (a hash collision, or a caller bug) and
    /// that the event is internally consistent before it lands in memory.
    pub fn upsert_event(&self, manifest: &mut Manifest, event: ManifestEvent) -> Result<()> {
        event.validate()?;
        if let Some(existing) = manifest.events.get(&event.identity_hash) {
            if existing.identity != event.identity {
                return Err(Error::invariant(
                    "upsert_event would mutate the identity of an existing id",
                    ViolationContext::new().with_id(event.identity_hash.clone()),
                ));
            }
        }
        manifest.insert(event);
        Ok(())
    }

    pub fn load_tombstones(&self) -> Result<Tombstones> {
        match read_optional(&self.tombstones_path())? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Tombstones::default()),
        }
    }

    pub fn save_tombstones(&self, tombstones: &Tombstones) -> Result<()> {
        let mut s = serde_json::to_string_pretty(tombstones)?;
        s.push('\n');
        atomic_write(&self.tombstones_path(), &s)
    }

    pub fn load_updated_at(&self) -> Result<EventTimestamps> {
        match read_optional(&self.timestamps_path())? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(EventTimestamps::empty()),
        }
    }

    pub fn save_updated_at(&self, timestamps: &EventTimestamps) -> Result<()> {
        let mut s = serde_json::to_string_pretty(timestamps)?;
        s.push('\n');
        atomic_write(&self.timestamps_path(), &s)
    }

    /// When the scheduler's own schedule file was touched (its mtime moved)
    /// but no per-identity timestamp was recorded for one of its rows -
    /// typically the very first run, or a row written outside this tool -
    /// seed that identity's `updated_at_epoch` from the file's mtime rather
    /// than leaving it at zero (which would make it permanently "oldest"
    /// in the §4.G step 6 last-writer-wins comparison).
    pub fn rebuild_updated_at_from_schedule_mtime(
        &self,
        schedule_mtime_epoch: i64,
        manifest: &Manifest,
        now_epoch: i64,
    ) -> Result<EventTimestamps> {
        let mut timestamps = self.load_updated_at()?;
        timestamps.schedule_mtime_epoch = Some(schedule_mtime_epoch);
        for (id, event) in &manifest.events {
            timestamps.events.entry(id.clone()).or_insert_with(|| EventTimestampEntry {
                updated_at_epoch: schedule_mtime_epoch,
                last_seen_epoch: now_epoch,
                state_hash: event.state_hash.clone(),
            });
        }
        Ok(timestamps)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Correlation, Ownership, Payload, Provenance, SubEvent};
    use crate::identity::{Identity, IdentityKind, IdentityTiming};
    use crate::timing::{DateSpec, Days, TimeSpec, Timing};
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn sample_event() -> ManifestEvent {
        let identity = Identity {
            kind: IdentityKind::Playlist,
            target: "Show".into(),
            timing: IdentityTiming {
                start_date: None,
                end_date: None,
                start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
                end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
                days: Days::None,
            },
        };
        let sub_event = SubEvent::finalize(
            Timing {
                start_date: DateSpec::hard(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
                end_date: DateSpec::hard(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
                start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
                end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
                days: Days::None,
            },
            Default::default(),
            Payload::default(),
        );
        ManifestEvent::build(
            identity,
            Ownership::managed_by("calendar"),
            Correlation::default(),
            Provenance::default(),
            vec![sub_event],
        )
        .unwrap()
    }

    #[test]
    fn manifest_round_trips_through_atomic_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load_manifest().unwrap().is_none());

        let mut manifest = Manifest::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        manifest.insert(sample_event());
        store.save_manifest(&manifest).unwrap();

        let loaded = store.load_manifest().unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }

    #[test]
    fn tombstones_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut tombstones = Tombstones::default();
        tombstones.calendar.insert("abc".into(), 1000);
        store.save_tombstones(&tombstones).unwrap();
        let loaded = store.load_tombstones().unwrap();
        assert_eq!(loaded.calendar.get("abc"), Some(&1000));
        assert!(loaded.scheduler.is_empty());
    }

    #[test]
    fn upsert_event_rejects_identity_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut manifest = Manifest::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let event = sample_event();
        store.upsert_event(&mut manifest, event.clone()).unwrap();

        let mut mutated = event.clone();
        mutated.identity.target = "Different Show".into();
        // identity_hash/id deliberately left stale to simulate a caller bug.
        let err = store.upsert_event(&mut manifest, mutated).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));
    }

    #[test]
    fn rebuild_from_mtime_seeds_missing_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut manifest = Manifest::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let event = sample_event();
        let id = event.identity_hash.clone();
        manifest.insert(event);

        let timestamps = store.rebuild_updated_at_from_schedule_mtime(5000, &manifest, 6000).unwrap();
        assert_eq!(timestamps.events.get(&id).unwrap().updated_at_epoch, 5000);
        store.save_updated_at(&timestamps).unwrap();

        // A second rebuild at a later mtime must not clobber the seeded entry.
        let second = store.rebuild_updated_at_from_schedule_mtime(9000, &manifest, 9500).unwrap();
        assert_eq!(second.events.get(&id).unwrap().updated_at_epoch, 5000);
        assert_eq!(second.schedule_mtime_epoch, Some(9000));
    }
}
