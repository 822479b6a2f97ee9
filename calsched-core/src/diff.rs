//! `Differ` (§4.F): compares two Manifests by identity hash.

use crate::error::{Error, Result};
use crate::event::ManifestEvent;
use crate::manifest::Manifest;

/// `{creates, updates, deletes}`, each a list of Events (not rows), sorted
/// by identity hash (§4.F).
#[derive(Debug, Default)]
pub struct ManifestDiff {
    pub creates: Vec<ManifestEvent>,
    pub updates: Vec<ManifestEvent>,
    pub deletes: Vec<ManifestEvent>,
}

pub struct Differ;

impl Differ {
    /// Diff `next` against `current` (§4.F). Keying is strictly by
    /// `identity_hash`; reordering alone never produces an update, only
    /// `event_state_hash` inequality does. An attempt to mark managed an
    /// identity that's currently unmanaged in `current` is a `SafetyStop`
    /// (no silent takeover, §7).
    pub fn diff(next: &Manifest, current: &Manifest) -> Result<ManifestDiff> {
        let mut out = ManifestDiff::default();

        for (id, next_event) in &next.events {
            match current.get(id) {
                None => {
                    if next_event.ownership.managed {
                        out.creates.push(next_event.clone());
                    }
                }
                Some(current_event) => {
                    if !current_event.ownership.managed && next_event.ownership.managed {
                        return Err(Error::SafetyStop(format!(
                            "identity '{id}' is unmanaged in current but managed in next; refusing silent takeover"
                        )));
                    }
                    if current_event.state_hash != next_event.state_hash {
                        out.updates.push(next_event.clone());
                    }
                }
            }
        }

        for (id, current_event) in &current.events {
            if !current_event.ownership.managed {
                continue;
            }
            if next.get(id).is_none() {
                out.deletes.push(current_event.clone());
            }
        }

        out.creates.sort_by(|a, b| a.identity_hash.cmp(&b.identity_hash));
        out.updates.sort_by(|a, b| a.identity_hash.cmp(&b.identity_hash));
        out.deletes.sort_by(|a, b| a.identity_hash.cmp(&b.identity_hash));
        Ok(out)
    }
}
