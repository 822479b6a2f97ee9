//! The canonical, persisted document of events keyed by identity hash (§3
//! "Manifest").

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::ManifestEvent;

/// `manifest.json` schema version (§6).
pub const MANIFEST_VERSION: u32 = 2;

/// `{version, generated_at, events: keyed by identity_hash}` (§3).
///
/// `events` is a `BTreeMap` rather than a `HashMap` specifically so that
/// `serde_json`'s default (non-`preserve_order`) serializer emits it with
/// keys already in sorted order - this is what gives §8 invariant 4
/// ("serialized to JSON is byte-identical across runs") for free, with no
/// explicit sort step anywhere in this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub events: BTreeMap<String, ManifestEvent>,
}

impl Manifest {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            generated_at,
            events: BTreeMap::new(),
        }
    }

    pub fn get(&self, identity_hash: &str) -> Option<&ManifestEvent> {
        self.events.get(identity_hash)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn identity_hashes(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(|s| s.as_str())
    }

    /// Insert an event, keyed by its own `identity_hash` (§4.E).
    pub fn insert(&mut self, event: ManifestEvent) {
        self.events.insert(event.identity_hash.clone(), event);
    }

    /// Serialize per §6: keys sorted (free, see above), 2-space indent,
    /// trailing newline, forward slashes unescaped (the default `serde_json`
    /// escaper never escapes `/`).
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut s = serde_json::to_string_pretty(self)?;
        s.push('\n');
        Ok(s)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
