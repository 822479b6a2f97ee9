//! Manifest-level event types (§3 "SubEvent", "Event (Manifest Event)").

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ViolationContext};
use crate::hash;
use crate::identity::Identity;
use crate::timing::{DateSpec, TimeSpec, Timing};

/// How a stopped/disabled sub-event winds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Graceful,
    Hard,
    GracefulLoop,
}

impl Default for StopType {
    fn default() -> Self {
        StopType::Graceful
    }
}

/// Repeat/loop behavior for a sub-event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    None,
    Loop,
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::None
    }
}

/// Behavior flags (§4.C step 4): `enabled` defaults true, `repeat` defaults
/// none (or a provider-specific default for commands, applied by the
/// scheduler adapter before this struct is built), `stop_type` defaults
/// graceful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    pub enabled: bool,
    pub repeat: Repeat,
    pub stop_type: StopType,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior {
            enabled: true,
            repeat: Repeat::default(),
            stop_type: StopType::default(),
        }
    }
}

/// Symbolic tokens retained alongside a sub-event's fully hard-resolved
/// timing (§4.C step 2b: "to `hard` + a retained `symbolic` companion in
/// the payload, never in identity").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicCompanion {
    pub start_date: Option<DateSpec>,
    pub end_date: Option<DateSpec>,
    pub start_time: Option<TimeSpec>,
    pub end_time: Option<TimeSpec>,
}

impl SymbolicCompanion {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none()
            && self.end_date.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

/// Opaque payload carried by a sub-event: summary/description plus the
/// resolved-symbolic companion plus whatever the source carried that isn't
/// otherwise modeled (custom properties, etc).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub summary: Option<String>,
    pub is_override: bool,
    pub symbolic: SymbolicCompanion,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One executable leaf: one scheduler row ↔ one SubEvent (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEvent {
    pub timing: Timing,
    pub behavior: Behavior,
    pub payload: Payload,
    pub state_hash: String,
}

impl SubEvent {
    /// Compute `state_hash = H(canonical(timing ⊕ behavior ⊕ payload))`
    /// (§4.C step 8) and return a copy with it filled in.
    pub fn finalize(timing: Timing, behavior: Behavior, payload: Payload) -> Self {
        #[derive(Serialize)]
        struct StateMaterial<'a> {
            timing: &'a Timing,
            behavior: &'a Behavior,
            payload: &'a Payload,
        }
        let state_hash = hash::hash_of(&StateMaterial {
            timing: &timing,
            behavior: &behavior,
            payload: &payload,
        });
        SubEvent {
            timing,
            behavior,
            payload,
            state_hash,
        }
    }
}

/// Ownership bits (§3, §4.C step 5). `locked` is carried only from the
/// last-applied Manifest, never recomputed from a fresh intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub managed: bool,
    pub locked: bool,
    pub controller: Option<String>,
}

impl Ownership {
    pub fn managed_by(controller: impl Into<String>) -> Self {
        Ownership {
            managed: true,
            locked: false,
            controller: Some(controller.into()),
        }
    }

    pub fn unmanaged() -> Self {
        Ownership {
            managed: false,
            locked: false,
            controller: None,
        }
    }
}

/// Cross-source correlation (§3, §4.C step 6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub source_uid: Option<String>,
    pub external_ids: Vec<String>,
    pub calendar_scope: Option<String>,
}

/// Source-side timestamps carried through for provenance/debugging, not
/// used by any invariant (§6 "provenance").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub updated_at_epoch: Option<i64>,
    pub created_at_epoch: Option<i64>,
    pub dtstamp_epoch: Option<i64>,
}

/// A canonical Manifest event (§3 "Event (Manifest Event)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEvent {
    pub id: String,
    pub identity_hash: String,
    pub state_hash: String,
    pub identity: Identity,
    pub ownership: Ownership,
    pub correlation: Correlation,
    pub provenance: Provenance,
    pub sub_events: Vec<SubEvent>,
}

impl ManifestEvent {
    /// Build a Manifest event from its parts, computing `state_hash` from
    /// `sub_events` in order (§3, §4.C step 8) and validating invariants
    /// (§7: managed event has ≥1 sub-event; `id == identity_hash`).
    pub fn build(
        identity: Identity,
        ownership: Ownership,
        correlation: Correlation,
        provenance: Provenance,
        sub_events: Vec<SubEvent>,
    ) -> Result<Self> {
        let identity_hash = crate::identity::IdentityKernel::hash(&identity);
        let state_hash = hash::hash_ordered(sub_events.iter().map(|s| s.state_hash.as_str()));

        let event = ManifestEvent {
            id: identity_hash.clone(),
            identity_hash,
            state_hash,
            identity,
            ownership,
            correlation,
            provenance,
            sub_events,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ownership.managed && self.sub_events.is_empty() {
            return Err(Error::invariant(
                "managed event has zero sub-events",
                ViolationContext::new().with_id(self.id.clone()),
            ));
        }
        if self.id != self.identity_hash {
            return Err(Error::invariant(
                "event id does not match its identity hash",
                ViolationContext::new()
                    .with_id(self.id.clone())
                    .with_field("id")
                    .with_stored(self.id.clone())
                    .with_computed(self.identity_hash.clone()),
            ));
        }
        crate::identity::IdentityKernel::validate(&self.identity)?;
        let recomputed = crate::identity::IdentityKernel::hash(&self.identity);
        if recomputed != self.identity_hash {
            return Err(Error::invariant(
                "stored identity_hash does not match the hash recomputed from identity",
                ViolationContext::new()
                    .with_id(self.id.clone())
                    .with_field("identity_hash")
                    .with_stored(self.identity_hash.clone())
                    .with_computed(recomputed),
            ));
        }
        for (i, sub) in self.sub_events.iter().enumerate() {
            if sub.state_hash.is_empty() {
                return Err(Error::invariant(
                    format!("sub-event {i} missing state hash"),
                    ViolationContext::new().with_id(self.id.clone()),
                ));
            }
        }
        Ok(())
    }
}
