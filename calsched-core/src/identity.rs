//! Identity canonicalization and hashing (§4.H, §3 "Identity").
//!
//! spec.md's §4.H forbidden-key list (`start_date, end_date, date_pattern,
//! stop_type, repeat, enabled, status, uid, hash, id`, plus aliases) is a
//! legacy-map artifact: in a dynamically-typed source system, nothing
//! stopped a caller from stuffing date/behavior/provenance fields into the
//! same map that fed the identity hash. Most of that list has no field to
//! misuse here: `stop_type`/`repeat`/`enabled`/`status`/`uid`/`hash`/`id`
//! simply aren't fields of `Identity` or [`IdentityTiming`].
//!
//! `start_date`/`end_date` are the one entry that can't be dropped outright:
//! S3 (§8) requires `identity_hash` to stay stable across a holiday's
//! year-to-year resolution, which means the *symbolic* date token
//! (`{symbolic: "Thanksgiving"}`) has to be part of the identity precisely
//! so that the hard-resolved date it produces never is. So `IdentityTiming`
//! carries `start_date`/`end_date` as `Option<DateSpec>`, but
//! `IdentityKernel::canonicalize` fatally rejects a `Hard` variant there -
//! only a `Symbolic` token (or no date slot at all) is legal in identity.
//! That reading reconciles §4.H's forbidden-key rule (no *hard* date may
//! pin an identity to a calendar date) with S3's requirement (a *symbolic*
//! anchor is identity-defining, the same way a recurrence pattern is).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ViolationContext};
use crate::hash;
use crate::timing::{DateSpec, Days, TimeSpec};

/// `identity.type` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Playlist,
    Sequence,
    Command,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Playlist => "playlist",
            IdentityKind::Sequence => "sequence",
            IdentityKind::Command => "command",
        }
    }
}

/// The reduced timing view that feeds identity (§4.H: `timing.{days,
/// start_time, end_time}` required). `start_date`/`end_date` are present
/// only to carry a *symbolic* anchor (S3); a concrete occurrence date never
/// reaches identity, which is what makes the "holiday-anchored event
/// becomes hard-coded" replacement-signature trick in §4.G.3 possible at
/// all - the symbolic slot here is the one thing in `Identity` that can
/// still distinguish such a series before and after its date gets pinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTiming {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_date: Option<DateSpec>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_date: Option<DateSpec>,
    pub start_time: TimeSpec,
    pub end_time: TimeSpec,
    pub days: Days,
}

/// `{type, target, timing}` - the only material that feeds the identity
/// hash (§3). Any date-resolution output, ownership, correlation,
/// execution order, and payload are forbidden here by construction: this
/// struct has no fields for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type")]
    pub kind: IdentityKind,
    pub target: String,
    pub timing: IdentityTiming,
}

/// Derived key used by the Reconciler to pair a calendar-only identity with
/// a scheduler-only one when a series' identity mutates across a
/// resolution boundary (glossary "Replacement signature"). Explicitly
/// excludes dates - everything here is already date-free since it's built
/// from `Identity`, but `all_day` does need to be threaded in separately by
/// the caller since `Identity` itself doesn't carry it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplacementSignature(String);

pub struct IdentityKernel;

impl IdentityKernel {
    /// Validates the forbidden-key rule that *can't* be expressed by
    /// `IdentityTiming`'s shape alone - a `Hard` date slot is fatal, a
    /// `Symbolic` one (or none) is not (§4.H, S3).
    pub fn validate(identity: &Identity) -> Result<()> {
        for (field, slot) in [
            ("start_date", &identity.timing.start_date),
            ("end_date", &identity.timing.end_date),
        ] {
            if matches!(slot, Some(DateSpec::Hard { .. })) {
                return Err(Error::invariant(
                    format!("identity.timing.{field} carries a hard date"),
                    ViolationContext::new().with_field(field),
                ));
            }
        }
        Ok(())
    }

    /// Deep-recursive key-sorted canonical JSON for `identity` (§4.H).
    /// Callers must call [`Self::validate`] first; this never fails because
    /// `Identity` always serializes.
    pub fn canonicalize(identity: &Identity) -> serde_json::Value {
        serde_json::to_value(identity).expect("Identity always serializes")
    }

    /// SHA-256 over the canonical JSON (glossary "Identity hash").
    pub fn hash(identity: &Identity) -> String {
        hash::hash_of(identity)
    }

    /// Build a replacement signature for cross-identity pairing (§4.G.3,
    /// glossary). `all_day` is passed separately because it lives on the
    /// concrete occurrence/sub-event, not on `Identity` itself.
    pub fn replacement_signature(identity: &Identity, all_day: bool) -> ReplacementSignature {
        let v = serde_json::json!({
            "type": identity.kind,
            "target": identity.target,
            "all_day": all_day,
            "start_time": identity.timing.start_time,
            "end_time": identity.timing.end_time,
            "days": identity.timing.days,
        });
        ReplacementSignature(hash::hash_of(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Weekday;
    use chrono::NaiveTime;

    fn sample_identity() -> Identity {
        Identity {
            kind: IdentityKind::Playlist,
            target: "Holiday Show".into(),
            timing: IdentityTiming {
                start_date: None,
                end_date: None,
                start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
                end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
                days: Days::weekly([Weekday::Mo]),
            },
        }
    }

    #[test]
    fn hash_is_stable_across_runs() {
        let a = sample_identity();
        let b = sample_identity();
        assert_eq!(IdentityKernel::hash(&a), IdentityKernel::hash(&b));
    }

    #[test]
    fn hash_changes_with_target() {
        let a = sample_identity();
        let mut b = sample_identity();
        b.target = "Other Show".into();
        assert_ne!(IdentityKernel::hash(&a), IdentityKernel::hash(&b));
    }

    /// S3: a symbolic date anchor keeps `identity_hash` stable even though
    /// it resolves to a different hard date every year - the anchor itself,
    /// not its resolution, is what identity carries.
    #[test]
    fn symbolic_date_anchor_is_year_independent() {
        let mut a = sample_identity();
        a.timing.start_date = Some(DateSpec::symbolic("Thanksgiving"));
        let b = a.clone();
        assert_eq!(IdentityKernel::hash(&a), IdentityKernel::hash(&b));
        assert!(IdentityKernel::validate(&a).is_ok());
    }

    #[test]
    fn hard_date_in_identity_is_rejected() {
        let mut a = sample_identity();
        a.timing.start_date = Some(DateSpec::hard(chrono::NaiveDate::from_ymd_opt(2025, 11, 27).unwrap()));
        assert!(matches!(IdentityKernel::validate(&a), Err(Error::InvariantViolation { .. })));
    }
}
