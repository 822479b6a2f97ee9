//! `Reconciler` (§4.G): three-way merge of calendar-derived,
//! scheduler-derived, and last-applied Manifests into a target Manifest
//! plus a deterministically-ordered list of directional actions.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::event::ManifestEvent;
use crate::identity::IdentityKernel;
use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Both,
    CalendarToScheduler,
    SchedulerToCalendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    Scheduler,
    Calendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Noop,
    Block,
}

/// `{type, target, authority, identity_hash, reason, event?}` (§4.G).
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub target: Target,
    pub authority: Target,
    pub identity_hash: String,
    pub reason: String,
    pub event: Option<ManifestEvent>,
}

impl Action {
    /// Actions the caller should actually execute - `noop`/`block` carry no
    /// side effect.
    pub fn is_executable(&self) -> bool {
        matches!(self.kind, ActionKind::Create | ActionKind::Update | ActionKind::Delete)
    }
}

/// Per-source tombstone table (§3 "Tombstone table"): `identity_hash →
/// epoch_seconds` recording an observed absence.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Tombstones {
    pub calendar: BTreeMap<String, i64>,
    pub scheduler: BTreeMap<String, i64>,
}

pub struct ReconcileInput<'a> {
    pub cal_manifest: &'a Manifest,
    pub fpp_manifest: &'a Manifest,
    pub current_manifest: &'a Manifest,
    pub cal_updated_at: &'a BTreeMap<String, i64>,
    pub fpp_updated_at: &'a BTreeMap<String, i64>,
    pub tombstones: &'a Tombstones,
    pub cal_snapshot_epoch: i64,
    pub fpp_snapshot_epoch: i64,
    pub sync_mode: SyncMode,
    pub calendar_scope: &'a str,
}

pub struct ReconcileOutput {
    pub target_manifest: Manifest,
    pub actions: Vec<Action>,
}

pub struct Reconciler;

impl Reconciler {
    /// Run the per-identity decision table (§4.G) and return the merged
    /// target Manifest plus the sorted action list.
    pub fn reconcile(input: ReconcileInput) -> Result<ReconcileOutput> {
        // Step 2: safety stop - both sources non-empty, zero shared identities.
        if !input.cal_manifest.is_empty() && !input.fpp_manifest.is_empty() {
            let shares_any = input
                .cal_manifest
                .identity_hashes()
                .any(|id| input.fpp_manifest.get(id).is_some());
            if !shares_any {
                return Err(Error::SafetyStop(
                    "calendar and scheduler manifests are both non-empty but share no identities"
                        .into(),
                ));
            }
        }

        let replacement_tombstones = Self::infer_replacement_tombstones(
            input.cal_manifest,
            input.fpp_manifest,
            input.cal_updated_at,
            input.fpp_updated_at,
            input.cal_snapshot_epoch,
            input.fpp_snapshot_epoch,
        );

        let mut ids: BTreeSet<String> = BTreeSet::new();
        ids.extend(input.cal_manifest.identity_hashes().map(String::from));
        ids.extend(input.fpp_manifest.identity_hashes().map(String::from));
        ids.extend(input.current_manifest.identity_hashes().map(String::from));

        let mut target = Manifest::new(input.current_manifest.generated_at);
        let mut actions = Vec::new();

        for id in ids {
            let cal_e = input.cal_manifest.get(&id);
            let fpp_e = input.fpp_manifest.get(&id);
            let cur_e = input.current_manifest.get(&id);

            // Step 1: lock/unmanaged preservation.
            if let Some(cur) = cur_e {
                if cur.ownership.locked {
                    target.insert(cur.clone());
                    actions.push(Action {
                        kind: ActionKind::Block,
                        target: Target::Scheduler,
                        authority: Target::Scheduler,
                        identity_hash: id.clone(),
                        reason: "locked".into(),
                        event: Some(cur.clone()),
                    });
                    continue;
                }
                if !cur.ownership.managed {
                    target.insert(cur.clone());
                    actions.push(Action {
                        kind: ActionKind::Noop,
                        target: Target::Scheduler,
                        authority: Target::Scheduler,
                        identity_hash: id.clone(),
                        reason: "unmanaged".into(),
                        event: Some(cur.clone()),
                    });
                    continue;
                }
            }

            if input.sync_mode != SyncMode::Both {
                Self::decide_one_way(input.sync_mode, &id, cal_e, fpp_e, cur_e, &mut target, &mut actions);
                continue;
            }

            match (cal_e, fpp_e) {
                (Some(cal), Some(fpp)) if cal.state_hash == fpp.state_hash => {
                    // Step 4: converged; winner is calendar (arbitrary, stable).
                    let event = Self::merge_correlation(cal.clone(), cur_e);
                    target.insert(event.clone());
                    actions.push(Self::noop(Target::Calendar, Target::Calendar, &id, "converged", &event));
                    actions.push(Self::noop(Target::Scheduler, Target::Calendar, &id, "converged", &event));
                }
                (Some(cal), Some(fpp)) => {
                    // Step 6: later updated_at wins; a tie favors scheduler.
                    let cal_u = input.cal_updated_at.get(&id).copied().unwrap_or(0);
                    let fpp_u = input.fpp_updated_at.get(&id).copied().unwrap_or(0);
                    let (winner, authority, loser_target, loser_event) = if cal_u > fpp_u {
                        (cal, Target::Calendar, Target::Scheduler, fpp)
                    } else {
                        (fpp, Target::Scheduler, Target::Calendar, cal)
                    };
                    let event = Self::merge_correlation(winner.clone(), cur_e);
                    target.insert(event.clone());
                    actions.push(Self::noop(authority, authority, &id, "last_writer", &event));
                    let kind = if loser_event.state_hash == event.state_hash {
                        ActionKind::Noop
                    } else {
                        ActionKind::Update
                    };
                    actions.push(Action {
                        kind,
                        target: loser_target,
                        authority,
                        identity_hash: id.clone(),
                        reason: "last_writer".into(),
                        event: Some(event),
                    });
                }
                (Some(cal), None) => {
                    let tomb = input
                        .tombstones
                        .scheduler
                        .get(&id)
                        .copied()
                        .or_else(|| replacement_tombstones.scheduler.get(&id).copied());
                    let cal_u = input.cal_updated_at.get(&id).copied().unwrap_or(0);
                    if tomb.is_some_and(|t| t >= cal_u) {
                        actions.push(Self::delete(Target::Calendar, Target::Scheduler, &id, "tombstone"));
                    } else {
                        let event = Self::merge_correlation(cal.clone(), cur_e);
                        target.insert(event.clone());
                        actions.push(Self::noop(Target::Calendar, Target::Calendar, &id, "present", &event));
                        actions.push(Self::create(Target::Scheduler, Target::Calendar, &id, "present", &event));
                    }
                }
                (None, Some(fpp)) => {
                    let tomb = input
                        .tombstones
                        .calendar
                        .get(&id)
                        .copied()
                        .or_else(|| replacement_tombstones.calendar.get(&id).copied());
                    let scope_trusted = cur_e.map_or(true, |c| {
                        c.correlation.calendar_scope.as_deref() == Some(input.calendar_scope)
                    });
                    let fpp_u = input.fpp_updated_at.get(&id).copied().unwrap_or(0);
                    if scope_trusted && tomb.is_some_and(|t| t >= fpp_u) {
                        actions.push(Self::delete(Target::Scheduler, Target::Calendar, &id, "tombstone"));
                    } else {
                        let event = Self::merge_correlation(fpp.clone(), cur_e);
                        target.insert(event.clone());
                        actions.push(Self::noop(Target::Scheduler, Target::Scheduler, &id, "present", &event));
                        actions.push(Self::create(Target::Calendar, Target::Scheduler, &id, "present", &event));
                    }
                }
                (None, None) => {
                    // Neither source has it anymore (both tombstoned, or a
                    // stale `current` entry); nothing to carry forward.
                }
            }
        }

        actions.sort_by(|a, b| {
            (a.identity_hash.as_str(), a.target, a.kind).cmp(&(b.identity_hash.as_str(), b.target, b.kind))
        });
        Ok(ReconcileOutput {
            target_manifest: target,
            actions,
        })
    }

    fn decide_one_way(
        mode: SyncMode,
        id: &str,
        cal_e: Option<&ManifestEvent>,
        fpp_e: Option<&ManifestEvent>,
        cur_e: Option<&ManifestEvent>,
        target: &mut Manifest,
        actions: &mut Vec<Action>,
    ) {
        let (authoritative_event, authority, other_target, other_existing) = match mode {
            SyncMode::CalendarToScheduler => (cal_e, Target::Calendar, Target::Scheduler, fpp_e),
            SyncMode::SchedulerToCalendar => (fpp_e, Target::Scheduler, Target::Calendar, cal_e),
            SyncMode::Both => unreachable!("caller filters out Both"),
        };
        match authoritative_event {
            Some(auth) => {
                let event = Self::merge_correlation(auth.clone(), cur_e);
                target.insert(event.clone());
                actions.push(Self::noop(authority, authority, id, "one_way", &event));
                let kind = match other_existing {
                    None => ActionKind::Create,
                    Some(ex) if ex.state_hash != event.state_hash => ActionKind::Update,
                    Some(_) => ActionKind::Noop,
                };
                actions.push(Action {
                    kind,
                    target: other_target,
                    authority,
                    identity_hash: id.to_string(),
                    reason: "one_way".into(),
                    event: Some(event),
                });
            }
            None => {
                if other_existing.is_some() {
                    actions.push(Self::delete(other_target, authority, id, "one_way"));
                }
            }
        }
    }

    fn noop(target: Target, authority: Target, id: &str, reason: &str, event: &ManifestEvent) -> Action {
        Action {
            kind: ActionKind::Noop,
            target,
            authority,
            identity_hash: id.to_string(),
            reason: reason.to_string(),
            event: Some(event.clone()),
        }
    }

    fn create(target: Target, authority: Target, id: &str, reason: &str, event: &ManifestEvent) -> Action {
        Action {
            kind: ActionKind::Create,
            target,
            authority,
            identity_hash: id.to_string(),
            reason: reason.to_string(),
            event: Some(event.clone()),
        }
    }

    fn delete(target: Target, authority: Target, id: &str, reason: &str) -> Action {
        Action {
            kind: ActionKind::Delete,
            target,
            authority,
            identity_hash: id.to_string(),
            reason: reason.to_string(),
            event: None,
        }
    }

    /// Merges correlation lineage (`source_uid`, `external_ids`,
    /// `calendar_scope`) from `current` into `winner` wherever `winner`
    /// left a slot empty (§4.G: "merged into the winning event when
    /// missing - lineage is preserved across authority changes").
    fn merge_correlation(mut winner: ManifestEvent, current: Option<&ManifestEvent>) -> ManifestEvent {
        if let Some(cur) = current {
            if winner.correlation.source_uid.is_none() {
                winner.correlation.source_uid = cur.correlation.source_uid.clone();
            }
            if winner.correlation.external_ids.is_empty() {
                winner.correlation.external_ids = cur.correlation.external_ids.clone();
            }
            if winner.correlation.calendar_scope.is_none() {
                winner.correlation.calendar_scope = cur.correlation.calendar_scope.clone();
            }
        }
        winner
    }

    /// Step 3: cross-identity replacement inference. Pairs a calendar-only
    /// identity with a scheduler-only identity sharing a replacement
    /// signature, and has the *older* side (by `updated_at`) receive a
    /// synthetic tombstone timestamped at the snapshot epoch - "observed
    /// absent just now" - so the normal presence/absence rule (step 5)
    /// retires it instead of both sides creating a duplicate.
    fn infer_replacement_tombstones(
        cal_manifest: &Manifest,
        fpp_manifest: &Manifest,
        cal_updated_at: &BTreeMap<String, i64>,
        fpp_updated_at: &BTreeMap<String, i64>,
        cal_snapshot_epoch: i64,
        fpp_snapshot_epoch: i64,
    ) -> Tombstones {
        let mut out = Tombstones::default();

        let cal_only: Vec<&ManifestEvent> = cal_manifest
            .events
            .values()
            .filter(|e| fpp_manifest.get(&e.identity_hash).is_none())
            .collect();
        let mut fpp_only_by_sig: BTreeMap<String, &ManifestEvent> = BTreeMap::new();
        for e in fpp_manifest.events.values() {
            if cal_manifest.get(&e.identity_hash).is_none() {
                let sig = IdentityKernel::replacement_signature(&e.identity, e.sub_events.first().map_or(false, |s| s.payload.is_override));
                fpp_only_by_sig.insert(format!("{sig:?}"), e);
            }
        }

        for cal_e in cal_only {
            let sig = IdentityKernel::replacement_signature(
                &cal_e.identity,
                cal_e.sub_events.first().map_or(false, |s| s.payload.is_override),
            );
            if let Some(fpp_e) = fpp_only_by_sig.get(&format!("{sig:?}")) {
                let cal_u = cal_updated_at.get(&cal_e.identity_hash).copied().unwrap_or(0);
                let fpp_u = fpp_updated_at.get(&fpp_e.identity_hash).copied().unwrap_or(0);
                if cal_u <= fpp_u {
                    out.scheduler.insert(cal_e.identity_hash.clone(), cal_snapshot_epoch);
                } else {
                    out.calendar.insert(fpp_e.identity_hash.clone(), fpp_snapshot_epoch);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Correlation, Ownership, Payload, Provenance, SubEvent};
    use crate::identity::{Identity, IdentityKind, IdentityTiming};
    use crate::timing::{DateSpec, Days, TimeSpec, Timing};
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn event(target: &str, hour: u32, managed: bool) -> ManifestEvent {
        let identity = Identity {
            kind: IdentityKind::Playlist,
            target: target.into(),
            timing: IdentityTiming {
                start_date: None,
                end_date: None,
                start_time: TimeSpec::hard(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
                end_time: TimeSpec::hard(NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap()),
                days: Days::None,
            },
        };
        let sub_event = SubEvent::finalize(
            Timing {
                start_date: DateSpec::hard(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
                end_date: DateSpec::hard(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
                start_time: TimeSpec::hard(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
                end_time: TimeSpec::hard(NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap()),
                days: Days::None,
            },
            Default::default(),
            Payload::default(),
        );
        let ownership = if managed {
            Ownership::managed_by("calendar")
        } else {
            Ownership::unmanaged()
        };
        ManifestEvent::build(identity, ownership, Correlation::default(), Provenance::default(), vec![sub_event])
            .unwrap()
    }

    fn manifest(events: Vec<ManifestEvent>) -> Manifest {
        let mut m = Manifest::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        for e in events {
            m.insert(e);
        }
        m
    }

    /// S4: tie on `updated_at` favors the scheduler.
    #[test]
    fn s4_tie_favors_scheduler() {
        let cal_event = event("X", 18, true);
        let fpp_event = event("X", 20, true);
        let id = cal_event.identity_hash.clone();
        let cal_manifest = manifest(vec![cal_event]);
        let fpp_manifest = manifest(vec![fpp_event.clone()]);
        let current = manifest(vec![]);
        let mut cal_updated_at = BTreeMap::new();
        cal_updated_at.insert(id.clone(), 1000);
        let mut fpp_updated_at = BTreeMap::new();
        fpp_updated_at.insert(id.clone(), 1000);

        let out = Reconciler::reconcile(ReconcileInput {
            cal_manifest: &cal_manifest,
            fpp_manifest: &fpp_manifest,
            current_manifest: &current,
            cal_updated_at: &cal_updated_at,
            fpp_updated_at: &fpp_updated_at,
            tombstones: &Tombstones::default(),
            cal_snapshot_epoch: 2000,
            fpp_snapshot_epoch: 2000,
            sync_mode: SyncMode::Both,
            calendar_scope: "scope-1",
        })
        .unwrap();

        let target_event = out.target_manifest.get(&id).unwrap();
        assert_eq!(target_event.state_hash, fpp_event.state_hash);
        let cal_action = out.actions.iter().find(|a| a.target == Target::Calendar).unwrap();
        assert_eq!(cal_action.kind, ActionKind::Update);
        let fpp_action = out.actions.iter().find(|a| a.target == Target::Scheduler).unwrap();
        assert_eq!(fpp_action.kind, ActionKind::Noop);
    }

    /// S5: unmanaged current event is preserved with a single `noop` block.
    #[test]
    fn s5_unmanaged_preservation() {
        let current_event = event("X", 18, false);
        let id = current_event.identity_hash.clone();
        let cal_event = event("X", 18, true);
        let cal_manifest = manifest(vec![cal_event]);
        let fpp_manifest = manifest(vec![]);
        let current = manifest(vec![current_event.clone()]);

        let out = Reconciler::reconcile(ReconcileInput {
            cal_manifest: &cal_manifest,
            fpp_manifest: &fpp_manifest,
            current_manifest: &current,
            cal_updated_at: &BTreeMap::new(),
            fpp_updated_at: &BTreeMap::new(),
            tombstones: &Tombstones::default(),
            cal_snapshot_epoch: 0,
            fpp_snapshot_epoch: 0,
            sync_mode: SyncMode::Both,
            calendar_scope: "scope-1",
        })
        .unwrap();

        assert_eq!(out.target_manifest.get(&id).unwrap().state_hash, current_event.state_hash);
        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0].kind, ActionKind::Noop);
        assert_eq!(out.actions[0].reason, "unmanaged");
    }

    /// S6: both sources non-empty, no shared identity -> SafetyStop.
    #[test]
    fn s6_safety_stop_on_disjoint_sources() {
        let cal_manifest = manifest(vec![event("A", 18, true)]);
        let fpp_manifest = manifest(vec![event("B", 19, true)]);
        let current = manifest(vec![]);
        let err = Reconciler::reconcile(ReconcileInput {
            cal_manifest: &cal_manifest,
            fpp_manifest: &fpp_manifest,
            current_manifest: &current,
            cal_updated_at: &BTreeMap::new(),
            fpp_updated_at: &BTreeMap::new(),
            tombstones: &Tombstones::default(),
            cal_snapshot_epoch: 0,
            fpp_snapshot_epoch: 0,
            sync_mode: SyncMode::Both,
            calendar_scope: "scope-1",
        })
        .unwrap_err();
        assert!(matches!(err, Error::SafetyStop(_)));
    }

    /// §8 invariant 7: for every locked identity, target equals current and
    /// the action is `block`.
    #[test]
    fn ownership_locked_blocks() {
        let mut locked_event = event("X", 18, true);
        locked_event.ownership.locked = true;
        let id = locked_event.identity_hash.clone();
        let current = manifest(vec![locked_event.clone()]);
        let cal_manifest = manifest(vec![event("X", 20, true)]);
        let fpp_manifest = manifest(vec![]);

        let out = Reconciler::reconcile(ReconcileInput {
            cal_manifest: &cal_manifest,
            fpp_manifest: &fpp_manifest,
            current_manifest: &current,
            cal_updated_at: &BTreeMap::new(),
            fpp_updated_at: &BTreeMap::new(),
            tombstones: &Tombstones::default(),
            cal_snapshot_epoch: 0,
            fpp_snapshot_epoch: 0,
            sync_mode: SyncMode::Both,
            calendar_scope: "scope-1",
        })
        .unwrap();
        assert_eq!(out.target_manifest.get(&id).unwrap().state_hash, locked_event.state_hash);
        assert_eq!(out.actions.iter().find(|a| a.identity_hash == id).unwrap().kind, ActionKind::Block);
    }
}
