//! The eight numbered testable properties (spec.md §8).

use calsched_core::consolidate::IntentConsolidator;
use calsched_core::diff::Differ;
use calsched_core::event::{Behavior, Correlation, ManifestEvent, Ownership, Payload, Provenance, SubEvent};
use calsched_core::identity::{Identity, IdentityKernel, IdentityKind, IdentityTiming};
use calsched_core::manifest::Manifest;
use calsched_core::normalize::Intent;
use calsched_core::plan::ManifestPlanner;
use calsched_core::reconcile::{ReconcileInput, Reconciler, SyncMode, Tombstones};
use calsched_core::timing::{DateSpec, Days, TimeSpec, Timing, Weekday};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

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

/// 1. `identity_hash` is stable under key reordering, non-identity field
/// reordering, and a JSON round-trip.
#[test]
fn invariant_1_identity_hash_stable_under_reordering_and_round_trip() {
    let a = sample_identity();
    let hash_a = IdentityKernel::hash(&a);

    // Round-trip through JSON (serde_json's map keys are already sorted by
    // `Identity`'s own field order here, but the hash must survive the trip
    // regardless).
    let json = serde_json::to_string(&a).unwrap();
    let b: Identity = serde_json::from_str(&json).unwrap();
    assert_eq!(hash_a, IdentityKernel::hash(&b));

    // Non-identity fields (ownership/correlation/provenance) reordering on
    // the surrounding Event never touches the identity hash at all, since
    // Identity has no fields for them.
    let mut c = a.clone();
    c.timing.days = a.timing.days.clone();
    assert_eq!(hash_a, IdentityKernel::hash(&c));
}

/// 2. Two Intents with equal `identity_hash` have byte-equal
/// `canonicalize(identity)` output.
#[test]
fn invariant_2_equal_hash_implies_byte_equal_canonical_form() {
    let a = sample_identity();
    let b = sample_identity();
    assert_eq!(IdentityKernel::hash(&a), IdentityKernel::hash(&b));
    assert_eq!(
        serde_json::to_vec(&IdentityKernel::canonicalize(&a)).unwrap(),
        serde_json::to_vec(&IdentityKernel::canonicalize(&b)).unwrap(),
    );
}

fn occurrence_intent(date: NaiveDate, series_anchor: NaiveDate) -> Intent {
    let timing = Timing {
        start_date: DateSpec::hard(date),
        end_date: DateSpec::hard(date),
        start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
        end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
        days: Days::None,
    };
    let sub_event = SubEvent::finalize(timing, Behavior::default(), Payload::default());
    let identity = Identity {
        kind: IdentityKind::Playlist,
        target: "Weekly Show".into(),
        timing: IdentityTiming {
            start_date: None,
            end_date: None,
            start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
            end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
            days: Days::None,
        },
    };
    Intent {
        identity_hash: IdentityKernel::hash(&identity),
        identity,
        ownership: Ownership::managed_by("calendar"),
        correlation: Correlation::default(),
        provenance: Provenance::default(),
        sub_event,
        event_state_hash: String::new(),
        all_day: false,
        series_anchor: Some(series_anchor),
        series_until: None,
    }
}

/// 3. IntentConsolidator is lossless: expanding a consolidated range back
/// to occurrences (dates in `[start,end]` whose weekday is in the mask)
/// reproduces exactly the original occurrence set.
#[test]
fn invariant_3_consolidator_is_lossless() {
    let anchor = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    let original: std::collections::BTreeSet<NaiveDate> = [
        anchor,
        NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
    ]
    .into_iter()
    .collect();
    let intents = original.iter().map(|d| occurrence_intent(*d, anchor)).collect();
    let ranged = IntentConsolidator::consolidate(intents).unwrap();

    let mut reexpanded = std::collections::BTreeSet::new();
    for r in &ranged {
        let Days::Weekly { mask } = &r.range.days else {
            panic!("expected a weekly mask");
        };
        let mut d = r.range.start_date;
        while d <= r.range.end_date {
            if mask.contains(&calsched_core::timing::Weekday::from_chrono(d.weekday())) {
                reexpanded.insert(d);
            }
            d += chrono::Duration::days(1);
        }
    }
    assert_eq!(reexpanded, original);
}

/// 4. `ManifestPlanner(intents)` serialized to JSON is byte-identical
/// across runs on identical inputs.
#[test]
fn invariant_4_manifest_planner_output_is_byte_identical_across_runs() {
    let anchor = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    let dates = [anchor, NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()];
    let generated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    let run = || {
        let intents: Vec<_> = dates.iter().map(|d| occurrence_intent(*d, anchor)).collect();
        let ranged = IntentConsolidator::consolidate(intents).unwrap();
        ManifestPlanner::plan(ranged, generated_at).unwrap().to_pretty_json().unwrap()
    };
    assert_eq!(run(), run());
}

fn build_event(target: &str, date: NaiveDate) -> ManifestEvent {
    let identity = Identity {
        kind: IdentityKind::Playlist,
        target: target.into(),
        timing: IdentityTiming {
            start_date: None,
            end_date: None,
            start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
            end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
            days: Days::None,
        },
    };
    let timing = Timing {
        start_date: DateSpec::hard(date),
        end_date: DateSpec::hard(date),
        start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
        end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
        days: Days::None,
    };
    let sub_event = SubEvent::finalize(timing, Behavior::default(), Payload::default());
    ManifestEvent::build(
        identity,
        Ownership::managed_by("calendar"),
        Correlation::default(),
        Provenance::default(),
        vec![sub_event],
    )
    .unwrap()
}

/// 5. `Differ(m, m) = ∅`. `Differ(m, ∅) = {creates = managed events of m}`.
/// `Differ(∅, m) = {deletes = managed events of m}`.
#[test]
fn invariant_5_differ_identities() {
    let generated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut m = Manifest::new(generated_at);
    m.insert(build_event("Show", NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()));
    let empty = Manifest::new(generated_at);

    let self_diff = Differ::diff(&m, &m).unwrap();
    assert!(self_diff.creates.is_empty() && self_diff.updates.is_empty() && self_diff.deletes.is_empty());

    let vs_empty = Differ::diff(&m, &empty).unwrap();
    assert_eq!(vs_empty.creates.len(), m.events.len());
    assert!(vs_empty.updates.is_empty() && vs_empty.deletes.is_empty());

    let empty_vs_m = Differ::diff(&empty, &m).unwrap();
    assert_eq!(empty_vs_m.deletes.len(), m.events.len());
    assert!(empty_vs_m.creates.is_empty() && empty_vs_m.updates.is_empty());
}

fn reconcile_once(
    cal: &Manifest,
    fpp: &Manifest,
    current: &Manifest,
    cal_updated_at: &BTreeMap<String, i64>,
    fpp_updated_at: &BTreeMap<String, i64>,
    tombstones: &Tombstones,
    epoch: i64,
) -> calsched_core::reconcile::ReconcileOutput {
    Reconciler::reconcile(ReconcileInput {
        cal_manifest: cal,
        fpp_manifest: fpp,
        current_manifest: current,
        cal_updated_at,
        fpp_updated_at,
        tombstones,
        cal_snapshot_epoch: epoch,
        fpp_snapshot_epoch: epoch,
        sync_mode: SyncMode::Both,
        calendar_scope: "default",
    })
    .unwrap()
}

/// 6. Reconciler idempotence: applying the emitted actions, re-ingesting
/// both sides from the target, and re-running the Reconciler yields an
/// empty executable-actions set.
#[test]
fn invariant_6_reconciler_idempotence() {
    let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    let cal_event = build_event("Only On Calendar", date);
    let generated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    let mut cal = Manifest::new(generated_at);
    cal.insert(cal_event.clone());
    let fpp = Manifest::new(generated_at);
    let current = Manifest::new(generated_at);

    let first = reconcile_once(&cal, &fpp, &current, &BTreeMap::new(), &BTreeMap::new(), &Tombstones::default(), 1000);
    assert!(first.actions.iter().any(|a| a.is_executable()));

    // Re-ingest both sides from the target: the scheduler now also has the
    // identity (§4.G step "present" creates it), and current is the
    // applied target.
    let second = reconcile_once(
        &cal,
        &first.target_manifest,
        &first.target_manifest,
        &BTreeMap::new(),
        &BTreeMap::new(),
        &Tombstones::default(),
        2000,
    );
    assert!(second.actions.iter().all(|a| !a.is_executable()), "re-running after convergence must be a no-op");
}

/// 7. Reconciler ownership: for every identity where `current.locked`, the
/// target equals `current` and the action is `block`.
#[test]
fn invariant_7_locked_identities_always_block() {
    let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    let mut current_event = build_event("Locked Show", date);
    current_event.ownership.locked = true;

    let generated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut current = Manifest::new(generated_at);
    current.insert(current_event.clone());
    let mut cal = Manifest::new(generated_at);
    cal.insert(build_event("Locked Show", date));
    let fpp = Manifest::new(generated_at);

    let id = current_event.identity_hash.clone();
    let output = reconcile_once(&cal, &fpp, &current, &BTreeMap::new(), &BTreeMap::new(), &Tombstones::default(), 1000);

    assert_eq!(output.target_manifest.get(&id), Some(&current_event));
    let action = output.actions.iter().find(|a| a.identity_hash == id).unwrap();
    assert_eq!(action.kind, calsched_core::reconcile::ActionKind::Block);
}

/// 8. Reconciler monotonicity: if only one source's `updated_at[id]`
/// increases and a tombstone does not flip, the winner for `id` cannot
/// switch away from that source.
#[test]
fn invariant_8_monotonicity_of_last_writer_wins() {
    let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    let cal_event = build_event("Calendar Version", date);
    let fpp_event = build_event("Scheduler Version", date);
    assert_eq!(cal_event.identity_hash, fpp_event.identity_hash);

    let generated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut cal = Manifest::new(generated_at);
    cal.insert(cal_event.clone());
    let mut fpp = Manifest::new(generated_at);
    fpp.insert(fpp_event);
    let current = Manifest::new(generated_at);

    let id = cal_event.identity_hash.clone();
    let fpp_updated_at = BTreeMap::from([(id.clone(), 500)]);

    // Calendar's updated_at increases across three runs; scheduler's never
    // moves. The calendar version must win every time once it's ahead, and
    // never lose ground back to the scheduler.
    for cal_ts in [600, 700, 800] {
        let cal_updated_at = BTreeMap::from([(id.clone(), cal_ts)]);
        let output = reconcile_once(&cal, &fpp, &current, &cal_updated_at, &fpp_updated_at, &Tombstones::default(), 1000);
        assert_eq!(output.target_manifest.get(&id).unwrap().identity.target, "Calendar Version");
    }
}
