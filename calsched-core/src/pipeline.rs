//! Thin orchestration gluing the pure pipeline stages together (§2's data
//! flow): `CalendarSnapshotter → RecurrenceExpander → IntentNormalizer →
//! IntentConsolidator → ManifestPlanner` for the calendar side, and
//! `IntentNormalizer` directly into `ManifestPlanner` for the scheduler
//! side. Kept separate from `calsched-cli` so both the CLI and tests can
//! call it without going through process boundaries.

use chrono::{DateTime, Utc};

use crate::calendar_row::CalendarRow;
use crate::consolidate::IntentConsolidator;
use crate::error::{Result, Warning};
use crate::manifest::Manifest;
use crate::normalize::{calendar as normalize_calendar, scheduler as normalize_scheduler, NormalizeContext};
use crate::plan::ManifestPlanner;
use crate::scheduler_row::SchedulerRow;
use crate::snapshot::CalendarSnapshotter;

/// Build the calendar-side Manifest (§2) from raw lexer rows.
///
/// `locked_lookup` answers "was the identity rooted at this calendar UID
/// locked in the last-applied Manifest?" - `Ownership.locked` is carried
/// forward from `current`, never recomputed from a fresh intent (§3), so
/// the caller threads it in keyed by the one thing that survives a content
/// edit: the calendar UID, not the identity hash.
pub fn build_calendar_manifest(
    rows: Vec<CalendarRow>,
    ctx: &NormalizeContext,
    calendar_scope: &str,
    horizon_start: DateTime<Utc>,
    horizon_end: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    locked_lookup: impl Fn(&str) -> bool,
) -> Result<(Manifest, Vec<Warning>)> {
    let (bundles, mut warnings) = CalendarSnapshotter::snapshot(rows)?;

    let mut ranged_intents = Vec::new();
    for (uid, bundle) in &bundles {
        let locked = locked_lookup(uid);
        let occurrences = crate::recurrence::RecurrenceExpander::expand(
            &bundle.base_row,
            horizon_start,
            horizon_end,
            &bundle.cancelled_dates,
        )?;

        let per_uid_intents: Result<Vec<_>> = occurrences
            .iter()
            .map(|occ| {
                normalize_calendar::normalize_base_occurrence(ctx, &bundle.base_row, occ, uid, calendar_scope, locked)
            })
            .collect();
        let per_uid_intents = per_uid_intents?;
        if !per_uid_intents.is_empty() {
            ranged_intents.extend(IntentConsolidator::consolidate(per_uid_intents)?);
        }

        for over in &bundle.overrides {
            let intent = normalize_calendar::normalize_override(ctx, &bundle.base_row, over, uid, calendar_scope, locked)?;
            ranged_intents.extend(IntentConsolidator::consolidate(vec![intent])?);
        }
    }

    if bundles.is_empty() {
        warnings.push(Warning::new("no VEVENT rows produced a bundle"));
    }

    let manifest = ManifestPlanner::plan(ranged_intents, generated_at)?;
    Ok((manifest, warnings))
}

/// Build the scheduler-side Manifest (§2) from raw reader rows.
///
/// `locked_lookup` takes the row's *previous* identity hash (recovered from
/// its own management tag, if tagged) rather than a calendar UID - a
/// scheduler row has no calendar UID of its own.
pub fn build_scheduler_manifest(
    rows: &[SchedulerRow],
    ctx: &NormalizeContext,
    generated_at: DateTime<Utc>,
    locked_lookup: impl Fn(&str) -> bool,
) -> Result<Manifest> {
    let mut ranged_intents = Vec::new();
    for row in rows {
        let tagged_hash = row
            .tag
            .as_deref()
            .and_then(crate::scheduler_row::parse_management_tag)
            .map(|(uid, _, _)| uid);
        let locked = tagged_hash.as_deref().is_some_and(&locked_lookup);
        ranged_intents.push(normalize_scheduler::normalize_row(ctx, row, locked)?);
    }
    ManifestPlanner::plan(ranged_intents, generated_at)
}
