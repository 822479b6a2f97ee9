//! `IntentNormalizer` (§4.C) - "the heart of the core". One shared
//! resolution routine, two thin adapters: [`calendar`] turns a calendar
//! occurrence/override into an `Intent`; [`scheduler`] turns a
//! `SchedulerRow` straight into a [`crate::consolidate::RangedIntent`],
//! since a scheduler row already carries its own date range and day mask
//! and has no per-occurrence form to consolidate.

pub mod calendar;
pub mod scheduler;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::error::Result;
use crate::event::{Behavior, Correlation, Ownership, Payload, Provenance, SubEvent};
use crate::hash;
use crate::holiday::{HolidayResolver, SolarOracle};
use crate::identity::{Identity, IdentityKernel, IdentityKind, IdentityTiming};
use crate::timing::{DateSpec, Days, TimeSpec, Timing};

/// Passed through to every normalization call; holds the two pure
/// collaborators step 2 resolves symbolic timing against (§6) plus the
/// coordinates/year they need. Borrowed, not owned: the core never caches a
/// holiday table itself (§9 "global mutable state... replaced by an
/// explicit collaborator").
pub struct NormalizeContext<'a> {
    pub holidays: &'a dyn HolidayResolver,
    pub solar: &'a dyn SolarOracle,
    pub lat: f64,
    pub lon: f64,
    pub year: i32,
}

/// Output of `IntentNormalizer` (§4.C) for one occurrence or one scheduler
/// row - always exactly one `SubEvent`. `all_day`/`series_anchor`/
/// `series_until` aren't part of spec.md's literal Intent field list, but
/// `IntentConsolidator`'s grouping key and range derivation (§4.D) need
/// them from somewhere, and they don't belong on `Identity` or `SubEvent`
/// (execution detail, not identity; series-level, not sub-event-level).
#[derive(Debug, Clone)]
pub struct Intent {
    pub identity_hash: String,
    pub identity: Identity,
    pub ownership: Ownership,
    pub correlation: Correlation,
    pub provenance: Provenance,
    pub sub_event: SubEvent,
    pub event_state_hash: String,
    /// All-day flag, part of the consolidation grouping key (§4.D).
    pub all_day: bool,
    /// The originating RRULE series' own DTSTART date, when this intent was
    /// expanded from a recurring base row. `None` for overrides and for
    /// scheduler-originated intents. Used by `IntentConsolidator`'s range
    /// derivation ("if the original series DTSTART is earlier than
    /// `min(D)`, use it").
    pub series_anchor: Option<NaiveDate>,
    /// The originating RRULE's `UNTIL` date, if any (§4.D range end rule).
    pub series_until: Option<NaiveDate>,
}

/// Resolve one `DateSpec` against `ctx`, returning the hard date plus the
/// original spec when it was symbolic (step 2b: "retained `symbolic`
/// companion in the payload").
fn resolve_date(ctx: &NormalizeContext, spec: &DateSpec) -> Result<(NaiveDate, Option<DateSpec>)> {
    match spec {
        DateSpec::Hard { date } => Ok((*date, None)),
        DateSpec::Symbolic { name } => {
            let date = ctx.holidays.resolve(name, ctx.year).ok_or_else(|| {
                crate::error::Error::SourceMalformed(format!(
                    "holiday resolver has no date for '{name}' in {}",
                    ctx.year
                ))
            })?;
            Ok((date, Some(spec.clone())))
        }
    }
}

/// Resolve one `TimeSpec` against `ctx`, anchored to `anchor_date` for solar
/// calculations.
fn resolve_time(
    ctx: &NormalizeContext,
    spec: &TimeSpec,
    anchor_date: NaiveDate,
) -> (NaiveTime, Option<TimeSpec>) {
    match spec {
        TimeSpec::Hard { time } => (*time, None),
        TimeSpec::Symbolic { kind, offset_min } => {
            let time = ctx
                .solar
                .resolve(anchor_date, ctx.lat, ctx.lon, *kind, *offset_min);
            (time, Some(spec.clone()))
        }
    }
}

#[derive(Serialize)]
struct IdentityTimingSource<'a> {
    start_date: &'a DateSpec,
    end_date: &'a DateSpec,
    start_time: &'a TimeSpec,
    end_time: &'a TimeSpec,
}

/// Shared resolution routine behind both adapters (§4.C steps 2-8). `kind`/
/// `target` have already been extracted by the caller (step 1); `raw_timing`
/// is the source's own timing - any slot may be symbolic, `days` is
/// preserved verbatim (step 3). `payload` arrives with `summary`/
/// `is_override`/`extra` already populated; its `symbolic` companion is
/// filled in here.
#[allow(clippy::too_many_arguments)]
fn build_intent(
    ctx: &NormalizeContext,
    kind: IdentityKind,
    target: String,
    raw_timing: Timing,
    behavior: Behavior,
    mut payload: Payload,
    ownership: Ownership,
    correlation: Correlation,
    provenance: Provenance,
    all_day: bool,
    series_anchor: Option<NaiveDate>,
    series_until: Option<NaiveDate>,
) -> Result<Intent> {
    let (hard_start_date, sym_start_date) = resolve_date(ctx, &raw_timing.start_date)?;
    let (hard_end_date, sym_end_date) = resolve_date(ctx, &raw_timing.end_date)?;
    let (hard_start_time, sym_start_time) = resolve_time(ctx, &raw_timing.start_time, hard_start_date);
    let (hard_end_time, sym_end_time) = resolve_time(ctx, &raw_timing.end_time, hard_end_date);

    payload.symbolic.start_date = sym_start_date;
    payload.symbolic.end_date = sym_end_date;
    payload.symbolic.start_time = sym_start_time;
    payload.symbolic.end_time = sym_end_time;

    let resolved_timing = Timing {
        start_date: DateSpec::hard(hard_start_date),
        end_date: DateSpec::hard(hard_end_date),
        start_time: TimeSpec::hard(hard_start_time),
        end_time: TimeSpec::hard(hard_end_time),
        days: raw_timing.days.clone(),
    };
    let sub_event = SubEvent::finalize(resolved_timing, behavior, payload);

    // Identity keeps the source's own (possibly symbolic) date/time specs
    // verbatim - never the resolved hard values - which is what keeps
    // `identity_hash` year-independent for a symbolic anchor (S3).
    let identity_timing = IdentityTiming {
        start_date: if raw_timing.start_date.is_symbolic() {
            Some(raw_timing.start_date.clone())
        } else {
            None
        },
        end_date: if raw_timing.end_date.is_symbolic() {
            Some(raw_timing.end_date.clone())
        } else {
            None
        },
        start_time: raw_timing.start_time,
        end_time: raw_timing.end_time,
        days: raw_timing.days,
    };
    let identity = Identity {
        kind,
        target,
        timing: identity_timing,
    };
    IdentityKernel::validate(&identity)?;
    let identity_hash = IdentityKernel::hash(&identity);
    let event_state_hash = hash::hash_ordered([sub_event.state_hash.as_str()]);

    Ok(Intent {
        identity_hash,
        identity,
        ownership,
        correlation,
        provenance,
        sub_event,
        event_state_hash,
        all_day,
        series_anchor,
        series_until,
    })
}

/// Step 1 (§4.C): calendar rows don't carry an explicit `{type, target}`
/// pair in the wire format (§6 only defines it for `SchedulerRow`), so the
/// core reads it off `summary` as `"<kind>:<target>"`, defaulting to
/// `playlist` when no recognized prefix is present. Sequence targets have a
/// trailing `.fseq` stripped. Documented as a normalization-convention
/// decision in DESIGN.md rather than guessed silently per occurrence.
pub fn parse_kind_target(summary: &str) -> (IdentityKind, String) {
    let trimmed = summary.trim();
    let (kind, raw_target) = match trimmed.split_once(':') {
        Some((prefix, rest)) => match prefix.trim().to_ascii_lowercase().as_str() {
            "sequence" => (IdentityKind::Sequence, rest.trim()),
            "command" => (IdentityKind::Command, rest.trim()),
            "playlist" => (IdentityKind::Playlist, rest.trim()),
            _ => (IdentityKind::Playlist, trimmed),
        },
        None => (IdentityKind::Playlist, trimmed),
    };
    let target = if kind == IdentityKind::Sequence {
        strip_sequence_suffix(raw_target)
    } else {
        raw_target.to_string()
    };
    (kind, target)
}

fn strip_sequence_suffix(s: &str) -> String {
    s.strip_suffix(".fseq").unwrap_or(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_kind_prefix() {
        assert_eq!(
            parse_kind_target("sequence: Santa.fseq"),
            (IdentityKind::Sequence, "Santa".to_string())
        );
        assert_eq!(
            parse_kind_target("command:StartShow"),
            (IdentityKind::Command, "StartShow".to_string())
        );
    }

    #[test]
    fn defaults_to_playlist_with_no_prefix() {
        assert_eq!(
            parse_kind_target("Holiday Show"),
            (IdentityKind::Playlist, "Holiday Show".to_string())
        );
    }
}
