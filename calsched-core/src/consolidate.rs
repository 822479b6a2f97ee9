//! `IntentConsolidator` (§4.D): losslessly collapses per-occurrence intents
//! sharing an identity-adjacent grouping key into ranged intents.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::{Error, Result, ViolationContext};
use crate::normalize::Intent;
use crate::timing::{Days, TimeSpec, Weekday};

/// `{range:{start_date, end_date, days_mask}}` half of a `RangedIntent`
/// (§4.D, §3 glossary "Ranged intent"). Always a hard `NaiveDate` pair: by
/// the time an `Intent` reaches consolidation its `sub_event.timing` has
/// already been hard-resolved (§4.C step 2b).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Days,
}

/// `RangedIntent = {template_intent, range}` (§4.D). `template` carries the
/// representative behavior/payload for the whole range - the intent whose
/// occurrence date is the range's own `start_date`.
#[derive(Debug, Clone)]
pub struct RangedIntent {
    pub template: Intent,
    pub range: Range,
}

#[derive(Serialize)]
struct GroupKeyMaterial<'a> {
    kind: crate::identity::IdentityKind,
    target: &'a str,
    stop_type: crate::event::StopType,
    repeat: crate::event::Repeat,
    all_day: bool,
    start_time: &'a TimeSpec,
    end_time: &'a TimeSpec,
    is_override: bool,
}

/// Grouping key (§4.D): `(type, target, stop_type, repeat, all_day,
/// start_time_of_day, end_time_of_day, override_flag)`. Rendered as a JSON
/// string so it's directly usable as a `BTreeMap` key without hand-rolling
/// `Ord`/`Hash` for a tuple containing `TimeSpec`.
fn group_key(intent: &Intent) -> String {
    let material = GroupKeyMaterial {
        kind: intent.identity.kind,
        target: &intent.identity.target,
        stop_type: intent.sub_event.behavior.stop_type,
        repeat: intent.sub_event.behavior.repeat,
        all_day: intent.all_day,
        start_time: &intent.identity.timing.start_time,
        end_time: &intent.identity.timing.end_time,
        is_override: intent.sub_event.payload.is_override,
    };
    serde_json::to_string(&material).expect("group key material always serializes")
}

pub struct IntentConsolidator;

impl IntentConsolidator {
    /// Group `intents` by §4.D's key and consolidate each group
    /// independently. Groups are visited in key-sorted order so the output
    /// list is deterministic for identical input, though callers that need
    /// a canonical Manifest should still sort by `identity_hash` downstream
    /// (§4.E) since two groups can share an identity hash (see
    /// [`Range`] doc).
    pub fn consolidate(intents: Vec<Intent>) -> Result<Vec<RangedIntent>> {
        let mut groups: BTreeMap<String, Vec<Intent>> = BTreeMap::new();
        for intent in intents {
            groups.entry(group_key(&intent)).or_default().push(intent);
        }

        let mut out = Vec::new();
        for group in groups.into_values() {
            out.extend(Self::consolidate_group(group)?);
        }
        Ok(out)
    }

    fn consolidate_group(group: Vec<Intent>) -> Result<Vec<RangedIntent>> {
        let mut by_date: BTreeMap<NaiveDate, Intent> = BTreeMap::new();
        let mut series_anchor: Option<NaiveDate> = None;
        let mut series_until: Option<NaiveDate> = None;

        for intent in group {
            let date = intent.sub_event.timing.start_date.as_hard().ok_or_else(|| {
                Error::invariant(
                    "per-occurrence intent has no hard start date to consolidate",
                    ViolationContext::new(),
                )
            })?;
            if let Some(a) = intent.series_anchor {
                series_anchor = Some(series_anchor.map_or(a, |x| x.min(a)));
            }
            if let Some(u) = intent.series_until {
                series_until = Some(series_until.map_or(u, |x| x.max(u)));
            }
            by_date.insert(date, intent);
        }

        let occurrence_dates: BTreeSet<NaiveDate> = by_date.keys().copied().collect();
        let min_d = *occurrence_dates.iter().next().expect("group is non-empty");
        let max_d = *occurrence_dates.iter().next_back().unwrap();

        let range_start = series_anchor.map_or(min_d, |a| a.min(min_d));
        let range_end = series_until.unwrap_or(max_d);

        let mut mask: BTreeSet<Weekday> = occurrence_dates
            .iter()
            .map(|d| Weekday::from_chrono(d.weekday()))
            .collect();

        // Everyday rule (§4.D): every calendar day in range is occupied.
        let span_days = (range_end - range_start).num_days() + 1;
        if span_days == occurrence_dates.len() as i64 {
            mask = Weekday::ALL.into_iter().collect();
        }
        let days = Days::Weekly { mask: mask.clone() };

        let segments = Self::split_lossless(range_start, range_end, &mask, &occurrence_dates)?;

        let mut out = Vec::with_capacity(segments.len());
        for (start, end) in segments {
            let template = by_date
                .get(&start)
                .cloned()
                .expect("segment start is always an occurrence date");
            out.push(RangedIntent {
                template,
                range: Range {
                    start_date: start,
                    end_date: end,
                    days: days.clone(),
                },
            });
        }
        Ok(out)
    }

    /// Losslessness rule (§4.D): every masked date in `[range_start,
    /// range_end]` must be an occurrence date; otherwise split at the first
    /// violation and restart from the next occurrence date. Deterministic
    /// and minimal (fewest segments), verified against S1 in tests.
    fn split_lossless(
        range_start: NaiveDate,
        range_end: NaiveDate,
        mask: &BTreeSet<Weekday>,
        occurrence_dates: &BTreeSet<NaiveDate>,
    ) -> Result<Vec<(NaiveDate, NaiveDate)>> {
        let mut segments = Vec::new();
        let mut seg_start = range_start;
        let mut last_in_segment: Option<NaiveDate> = None;
        let mut cursor = range_start;

        while cursor <= range_end {
            if !mask.contains(&Weekday::from_chrono(cursor.weekday())) {
                cursor += Duration::days(1);
                continue;
            }
            if occurrence_dates.contains(&cursor) {
                last_in_segment = Some(cursor);
                cursor += Duration::days(1);
                continue;
            }
            let seg_end = last_in_segment.ok_or_else(|| {
                Error::invariant(
                    "consolidation range starts on a date not in the occurrence set",
                    ViolationContext::new(),
                )
            })?;
            segments.push((seg_start, seg_end));
            match occurrence_dates.range(cursor..).next().copied() {
                Some(next) => {
                    seg_start = next;
                    last_in_segment = None;
                    cursor = next;
                }
                None => {
                    last_in_segment = None;
                    break;
                }
            }
        }
        if let Some(end) = last_in_segment {
            segments.push((seg_start, end));
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Behavior, Correlation, Ownership, Payload, Provenance, SubEvent};
    use crate::identity::{Identity, IdentityKind, IdentityTiming};
    use crate::timing::{DateSpec, Timing};

    fn occurrence_intent(date: NaiveDate) -> Intent {
        let timing = Timing {
            start_date: DateSpec::hard(date),
            end_date: DateSpec::hard(date),
            start_time: TimeSpec::hard(chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
            end_time: TimeSpec::hard(chrono::NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
            days: Days::None,
        };
        let sub_event = SubEvent::finalize(timing, Behavior::default(), Payload::default());
        let identity = Identity {
            kind: IdentityKind::Playlist,
            target: "Weekly Show".into(),
            timing: IdentityTiming {
                start_date: None,
                end_date: None,
                start_time: TimeSpec::hard(chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
                end_time: TimeSpec::hard(chrono::NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
                days: Days::None,
            },
        };
        Intent {
            identity_hash: crate::identity::IdentityKernel::hash(&identity),
            identity,
            ownership: Ownership::managed_by("calendar"),
            correlation: Correlation::default(),
            provenance: Provenance::default(),
            sub_event,
            event_state_hash: String::new(),
            all_day: false,
            series_anchor: Some(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
            series_until: None,
        }
    }

    /// S1: weekly recurrence with Jan 20 cancelled splits into
    /// `[Jan 6..Jan 13]` and `[Jan 27..Jan 27]`.
    #[test]
    fn s1_splits_around_cancelled_occurrence() {
        let dates = [
            NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
        ];
        let intents = dates.iter().map(|d| occurrence_intent(*d)).collect();
        let ranged = IntentConsolidator::consolidate(intents).unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(
            (ranged[0].range.start_date, ranged[0].range.end_date),
            (dates[0], dates[1])
        );
        assert_eq!(
            (ranged[1].range.start_date, ranged[1].range.end_date),
            (dates[2], dates[2])
        );
        assert_eq!(ranged[0].range.days, Days::weekly([Weekday::Mo]));
    }

    #[test]
    fn contiguous_everyday_run_forces_all_seven_mask() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..7).map(|i| start + Duration::days(i)).collect();
        let intents = dates
            .iter()
            .map(|d| {
                let mut i = occurrence_intent(*d);
                i.series_anchor = Some(start);
                i
            })
            .collect();
        let ranged = IntentConsolidator::consolidate(intents).unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].range.days, Days::everyday());
    }
}
