//! `ManifestPlanner` (§4.E): materializes normalized, consolidated intents
//! into a canonical [`Manifest`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::consolidate::RangedIntent;
use crate::error::Result;
use crate::event::{ManifestEvent, SubEvent};
use crate::manifest::Manifest;
use crate::timing::{DateSpec, Timing};

pub struct ManifestPlanner;

impl ManifestPlanner {
    /// Build a Manifest from `ranged_intents` (all from one source - the
    /// calendar side or the scheduler side, never mixed; §2's data flow
    /// keeps `CalendarManifest`/`SchedulerManifest` separate).
    ///
    /// Intents sharing `template.identity_hash` are re-grouped into one
    /// `ManifestEvent` with one `SubEvent` per range, ordered by the
    /// range's own `start_date` (§3 "ordered sequence of SubEvent"). The
    /// grouping hash is computed pre-consolidation (when a calendar
    /// per-occurrence intent's `identity.timing.days` is still `null`), so
    /// splitting one series into several lossless ranges (§4.D) never
    /// fragments it across multiple events here - every split range's
    /// template still hashes to the same pre-lift identity.
    ///
    /// After grouping, the weekly mask computed during consolidation is
    /// lifted into `identity.timing.days` (§4.E: "lifts weekly day
    /// information... into `identity.timing.days`"), and the Manifest's own
    /// `identity_hash` is recomputed from that post-lift identity - the
    /// `BTreeMap` backing [`Manifest::events`] then gives sorted,
    /// byte-identical serialization for free (§8 invariant 4).
    pub fn plan(ranged_intents: Vec<RangedIntent>, generated_at: DateTime<Utc>) -> Result<Manifest> {
        let mut groups: BTreeMap<String, Vec<RangedIntent>> = BTreeMap::new();
        for ranged in ranged_intents {
            groups
                .entry(ranged.template.identity_hash.clone())
                .or_default()
                .push(ranged);
        }

        let mut manifest = Manifest::new(generated_at);
        for mut group in groups.into_values() {
            group.sort_by_key(|r| r.range.start_date);

            let mut identity = group[0].template.identity.clone();
            identity.timing.days = group[0].range.days.clone();

            let ownership = group[0].template.ownership.clone();
            let correlation = group[0].template.correlation.clone();
            let provenance = group[0].template.provenance.clone();
            // Each `SubEvent` stands for its whole `Range`, not just the
            // template occurrence that happened to anchor it: a scheduler
            // row's own `start_date`/`end_date`/`day` describe a recurring
            // span, so the range's bounds and weekly mask (not the single
            // occurrence date `IntentConsolidator` grouped on) are what the
            // executable leaf must carry.
            let sub_events: Vec<SubEvent> = group
                .into_iter()
                .map(|r| {
                    let timing = Timing {
                        start_date: DateSpec::hard(r.range.start_date),
                        end_date: DateSpec::hard(r.range.end_date),
                        days: r.range.days,
                        ..r.template.sub_event.timing
                    };
                    SubEvent::finalize(timing, r.template.sub_event.behavior, r.template.sub_event.payload)
                })
                .collect();

            let event = ManifestEvent::build(identity, ownership, correlation, provenance, sub_events)?;
            manifest.insert(event);
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::IntentConsolidator;
    use crate::event::{Behavior, Correlation, Ownership, Payload, Provenance};
    use crate::identity::{Identity, IdentityKind, IdentityTiming};
    use crate::normalize::Intent;
    use crate::timing::{DateSpec, Days, TimeSpec, Timing, Weekday};
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn occurrence_intent(date: NaiveDate, series_anchor: NaiveDate) -> Intent {
        let timing = Timing {
            start_date: DateSpec::hard(date),
            end_date: DateSpec::hard(date),
            start_time: TimeSpec::hard(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
            end_time: TimeSpec::hard(NaiveTime::from_hms_opt(19, 0, 0).unwrap()),
            days: Days::None,
        };
        let sub_event = crate::event::SubEvent::finalize(timing, Behavior::default(), Payload::default());
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
            identity_hash: crate::identity::IdentityKernel::hash(&identity),
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

    #[test]
    fn s1_split_ranges_reunite_into_one_event_with_two_sub_events() {
        let anchor = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let dates = [
            anchor,
            NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
        ];
        let intents = dates.iter().map(|d| occurrence_intent(*d, anchor)).collect();
        let ranged = IntentConsolidator::consolidate(intents).unwrap();
        assert_eq!(ranged.len(), 2);

        let generated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let manifest = ManifestPlanner::plan(ranged, generated_at).unwrap();
        assert_eq!(manifest.events.len(), 1);
        let event = manifest.events.values().next().unwrap();
        assert_eq!(event.sub_events.len(), 2);
        assert_eq!(event.identity.timing.days, Days::weekly([Weekday::Mo]));
        assert_eq!(event.sub_events[0].timing.start_date, DateSpec::hard(dates[0]));
        assert_eq!(event.sub_events[1].timing.start_date, DateSpec::hard(dates[2]));
    }
}
