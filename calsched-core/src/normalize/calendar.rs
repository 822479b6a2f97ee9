//! Calendar-side adapter (§4.C): turns a snapshotted base occurrence or
//! override into an `Intent`. Per-occurrence only - `IntentConsolidator`
//! (§4.D) is what re-collapses these back into ranges.

use serde_json::json;

use crate::calendar_row::CalendarRow;
use crate::error::Result;
use crate::event::{Behavior, Correlation, Ownership, Payload, Provenance, Repeat};
use crate::occurrence::Occurrence;
use crate::snapshot::OverrideIntent;
use crate::timing::{DateSpec, Days, TimeSpec, Timing};

use super::{build_intent, parse_kind_target, Intent, NormalizeContext};

/// Normalize one expanded occurrence of `row`'s base series (§4.C). `days`
/// is always `Days::None` here (step 3: "a single dated occurrence yields
/// `days = null`"); `IntentConsolidator` is what reconstitutes a weekly
/// mask from the sibling occurrences sharing this identity.
pub fn normalize_base_occurrence(
    ctx: &NormalizeContext,
    row: &CalendarRow,
    occurrence: &Occurrence,
    source_uid: &str,
    calendar_scope: &str,
    locked: bool,
) -> Result<Intent> {
    let (kind, target) = parse_kind_target(&row.summary);

    let raw_timing = Timing {
        start_date: DateSpec::hard(occurrence.start.date()),
        end_date: DateSpec::hard(occurrence.end.date()),
        start_time: TimeSpec::hard(occurrence.start.time()),
        end_time: TimeSpec::hard(occurrence.end.time()),
        days: Days::None,
    };

    let behavior = Behavior {
        enabled: true,
        repeat: Repeat::None,
        stop_type: Default::default(),
    };

    let mut payload = Payload {
        summary: Some(row.summary.clone()),
        is_override: false,
        ..Default::default()
    };
    if let Some(description) = &row.description {
        payload.extra.insert("description".into(), json!(description));
    }

    let ownership = Ownership {
        managed: true,
        locked,
        controller: Some("calendar".into()),
    };
    let correlation = Correlation {
        source_uid: Some(source_uid.to_string()),
        external_ids: Vec::new(),
        calendar_scope: Some(calendar_scope.to_string()),
    };
    let provenance = Provenance {
        updated_at_epoch: row.provenance.updated_at_epoch,
        created_at_epoch: row.provenance.created_at_epoch,
        dtstamp_epoch: row.provenance.dtstamp_epoch,
    };

    let series_until = row
        .rrule
        .as_ref()
        .and_then(|r| r.until)
        .map(|dt| dt.date());

    build_intent(
        ctx,
        kind,
        target,
        raw_timing,
        behavior,
        payload,
        ownership,
        correlation,
        provenance,
        occurrence.all_day,
        Some(row.start.date()),
        series_until,
    )
}

/// Normalize an instance override (§4.A, §4.B): a retimed/renamed single
/// occurrence that must never merge into its base series' range (§4.D
/// grouping key includes `override_flag`). Its own `summary` - not the
/// parent row's - determines `{type, target}`, since an override is free to
/// rename itself the same way the base series is.
pub fn normalize_override(
    ctx: &NormalizeContext,
    parent_row: &CalendarRow,
    over: &OverrideIntent,
    source_uid: &str,
    calendar_scope: &str,
    locked: bool,
) -> Result<Intent> {
    let (kind, target) = parse_kind_target(&over.summary);

    let raw_timing = Timing {
        start_date: DateSpec::hard(over.start.date()),
        end_date: DateSpec::hard(over.end.date()),
        start_time: TimeSpec::hard(over.start.time()),
        end_time: TimeSpec::hard(over.end.time()),
        days: Days::None,
    };

    let behavior = Behavior {
        enabled: over.enabled,
        repeat: Repeat::None,
        stop_type: over.stop_type,
    };

    let mut payload = Payload {
        summary: Some(over.summary.clone()),
        is_override: true,
        ..Default::default()
    };
    if let Some(description) = &over.description {
        payload.extra.insert("description".into(), json!(description));
    }

    let ownership = Ownership {
        managed: true,
        locked,
        controller: Some("calendar".into()),
    };
    let correlation = Correlation {
        source_uid: Some(source_uid.to_string()),
        external_ids: Vec::new(),
        calendar_scope: Some(calendar_scope.to_string()),
    };
    let provenance = Provenance::default();

    build_intent(
        ctx,
        kind,
        target,
        raw_timing,
        behavior,
        payload,
        ownership,
        correlation,
        provenance,
        parent_row.is_all_day,
        None,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar_row::RowProvenance;
    use crate::holiday::{FixedSolarOracle, TableHolidayResolver};
    use chrono::NaiveDate;

    fn ctx(holidays: &TableHolidayResolver, solar: &FixedSolarOracle) -> NormalizeContext<'_> {
        NormalizeContext {
            holidays,
            solar,
            lat: 0.0,
            lon: 0.0,
            year: 2025,
        }
    }

    fn sample_row() -> CalendarRow {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        CalendarRow {
            uid: "A".into(),
            parent_uid: None,
            summary: "Holiday Show".into(),
            description: Some("desc".into()),
            start,
            end: start + chrono::Duration::hours(1),
            is_all_day: false,
            tz: None,
            rrule: None,
            exdates: vec![],
            recurrence_id: None,
            status: None,
            is_override: false,
            provenance: RowProvenance::default(),
        }
    }

    #[test]
    fn base_occurrence_has_null_days_pre_consolidation() {
        let holidays = TableHolidayResolver::new();
        let solar = FixedSolarOracle::default();
        let row = sample_row();
        let occ = Occurrence::new(row.start, row.end);
        let intent =
            normalize_base_occurrence(&ctx(&holidays, &solar), &row, &occ, "src", "scope-1", false)
                .unwrap();
        assert!(intent.identity.timing.days.is_none());
        assert_eq!(intent.identity.target, "Holiday Show");
        assert!(intent.ownership.managed);
    }
}
