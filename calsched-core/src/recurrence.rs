//! Expands a base event + RRULE within a horizon (§4.A "RecurrenceExpander").

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rrule::RRuleSet;

use crate::calendar_row::{CalendarRow, Freq};
use crate::error::{Error, Result};
use crate::occurrence::Occurrence;

/// Render the row's recurrence as an RFC5545 fragment for the `rrule` crate
/// parser, the same string-building approach
/// `caldir-core/src/recurrence.rs` uses rather than the crate's builder API
/// - DTSTART/RRULE/EXDATE lines joined with `\n` and parsed as one
/// `RRuleSet`.
fn build_rrule_string(row: &CalendarRow, extra_exdates: &BTreeSet<NaiveDateTime>) -> Option<String> {
    let rule = row.rrule.as_ref()?;

    let freq = match &rule.freq {
        Freq::Daily => "DAILY",
        Freq::Weekly => "WEEKLY",
        // Unknown FREQ downgrades to a single occurrence at DTSTART (§4.A);
        // the caller checks `row.rrule.is_some()` separately and skips
        // calling this function in that case. Kept here defensively.
        Freq::Other(_) => return None,
    };

    let mut parts = vec![format!("FREQ={freq}")];
    if let Some(interval) = rule.interval {
        parts.push(format!("INTERVAL={interval}"));
    }
    if let Some(count) = rule.count {
        parts.push(format!("COUNT={count}"));
    }
    if let Some(until) = rule.until {
        parts.push(format!("UNTIL={}Z", until.format("%Y%m%dT%H%M%S")));
    }
    if !rule.byday.is_empty() {
        let days = rule
            .byday
            .iter()
            .map(weekday_to_ics)
            .collect::<Vec<_>>()
            .join(",");
        parts.push(format!("BYDAY={days}"));
    }

    let dtstart = format!("DTSTART:{}Z", row.start.format("%Y%m%dT%H%M%S"));
    let mut lines = vec![dtstart, format!("RRULE:{}", parts.join(";"))];

    let mut all_exdates: BTreeSet<NaiveDateTime> = row.exdates.iter().copied().collect();
    all_exdates.extend(extra_exdates.iter().copied());
    for exdate in all_exdates {
        lines.push(format!("EXDATE:{}Z", exdate.format("%Y%m%dT%H%M%S")));
    }

    Some(lines.join("\n"))
}

fn weekday_to_ics(w: &crate::timing::Weekday) -> &'static str {
    use crate::timing::Weekday::*;
    match w {
        Su => "SU",
        Mo => "MO",
        Tu => "TU",
        We => "WE",
        Th => "TH",
        Fr => "FR",
        Sa => "SA",
    }
}

pub struct RecurrenceExpander;

impl RecurrenceExpander {
    /// Expand `row` within `[range_start, range_end]`, excluding EXDATEs and
    /// any date in `cancelled_dates` (the bundle's cancellation set from
    /// §4.B pass 2). Ordering: ascending by local start (§4.A).
    ///
    /// An unsupported `FREQ` downgrades to a single occurrence at DTSTART
    /// (still subject to the horizon and exclusion sets). A row with no
    /// `rrule` at all also yields a single occurrence at DTSTART - the
    /// expander is the single place both "real recurring event" and
    /// "plain one-off event" converge into the same `Occurrence` shape.
    pub fn expand(
        row: &CalendarRow,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        cancelled_dates: &BTreeSet<NaiveDateTime>,
    ) -> Result<Vec<Occurrence>> {
        let duration = row.end - row.start;

        let is_unsupported_freq = matches!(
            row.rrule.as_ref().map(|r| &r.freq),
            Some(Freq::Other(_))
        );

        if row.rrule.is_none() || is_unsupported_freq {
            let mut occ = Occurrence::new(row.start, row.start + duration);
            occ.all_day = row.is_all_day;
            occ.tz = row.tz.clone();
            let in_horizon = occ.start_utc() >= range_start && occ.start_utc() <= range_end;
            let excluded = cancelled_dates.contains(&row.start) || row.exdates.contains(&row.start);
            return Ok(if in_horizon && !excluded {
                vec![occ]
            } else {
                vec![]
            });
        }

        let rrule_str = build_rrule_string(row, cancelled_dates)
            .expect("rrule present and FREQ supported, checked above");

        let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
            Error::SourceMalformed(format!(
                "failed to parse RRULE for event '{}': {e}",
                row.uid
            ))
        })?;

        let tz: rrule::Tz = chrono::Utc.into();
        let after = (range_start - Duration::seconds(1)).with_timezone(&tz);
        let before = (range_end + Duration::seconds(1)).with_timezone(&tz);

        // COUNT is honored by the RRULE itself even when it produces dates
        // past the horizon (§4.A); `.before(before)` truncates the *output*
        // to the horizon without touching how many occurrences the rule
        // says exist. The cap below only bounds runaway infinite rules.
        let limit = row.rrule.as_ref().and_then(|r| r.count).unwrap_or(3660);
        let result = rrule_set.after(after).before(before).all(limit);

        let mut occurrences: Vec<Occurrence> = result
            .dates
            .iter()
            .map(|dt| {
                let start = dt.naive_utc();
                let mut occ = Occurrence::new(start, start + duration);
                occ.all_day = row.is_all_day;
                occ.tz = row.tz.clone();
                occ
            })
            .collect();

        occurrences.sort_by_key(|o| o.start);
        Ok(occurrences)
    }
}
