//! Concrete `CalendarLexer` (§6 "Inbound: CalendarLexer") on top of the
//! `icalendar` crate, grounded on `caldir-core/src/ics/parse.rs`. Out of
//! scope for the reconciliation core proper (§1 lists it as an external
//! collaborator) but shipped here so tests and callers who don't want to
//! write their own lexer have a working one.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use icalendar::parser::{read_calendar, unfold, Property};
use icalendar::{CalendarDateTime, DatePerhapsTime};

use crate::calendar_row::{CalendarRow, Freq, RecurrenceRule, RowProvenance, RowStatus};
use crate::error::{Error, Result};
use crate::timing::Weekday;

/// Bytes in, typed rows out - one per `VEVENT` (§6). Implementors decide
/// how to fetch the bytes; this trait only covers the parse step.
pub trait CalendarLexer {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<CalendarRow>>;
}

/// Outbound: mutates the remote/source calendar (§6 "CalendarClient").
/// Synchronous contract description per SPEC_FULL.md §3 - a real
/// implementation (REST client, CalDAV, etc.) wraps these in whatever
/// async runtime it needs; the core never awaits anything itself.
pub trait CalendarClient {
    fn create(&self, row: &CalendarRow) -> Result<()>;
    fn update(&self, row: &CalendarRow) -> Result<()>;
    fn delete(&self, uid: &str) -> Result<()>;
}

/// A `CalendarClient` that logs and does nothing - the default/testing
/// implementation the trait doc promises (SPEC_FULL.md §3), used by
/// `calsched-cli` until a real provider client is wired in.
#[derive(Debug, Default)]
pub struct NoopCalendarClient;

impl CalendarClient for NoopCalendarClient {
    fn create(&self, row: &CalendarRow) -> Result<()> {
        tracing::warn!(uid = %row.uid, "NoopCalendarClient: create is a no-op");
        Ok(())
    }

    fn update(&self, row: &CalendarRow) -> Result<()> {
        tracing::warn!(uid = %row.uid, "NoopCalendarClient: update is a no-op");
        Ok(())
    }

    fn delete(&self, uid: &str) -> Result<()> {
        tracing::warn!(uid, "NoopCalendarClient: delete is a no-op");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct IcsCalendarLexer;

impl CalendarLexer for IcsCalendarLexer {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<CalendarRow>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::SourceMalformed(format!("ICS document is not valid UTF-8: {e}")))?;
        let unfolded = unfold(text);
        let calendar = read_calendar(&unfolded)
            .map_err(|e| Error::SourceMalformed(format!("could not parse ICS document: {e}")))?;

        let mut rows = Vec::new();
        for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
            // §7 SourceMalformed is fatal per-document but recoverable
            // per-row; a VEVENT missing UID/DTSTART/DTEND is simply skipped
            // here (the core never sees it).
            let Some(uid) = vevent.find_prop("UID").map(|p| p.val.to_string()) else {
                continue;
            };
            let Some(start_prop) = vevent.find_prop("DTSTART") else {
                continue;
            };
            let Some(end_prop) = vevent.find_prop("DTEND") else {
                continue;
            };
            let Ok(start_dpt) = DatePerhapsTime::try_from(start_prop) else {
                continue;
            };
            let Ok(end_dpt) = DatePerhapsTime::try_from(end_prop) else {
                continue;
            };

            let is_all_day = matches!(start_dpt, DatePerhapsTime::Date(_));
            let (start, tz) = to_naive_datetime(start_dpt);
            let (end, _) = to_naive_datetime(end_dpt);

            let summary = vevent.find_prop("SUMMARY").map(|p| p.val.to_string()).unwrap_or_default();
            let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());

            let status = vevent.find_prop("STATUS").map(|p| match p.val.as_ref() {
                "TENTATIVE" => RowStatus::Tentative,
                "CANCELLED" => RowStatus::Cancelled,
                _ => RowStatus::Confirmed,
            });

            let rrule = vevent.find_prop("RRULE").and_then(|p| parse_rrule(p.val.as_ref()));

            let exdates: Vec<NaiveDateTime> = vevent
                .properties
                .iter()
                .filter(|p| p.name == "EXDATE")
                .flat_map(|p| parse_exdate_property(p))
                .collect();

            let recurrence_id = vevent
                .find_prop("RECURRENCE-ID")
                .and_then(|p| DatePerhapsTime::try_from(p).ok())
                .map(|dpt| to_naive_datetime(dpt).0);

            let provenance = RowProvenance {
                updated_at_epoch: vevent
                    .find_prop("LAST-MODIFIED")
                    .and_then(|p| parse_ics_timestamp_epoch(p.val.as_ref())),
                created_at_epoch: vevent
                    .find_prop("CREATED")
                    .and_then(|p| parse_ics_timestamp_epoch(p.val.as_ref())),
                dtstamp_epoch: vevent
                    .find_prop("DTSTAMP")
                    .and_then(|p| parse_ics_timestamp_epoch(p.val.as_ref())),
            };

            let is_override = recurrence_id.is_some();
            rows.push(CalendarRow {
                parent_uid: if is_override { Some(uid.clone()) } else { None },
                uid,
                summary,
                description,
                start,
                end,
                is_all_day,
                tz,
                rrule,
                exdates,
                recurrence_id,
                status,
                is_override,
                provenance,
            });
        }
        Ok(rows)
    }
}

fn to_naive_datetime(dpt: DatePerhapsTime) -> (NaiveDateTime, Option<String>) {
    match dpt {
        DatePerhapsTime::Date(d) => (d.and_time(NaiveTime::MIN), None),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => (dt.naive_utc(), Some("UTC".into())),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => (naive, None),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            (date_time, Some(tzid))
        }
    }
}

fn parse_rrule(value: &str) -> Option<RecurrenceRule> {
    let mut freq = None;
    let mut interval = None;
    let mut count = None;
    let mut until = None;
    let mut byday = Vec::new();

    for part in value.split(';') {
        let (key, val) = part.split_once('=')?;
        match key {
            "FREQ" => {
                freq = Some(match val {
                    "DAILY" => Freq::Daily,
                    "WEEKLY" => Freq::Weekly,
                    other => Freq::Other(other.to_string()),
                })
            }
            "INTERVAL" => interval = val.parse().ok(),
            "COUNT" => count = val.parse().ok(),
            "UNTIL" => until = parse_ics_datetime(val),
            "BYDAY" => {
                byday = val
                    .split(',')
                    .filter_map(|d| match d.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-') {
                        "SU" => Some(Weekday::Su),
                        "MO" => Some(Weekday::Mo),
                        "TU" => Some(Weekday::Tu),
                        "WE" => Some(Weekday::We),
                        "TH" => Some(Weekday::Th),
                        "FR" => Some(Weekday::Fr),
                        "SA" => Some(Weekday::Sa),
                        _ => None,
                    })
                    .collect()
            }
            _ => {}
        }
    }

    Some(RecurrenceRule {
        freq: freq?,
        interval,
        count,
        until,
        byday,
    })
}

/// `EXDATE` handling (comma-separated values, optional `TZID`, optional
/// `VALUE=DATE`).
fn parse_exdate_property(prop: &Property) -> Vec<NaiveDateTime> {
    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date {
                NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            } else {
                parse_ics_datetime(s)
            }
        })
        .collect()
}

fn parse_ics_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()
}

fn parse_ics_timestamp_epoch(s: &str) -> Option<i64> {
    parse_ics_datetime(s).map(|dt| dt.and_utc().timestamp())
}
