//! Inbound calendar row types (§6 "CalendarLexer").
//!
//! The lexer itself - bytes → these rows - is out of scope for the core
//! (§1); `calsched_core::ics` ships one concrete implementation on top of
//! the `icalendar` crate for tests and for callers who don't want to write
//! their own, grounded on `caldir-core/src/ics/parse.rs`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::event::ManifestEvent;
use crate::timing::{Days, Weekday};

/// RRULE fields the core understands (§4.A): unsupported `FREQ` values
/// downgrade to "single occurrence at DTSTART" rather than being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Freq,
    pub interval: Option<u32>,
    pub count: Option<u32>,
    pub until: Option<NaiveDateTime>,
    pub byday: Vec<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freq {
    Daily,
    Weekly,
    /// Any `FREQ` other than `DAILY`/`WEEKLY` (§4.A: "Unknown FREQ
    /// downgrades to a single occurrence at DTSTART").
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Source-side timestamps (§6 `provenance`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowProvenance {
    pub updated_at_epoch: Option<i64>,
    pub created_at_epoch: Option<i64>,
    pub dtstamp_epoch: Option<i64>,
}

/// One `VEVENT` row as emitted by a `CalendarLexer` (§6), extended with the
/// `parent_uid`/`status` fields §4.B needs to group bases, cancellations,
/// and overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarRow {
    pub uid: String,
    /// Set on exception/cancellation rows; identifies the master series.
    pub parent_uid: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub is_all_day: bool,
    pub tz: Option<String>,
    pub rrule: Option<RecurrenceRule>,
    pub exdates: Vec<NaiveDateTime>,
    /// `RECURRENCE-ID` / `originalStartTime`: set on exception rows only.
    pub recurrence_id: Option<NaiveDateTime>,
    pub status: Option<RowStatus>,
    pub is_override: bool,
    pub provenance: RowProvenance,
}

impl CalendarRow {
    pub fn is_exception(&self) -> bool {
        self.recurrence_id.is_some() || self.parent_uid.is_some()
    }

    /// Encodes a managed `ManifestEvent` back into a single representative
    /// `CalendarRow` for a `CalendarClient` to push upstream (§6 "Outbound:
    /// CalendarClient"). Takes its DTSTART/DTEND from the event's first
    /// sub-event and its RRULE from the identity's lifted weekly mask, if
    /// any - good enough for a `CalendarClient` implementation to recognize
    /// what changed; a provider that needs every split range verbatim can
    /// walk `event.sub_events` itself.
    pub fn from_manifest_event(event: &ManifestEvent) -> Option<Self> {
        let first = event.sub_events.first()?;
        let start_date = first.timing.start_date.as_hard()?;
        let start_time = first.timing.start_time.as_hard()?;
        let end_date = first.timing.end_date.as_hard()?;
        let end_time = first.timing.end_time.as_hard()?;

        let rrule = match &event.identity.timing.days {
            Days::Weekly { mask } if mask.len() > 1 || end_date != start_date => Some(RecurrenceRule {
                freq: Freq::Weekly,
                interval: None,
                count: None,
                until: Some(end_date.and_time(end_time)),
                byday: mask.iter().copied().collect(),
            }),
            _ => None,
        };

        Some(CalendarRow {
            uid: event.correlation.source_uid.clone().unwrap_or_else(|| event.identity_hash.clone()),
            parent_uid: None,
            summary: event.identity.target.clone(),
            description: None,
            start: start_date.and_time(start_time),
            end: end_date.and_time(end_time),
            is_all_day: false,
            tz: None,
            rrule,
            exdates: Vec::new(),
            recurrence_id: None,
            status: Some(RowStatus::Confirmed),
            is_override: false,
            provenance: RowProvenance::default(),
        })
    }
}
