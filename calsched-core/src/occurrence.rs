//! A concrete run window (§3 "Occurrence").

use chrono::{NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// A concrete run window, produced either by parsing a single dated
/// calendar row or by expanding a recurrence rule (§4.A).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub tz: Option<String>,
    pub exdate: bool,
}

impl Occurrence {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Occurrence {
            start,
            end,
            all_day: false,
            tz: None,
            exdate: false,
        }
    }

    pub fn all_day(mut self) -> Self {
        self.all_day = true;
        self
    }

    pub fn with_tz(mut self, tz: impl Into<String>) -> Self {
        self.tz = Some(tz.into());
        self
    }

    pub fn start_date(&self) -> chrono::NaiveDate {
        self.start.date()
    }

    /// Resolve `start`/`end` into a single timezone for comparison/sorting.
    /// Falls back to UTC interpretation when `tz` is absent or unrecognized,
    /// matching how floating times are treated elsewhere in the pipeline.
    pub fn start_utc(&self) -> chrono::DateTime<chrono::Utc> {
        match self.tz.as_deref().and_then(|t| t.parse::<chrono_tz::Tz>().ok()) {
            Some(tz) => tz
                .from_local_datetime(&self.start)
                .single()
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|| chrono::Utc.from_utc_datetime(&self.start)),
            None => chrono::Utc.from_utc_datetime(&self.start),
        }
    }
}
