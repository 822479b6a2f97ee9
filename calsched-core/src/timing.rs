//! Tagged-variant timing types (§9 "Dynamic typing → tagged variants").
//!
//! The source system represented dates/times as heterogeneous maps that
//! could carry either a literal value or a symbolic token, with the
//! "exactly one of the two" rule enforced at runtime. Here that rule is
//! enforced at the type level: [`DateSpec`] and [`TimeSpec`] are enums, so
//! an identity that holds one can never also hold the other.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A calendar date: either a hard literal or a named-holiday symbolic token
/// resolved against a year by the `HolidayResolver` collaborator (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum DateSpec {
    Hard { date: NaiveDate },
    Symbolic { name: String },
}

impl DateSpec {
    pub fn hard(date: NaiveDate) -> Self {
        DateSpec::Hard { date }
    }

    pub fn symbolic(name: impl Into<String>) -> Self {
        DateSpec::Symbolic { name: name.into() }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, DateSpec::Symbolic { .. })
    }

    pub fn as_hard(&self) -> Option<NaiveDate> {
        match self {
            DateSpec::Hard { date } => Some(*date),
            DateSpec::Symbolic { .. } => None,
        }
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSpec::Hard { date } => write!(f, "{}", date.format("%Y-%m-%d")),
            DateSpec::Symbolic { name } => write!(f, "~{name}"),
        }
    }
}

/// Solar event kinds recognized by the `SolarOracle` collaborator (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SolarKind {
    Dawn,
    SunRise,
    SunSet,
    Dusk,
}

/// A time-of-day: either a hard literal or a solar-relative symbolic token
/// (`Dawn|SunRise|SunSet|Dusk` plus an integer minute offset), resolved
/// against a date/lat/lon by the `SolarOracle` collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum TimeSpec {
    Hard { time: NaiveTime },
    Symbolic { kind: SolarKind, offset_min: i32 },
}

impl TimeSpec {
    pub fn hard(time: NaiveTime) -> Self {
        TimeSpec::Hard { time }
    }

    pub fn symbolic(kind: SolarKind, offset_min: i32) -> Self {
        TimeSpec::Symbolic { kind, offset_min }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, TimeSpec::Symbolic { .. })
    }

    pub fn as_hard(&self) -> Option<NaiveTime> {
        match self {
            TimeSpec::Hard { time } => Some(*time),
            TimeSpec::Symbolic { .. } => None,
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Hard { time } => write!(f, "{}", time.format("%H:%M:%S")),
            TimeSpec::Symbolic { kind, offset_min } => write!(f, "~{kind:?}{offset_min:+}"),
        }
    }
}

/// ISO weekday abbreviations used by weekly masks (glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Su,
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Su,
        Weekday::Mo,
        Weekday::Tu,
        Weekday::We,
        Weekday::Th,
        Weekday::Fr,
        Weekday::Sa,
    ];

    pub fn from_chrono(w: chrono::Weekday) -> Self {
        match w {
            chrono::Weekday::Sun => Weekday::Su,
            chrono::Weekday::Mon => Weekday::Mo,
            chrono::Weekday::Tue => Weekday::Tu,
            chrono::Weekday::Wed => Weekday::We,
            chrono::Weekday::Thu => Weekday::Th,
            chrono::Weekday::Fri => Weekday::Fr,
            chrono::Weekday::Sat => Weekday::Sa,
        }
    }
}

/// `days` slot of a `Timing`: null, a weekly mask, or a date-parity token.
/// Mutually exclusive by construction (§8 open question: combinations of
/// parity and weekday masks are an `InvariantViolation`, never silently
/// merged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum Days {
    None,
    Weekly { mask: BTreeSet<Weekday> },
    Parity { parity: Parity },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    Odd,
    Even,
}

impl Days {
    pub fn weekly(mask: impl IntoIterator<Item = Weekday>) -> Self {
        Days::Weekly {
            mask: mask.into_iter().collect(),
        }
    }

    pub fn everyday() -> Self {
        Days::weekly(Weekday::ALL)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Days::None)
    }

    pub fn as_weekly(&self) -> Option<&BTreeSet<Weekday>> {
        match self {
            Days::Weekly { mask } => Some(mask),
            _ => None,
        }
    }
}

/// The full timing shape shared by `Identity` and every `SubEvent` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start_date: DateSpec,
    pub end_date: DateSpec,
    pub start_time: TimeSpec,
    pub end_time: TimeSpec,
    pub days: Days,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_spec_cannot_be_both_hard_and_symbolic() {
        // Enforced by the type itself: constructing one variant makes the
        // other inexpressible, which is the point.
        let hard = DateSpec::hard(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert!(hard.as_hard().is_some());
        assert!(!hard.is_symbolic());

        let symbolic = DateSpec::symbolic("Thanksgiving");
        assert!(symbolic.as_hard().is_none());
        assert!(symbolic.is_symbolic());
    }
}
