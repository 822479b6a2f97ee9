//! Inbound/outbound scheduler row types (§6 "SchedulerReader"/"SchedulerWriter").
//!
//! The core owns interpretation of the raw `day` enum and the management
//! tag format; the reader/writer themselves (file IO) are external
//! collaborator traits (§1, §6).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::{ManifestEvent, Repeat, StopType};
use crate::identity::IdentityKind;
use crate::timing::{Days, Parity, Weekday};

/// Raw `day` field semantics (§6 glossary). `0..6` is a single weekday
/// (Sunday-indexed, matching the enum's own SU=0 ordering), `14`/`15` are
/// date-parity tokens, and the high bit `0x10000` switches to an explicit
/// weekday bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDayCode(pub u32);

const BITMASK_FLAG: u32 = 0x10000;
const BIT_SA: u32 = 0x0100;
const BIT_FR: u32 = 0x0200;
const BIT_TH: u32 = 0x0400;
const BIT_WE: u32 = 0x0800;
const BIT_TU: u32 = 0x1000;
const BIT_MO: u32 = 0x2000;
const BIT_SU: u32 = 0x4000;

impl RawDayCode {
    pub fn to_days(self) -> Result<Days> {
        let raw = self.0;
        if raw & BITMASK_FLAG != 0 {
            let mut mask = std::collections::BTreeSet::new();
            for (bit, wd) in [
                (BIT_SU, Weekday::Su),
                (BIT_MO, Weekday::Mo),
                (BIT_TU, Weekday::Tu),
                (BIT_WE, Weekday::We),
                (BIT_TH, Weekday::Th),
                (BIT_FR, Weekday::Fr),
                (BIT_SA, Weekday::Sa),
            ] {
                if raw & bit != 0 {
                    mask.insert(wd);
                }
            }
            return Ok(Days::Weekly { mask });
        }

        use Weekday::*;
        let days = match raw {
            0 => Days::weekly([Su]),
            1 => Days::weekly([Mo]),
            2 => Days::weekly([Tu]),
            3 => Days::weekly([We]),
            4 => Days::weekly([Th]),
            5 => Days::weekly([Fr]),
            6 => Days::weekly([Sa]),
            7 => Days::everyday(),
            8 => Days::weekly([Mo, Tu, We, Th, Fr]),
            9 => Days::weekly([Sa, Su]),
            10 => Days::weekly([Mo, We, Fr]),
            11 => Days::weekly([Tu, Th]),
            12 => Days::weekly([Su, Mo, Tu, We, Th]),
            13 => Days::weekly([Fr, Sa]),
            14 => Days::Parity { parity: Parity::Odd },
            15 => Days::Parity {
                parity: Parity::Even,
            },
            other => {
                return Err(Error::SourceMalformed(format!(
                    "unrecognized scheduler day code {other}"
                )))
            }
        };
        Ok(days)
    }

    /// Inverse of [`Self::to_days`], used by the scheduler writer to encode
    /// a consolidated `Days` back into the raw field. Weekly masks that
    /// don't match one of the named shorthands (0-13) fall back to explicit
    /// bitmask mode.
    pub fn from_days(days: &Days) -> Self {
        match days {
            Days::None => RawDayCode(7), // a null days slot only ever reaches
            // the writer via a single dated occurrence, which the consolidator
            // never ranges - callers should not hit this arm in practice.
            Days::Parity { parity: Parity::Odd } => RawDayCode(14),
            Days::Parity {
                parity: Parity::Even,
            } => RawDayCode(15),
            Days::Weekly { mask } => {
                use Weekday::*;
                let sorted: std::collections::BTreeSet<_> = mask.iter().copied().collect();
                let shorthand = [
                    (7u32, [Su, Mo, Tu, We, Th, Fr, Sa].iter().copied().collect()),
                    (8, [Mo, Tu, We, Th, Fr].iter().copied().collect()),
                    (9, [Sa, Su].iter().copied().collect()),
                    (10, [Mo, We, Fr].iter().copied().collect()),
                    (11, [Tu, Th].iter().copied().collect()),
                    (12, [Su, Mo, Tu, We, Th].iter().copied().collect()),
                    (13, [Fr, Sa].iter().copied().collect()),
                ]
                .into_iter()
                .find(|(_, set): &(u32, std::collections::BTreeSet<Weekday>)| *set == sorted);

                if let Some((code, _)) = shorthand {
                    return RawDayCode(code);
                }
                if sorted.len() == 1 {
                    return RawDayCode(match sorted.iter().next().unwrap() {
                        Su => 0,
                        Mo => 1,
                        Tu => 2,
                        We => 3,
                        Th => 4,
                        Fr => 5,
                        Sa => 6,
                    });
                }

                let mut raw = BITMASK_FLAG;
                for wd in sorted {
                    raw |= match wd {
                        Su => BIT_SU,
                        Mo => BIT_MO,
                        Tu => BIT_TU,
                        We => BIT_WE,
                        Th => BIT_TH,
                        Fr => BIT_FR,
                        Sa => BIT_SA,
                    };
                }
                RawDayCode(raw)
            }
        }
    }
}

/// One row of the scheduler's flat on-disk list (§6). `start_date`/
/// `end_date`/`start_time`/`end_time` are already-typed `DateSpec`/
/// `TimeSpec` values rather than raw strings: the `SchedulerReader`
/// collaborator (out of scope, §1) is responsible for recognizing a named
/// holiday or a `Dawn|SunRise|SunSet|Dusk±offset` token and producing the
/// symbolic variant, the same way the `CalendarLexer` hands the core
/// already-parsed `NaiveDateTime`s instead of raw ICS text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerRow {
    pub kind: IdentityKind,
    /// `target` for playlist/sequence rows, the command name for command
    /// rows.
    pub target_or_command: String,
    pub args: Option<String>,
    pub enabled: bool,
    pub start_time: crate::timing::TimeSpec,
    pub end_time: crate::timing::TimeSpec,
    pub start_date: crate::timing::DateSpec,
    pub end_date: crate::timing::DateSpec,
    pub day: RawDayCodeValue,
    pub stop_type_raw: u8,
    pub repeat_raw: i32,
    /// The management tag round-tripped by the writer (§6): present only on
    /// rows this system authored.
    pub tag: Option<String>,
}

/// Newtype so `RawDayCode` (which intentionally has no `Serialize`, since
/// it's a computed/derived value, not a stored one) can still sit inside a
/// `Serialize`-able row for fixtures/tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDayCodeValue(pub u32);

/// Inbound: reads the scheduler's current flat row list (§6).
pub trait SchedulerReader {
    fn read(&self) -> Result<Vec<SchedulerRow>>;
}

/// Outbound: atomic replace of the on-disk row list (§6). Unmanaged rows
/// pass through verbatim; managed rows are authored with a fresh
/// [`management_tag`].
pub trait SchedulerWriter {
    fn write(&self, rows: &[SchedulerRow]) -> Result<()>;
}

impl From<RawDayCodeValue> for RawDayCode {
    fn from(v: RawDayCodeValue) -> Self {
        RawDayCode(v.0)
    }
}

/// Maps the raw `0|1|2` on-disk stop-type field to [`StopType`]. The source
/// format documents only the three integers, not names; §8 open questions
/// leaves tie-breaking policy as a documented knob, and this mapping is
/// recorded the same way in DESIGN.md rather than guessed silently.
pub fn stop_type_from_raw(raw: u8) -> StopType {
    match raw {
        1 => StopType::Hard,
        2 => StopType::GracefulLoop,
        _ => StopType::Graceful,
    }
}

pub fn stop_type_to_raw(stop_type: StopType) -> u8 {
    match stop_type {
        StopType::Graceful => 0,
        StopType::Hard => 1,
        StopType::GracefulLoop => 2,
    }
}

/// The management tag format (§6 outbound `SchedulerWriter`):
/// `|GCS:v1|uid=<uid>|range=<start..end>|days=<short-days>`.
pub fn management_tag(identity_hash: &str, start: NaiveDate, end: NaiveDate, days: &Days) -> String {
    format!(
        "|GCS:v1|uid={identity_hash}|range={}..{}|days={}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        short_days(days)
    )
}

fn short_days(days: &Days) -> String {
    match days {
        Days::None => "-".to_string(),
        Days::Parity {
            parity: Parity::Odd,
        } => "odd".to_string(),
        Days::Parity {
            parity: Parity::Even,
        } => "even".to_string(),
        Days::Weekly { mask } => {
            let names = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];
            Weekday::ALL
                .iter()
                .zip(names)
                .filter(|(wd, _)| mask.contains(wd))
                .map(|(_, n)| n)
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}

/// Parses a previously-authored management tag back into
/// `(identity_hash, start, end)`. Returns `None` for unmanaged/foreign rows
/// (pass-through verbatim per §6).
pub fn parse_management_tag(tag: &str) -> Option<(String, NaiveDate, NaiveDate)> {
    if !tag.starts_with("|GCS:v1|") {
        return None;
    }
    let mut uid = None;
    let mut range = None;
    for field in tag.split('|').filter(|s| !s.is_empty() && *s != "GCS:v1") {
        if let Some(v) = field.strip_prefix("uid=") {
            uid = Some(v.to_string());
        } else if let Some(v) = field.strip_prefix("range=") {
            range = v.split_once("..").and_then(|(s, e)| {
                Some((
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?,
                    NaiveDate::parse_from_str(e, "%Y-%m-%d").ok()?,
                ))
            });
        }
    }
    let uid = uid?;
    let (start, end) = range?;
    Some((uid, start, end))
}

/// Encodes a managed `ManifestEvent` back into its scheduler rows (the
/// inverse of `normalize::scheduler::normalize_row`): one `SchedulerRow` per
/// `SubEvent`, each tagged with [`management_tag`] so a later run can
/// recognize and re-read it back as the same identity.
pub fn encode_scheduler_rows(event: &ManifestEvent) -> Vec<SchedulerRow> {
    event
        .sub_events
        .iter()
        .filter_map(|sub| {
            let start = sub.timing.start_date.as_hard()?;
            let end = sub.timing.end_date.as_hard()?;
            let tag = management_tag(&event.identity_hash, start, end, &sub.timing.days);
            Some(SchedulerRow {
                kind: event.identity.kind,
                target_or_command: event.identity.target.clone(),
                args: sub
                    .payload
                    .extra
                    .get("args")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                enabled: sub.behavior.enabled,
                start_time: sub.timing.start_time.clone(),
                end_time: sub.timing.end_time.clone(),
                start_date: sub.timing.start_date.clone(),
                end_date: sub.timing.end_date.clone(),
                day: RawDayCodeValue(RawDayCode::from_days(&sub.timing.days).0),
                stop_type_raw: stop_type_to_raw(sub.behavior.stop_type),
                repeat_raw: match sub.behavior.repeat {
                    Repeat::None => 0,
                    Repeat::Loop => 1,
                },
                tag: Some(tag),
            })
        })
        .collect()
}
