//! Groups raw calendar rows by UID into bundles (§4.B "CalendarSnapshotter").

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::calendar_row::{CalendarRow, RowStatus};
use crate::error::{Error, Result, Warning};
use crate::event::StopType;

/// An instance exception captured during snapshotting, not yet expanded
/// into a full intent (§4.B, §4.A "captured as an OverrideIntent").
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideIntent {
    pub original_start: NaiveDateTime,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub summary: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub stop_type: StopType,
}

/// A calendar UID's worth of rows after snapshotting: one base, plus
/// cancellations and overrides attached to it (glossary "Bundle").
#[derive(Debug, Clone)]
pub struct Bundle {
    pub base_row: CalendarRow,
    pub cancelled_dates: std::collections::BTreeSet<NaiveDateTime>,
    pub overrides: Vec<OverrideIntent>,
    pub source_rows: Vec<CalendarRow>,
}

pub struct CalendarSnapshotter;

impl CalendarSnapshotter {
    /// Three deterministic passes over `rows` (§4.B). Returns the bundle map
    /// plus any recoverable per-row warnings (a row with no `uid` is
    /// skipped, not fatal); an orphan cancellation/override referencing an
    /// unknown parent UID is fatal (`SourceMalformed`).
    pub fn snapshot(rows: Vec<CalendarRow>) -> Result<(BTreeMap<String, Bundle>, Vec<Warning>)> {
        let mut warnings = Vec::new();
        let mut bundles: BTreeMap<String, Bundle> = BTreeMap::new();

        // Pass 1: bases.
        let mut linked_rows = Vec::new();
        for row in rows {
            if row.uid.trim().is_empty() {
                warnings.push(Warning::new("calendar row missing uid, skipped"));
                continue;
            }
            if row.parent_uid.is_none() {
                bundles.insert(
                    row.uid.clone(),
                    Bundle {
                        base_row: row.clone(),
                        cancelled_dates: std::collections::BTreeSet::new(),
                        overrides: Vec::new(),
                        source_rows: vec![row],
                    },
                );
            } else {
                linked_rows.push(row);
            }
        }

        // Pass 2: cancellations.
        let mut remaining = Vec::new();
        for row in linked_rows {
            let is_cancelled = matches!(row.status, Some(RowStatus::Cancelled));
            if is_cancelled {
                let parent_uid = row.parent_uid.clone().unwrap();
                let bundle = bundles.get_mut(&parent_uid).ok_or_else(|| {
                    Error::SourceMalformed(format!(
                        "cancellation for unknown parent uid '{parent_uid}'"
                    ))
                })?;
                let original_start = row.recurrence_id.unwrap_or(row.start);
                bundle.cancelled_dates.insert(original_start);
                bundle.source_rows.push(row);
            } else {
                remaining.push(row);
            }
        }

        // Pass 3: overrides.
        for row in remaining {
            let parent_uid = row.parent_uid.clone().unwrap();
            let bundle = bundles.get_mut(&parent_uid).ok_or_else(|| {
                Error::SourceMalformed(format!("override for unknown parent uid '{parent_uid}'"))
            })?;
            let original_start = row.recurrence_id.unwrap_or(row.start);
            bundle.overrides.push(OverrideIntent {
                original_start,
                start: row.start,
                end: row.end,
                summary: row.summary.clone(),
                description: row.description.clone(),
                enabled: !matches!(row.status, Some(RowStatus::Cancelled)),
                stop_type: StopType::default(),
            });
            bundle.source_rows.push(row);
        }

        // Overrides are appended in input order per bundle already; make
        // that explicit and stable by sorting on original_start so two runs
        // over differently-ordered-but-identical input agree.
        for bundle in bundles.values_mut() {
            bundle
                .overrides
                .sort_by_key(|o| o.original_start);
        }

        Ok((bundles, warnings))
    }
}
