//! Scheduler-side adapter (§4.C): a `SchedulerRow` already carries its own
//! date range and day mask, so it normalizes straight into a
//! [`RangedIntent`] without passing through `IntentConsolidator` at all -
//! there is no per-occurrence form to collapse.

use serde_json::json;

use crate::consolidate::{Range, RangedIntent};
use crate::error::Result;
use crate::event::{Behavior, Correlation, Ownership, Payload, Provenance, Repeat};
use crate::scheduler_row::{parse_management_tag, stop_type_from_raw, RawDayCode, SchedulerRow};
use crate::timing::Timing;

use super::{build_intent, NormalizeContext};

pub fn normalize_row(ctx: &NormalizeContext, row: &SchedulerRow, locked: bool) -> Result<RangedIntent> {
    let days = RawDayCode::from(row.day).to_days()?;

    let raw_timing = Timing {
        start_date: row.start_date.clone(),
        end_date: row.end_date.clone(),
        start_time: row.start_time.clone(),
        end_time: row.end_time.clone(),
        days,
    };

    let behavior = Behavior {
        enabled: row.enabled,
        repeat: if row.repeat_raw != 0 {
            Repeat::Loop
        } else {
            Repeat::None
        },
        stop_type: stop_type_from_raw(row.stop_type_raw),
    };

    let mut payload = Payload {
        is_override: false,
        ..Default::default()
    };
    if let Some(args) = &row.args {
        payload.extra.insert("args".into(), json!(args));
    }

    // Ownership (§4.C step 5): a row carrying our own management tag
    // originated from the calendar and is just being observed here; a
    // bare/foreign row is scheduler-native and unmanaged.
    let managed_tag = row.tag.as_deref().and_then(parse_management_tag);
    let ownership = match &managed_tag {
        Some(_) => Ownership {
            managed: true,
            locked,
            controller: Some("calendar".into()),
        },
        None => Ownership {
            managed: false,
            locked,
            controller: None,
        },
    };
    let correlation = Correlation {
        source_uid: managed_tag.as_ref().map(|(uid, _, _)| uid.clone()),
        external_ids: Vec::new(),
        calendar_scope: None,
    };
    let provenance = Provenance::default();

    let intent = build_intent(
        ctx,
        row.kind,
        row.target_or_command.trim().to_string(),
        raw_timing,
        behavior,
        payload,
        ownership,
        correlation,
        provenance,
        false,
        None,
        None,
    )?;

    // The range is read back off the already hard-resolved sub-event
    // timing, not the (possibly symbolic) source row - a scheduler row
    // anchored to "Thanksgiving" still needs a concrete window to sit in
    // the Manifest.
    let range = Range {
        start_date: intent
            .sub_event
            .timing
            .start_date
            .as_hard()
            .expect("build_intent always hard-resolves sub_event timing"),
        end_date: intent
            .sub_event
            .timing
            .end_date
            .as_hard()
            .expect("build_intent always hard-resolves sub_event timing"),
        days: intent.sub_event.timing.days.clone(),
    };

    Ok(RangedIntent {
        template: intent,
        range,
    })
}
