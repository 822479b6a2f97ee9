//! `calsched apply`: executes the reconciled action list (§1.4) against the
//! injected `SchedulerWriter`/`CalendarClient` collaborators, then persists
//! the new target Manifest and tombstone table.

use anyhow::Result;
use calsched_core::calendar_row::CalendarRow;
use calsched_core::ics::{CalendarClient, NoopCalendarClient};
use calsched_core::reconcile::{ActionKind, Target};
use calsched_core::scheduler_row::{encode_scheduler_rows, parse_management_tag, SchedulerWriter};

use super::{assemble, render_action};

pub async fn run() -> Result<()> {
    let ctx = assemble().await?;
    let executable: Vec<_> = ctx.reconciled.actions.iter().filter(|a| a.is_executable()).collect();
    if executable.is_empty() {
        println!("No changes.");
        return Ok(());
    }

    let mut scheduler_rows = ctx.scheduler_file.read()?;
    let calendar_client = NoopCalendarClient;

    for action in &executable {
        println!("{}", render_action(action));
        match action.target {
            Target::Scheduler => apply_scheduler_action(&mut scheduler_rows, action),
            Target::Calendar => apply_calendar_action(&calendar_client, action)?,
        }
    }
    ctx.scheduler_file.write(&scheduler_rows)?;
    ctx.store.save_manifest(&ctx.reconciled.target_manifest)?;

    let tombstones = refresh_tombstones(&ctx);
    ctx.store.save_tombstones(&tombstones)?;

    Ok(())
}

fn apply_scheduler_action(rows: &mut Vec<calsched_core::scheduler_row::SchedulerRow>, action: &calsched_core::reconcile::Action) {
    rows.retain(|row| {
        row.tag
            .as_deref()
            .and_then(parse_management_tag)
            .map(|(id, _, _)| id != action.identity_hash)
            .unwrap_or(true)
    });
    if let Some(event) = &action.event {
        if action.kind != ActionKind::Delete {
            rows.extend(encode_scheduler_rows(event));
        }
    }
}

fn apply_calendar_action(client: &dyn CalendarClient, action: &calsched_core::reconcile::Action) -> Result<()> {
    match action.kind {
        ActionKind::Delete => client.delete(&action.identity_hash).map_err(anyhow::Error::from),
        ActionKind::Create | ActionKind::Update => {
            let Some(event) = &action.event else {
                return Ok(());
            };
            let Some(row) = CalendarRow::from_manifest_event(event) else {
                return Ok(());
            };
            let result = match action.kind {
                ActionKind::Create => client.create(&row),
                _ => client.update(&row),
            };
            result.map_err(anyhow::Error::from)
        }
        ActionKind::Noop | ActionKind::Block => Ok(()),
    }
}

/// Recomputes the tombstone table from this run's three manifests: an
/// identity that dropped out of a source manifest since `current` gets a
/// fresh entry timestamped now (if it doesn't already have one); an
/// identity that reappeared in the target manifest has its entry cleared,
/// since it is no longer absent (§4.I "observed absence").
fn refresh_tombstones(ctx: &super::RunContext) -> calsched_core::reconcile::Tombstones {
    let mut tombstones = ctx.store.load_tombstones().unwrap_or_default();
    let now = chrono::Utc::now().timestamp();

    for id in ctx.current_manifest.events.keys() {
        if !ctx.cal_manifest.events.contains_key(id) {
            tombstones.calendar.entry(id.clone()).or_insert(now);
        }
        if !ctx.fpp_manifest.events.contains_key(id) {
            tombstones.scheduler.entry(id.clone()).or_insert(now);
        }
    }
    tombstones.calendar.retain(|id, _| !ctx.reconciled.target_manifest.events.contains_key(id));
    tombstones.scheduler.retain(|id, _| !ctx.reconciled.target_manifest.events.contains_key(id));
    tombstones
}
