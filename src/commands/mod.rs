pub mod adopt;
pub mod apply;
pub mod export;
pub mod plan;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use calsched_core::config::PipelineConfig;
use calsched_core::holiday::{FixedSolarOracle, TableHolidayResolver};
use calsched_core::ics::CalendarLexer;
use calsched_core::manifest::Manifest;
use calsched_core::normalize::NormalizeContext;
use calsched_core::pipeline::{build_calendar_manifest, build_scheduler_manifest};
use calsched_core::reconcile::{Action, ReconcileInput, ReconcileOutput, Reconciler};
use calsched_core::scheduler_row::SchedulerReader;
use calsched_core::store::StateStore;
use chrono::{Datelike, Utc};

use crate::fetch::fetch_calendar_bytes;
use crate::scheduler_file::JsonSchedulerFile;

/// Everything a `plan`/`apply` run needs, assembled once so both commands
/// (and `adopt`) share one code path up to the point where they diverge.
pub struct RunContext {
    pub config: PipelineConfig,
    pub store: StateStore,
    pub scheduler_file: JsonSchedulerFile,
    pub cal_manifest: Manifest,
    pub fpp_manifest: Manifest,
    pub current_manifest: Manifest,
    pub reconciled: ReconcileOutput,
}

pub async fn assemble() -> Result<RunContext> {
    let config_path = PipelineConfig::config_path().context("resolving config path")?;
    let config = PipelineConfig::load(&config_path).context("loading configuration")?;
    let store = StateStore::new(config.state_dir());
    let scheduler_file = JsonSchedulerFile::new(config.scheduler_path());

    let now = Utc::now();
    let current_manifest = store.load_manifest()?.unwrap_or_else(|| Manifest::new(now));

    let holidays = TableHolidayResolver::new();
    let solar = FixedSolarOracle::default();
    let ctx = NormalizeContext {
        holidays: &holidays,
        solar: &solar,
        lat: 0.0,
        lon: 0.0,
        year: now.year(),
    };

    let calendar_bytes = if config.calendar_source.is_empty() {
        Vec::new()
    } else {
        fetch_calendar_bytes(&config.calendar_source).await?
    };
    let calendar_rows = if calendar_bytes.is_empty() {
        Vec::new()
    } else {
        calsched_core::ics::IcsCalendarLexer
            .parse(&calendar_bytes)
            .map_err(anyhow::Error::from)?
    };

    let horizon_start = now;
    let horizon_end = now + chrono::Duration::days(config.horizon_days);

    let locked_by_uid: BTreeMap<String, bool> = current_manifest
        .events
        .values()
        .filter_map(|e| e.correlation.source_uid.clone().map(|uid| (uid, e.ownership.locked)))
        .collect();
    let (cal_manifest, warnings) = build_calendar_manifest(
        calendar_rows,
        &ctx,
        &config.calendar_scope,
        horizon_start,
        horizon_end,
        now,
        |uid| locked_by_uid.get(uid).copied().unwrap_or(false),
    )
    .map_err(anyhow::Error::from)?;
    for warning in &warnings {
        tracing::warn!(message = %warning.message, "calendar normalize warning");
    }

    let scheduler_rows = scheduler_file.read().map_err(anyhow::Error::from)?;
    let locked_by_identity: BTreeMap<String, bool> = current_manifest
        .events
        .iter()
        .map(|(id, e)| (id.clone(), e.ownership.locked))
        .collect();
    let fpp_manifest = build_scheduler_manifest(&scheduler_rows, &ctx, now, |id| {
        locked_by_identity.get(id).copied().unwrap_or(false)
    })
    .map_err(anyhow::Error::from)?;

    // `cal_updated_at` comes straight from the ICS source's own
    // LAST-MODIFIED/DTSTAMP provenance (already folded into each event by
    // `IntentNormalizer`); the scheduler has no such per-row field, so its
    // side is seeded/maintained by `StateStore::rebuild_updated_at_from_schedule_mtime`
    // from the schedule file's single mtime.
    let cal_updated_at: BTreeMap<String, i64> = cal_manifest
        .events
        .iter()
        .map(|(id, e)| (id.clone(), e.provenance.updated_at_epoch.or(e.provenance.dtstamp_epoch).unwrap_or(0)))
        .collect();
    let schedule_mtime_epoch = scheduler_file
        .mtime_epoch()
        .unwrap_or_else(|_| now.timestamp());
    let fpp_timestamps = store.rebuild_updated_at_from_schedule_mtime(schedule_mtime_epoch, &fpp_manifest, now.timestamp())?;
    store.save_updated_at(&fpp_timestamps)?;
    let fpp_updated_at = fpp_timestamps.updated_at_map();
    let tombstones = store.load_tombstones()?;

    let reconciled = Reconciler::reconcile(ReconcileInput {
        cal_manifest: &cal_manifest,
        fpp_manifest: &fpp_manifest,
        current_manifest: &current_manifest,
        cal_updated_at: &cal_updated_at,
        fpp_updated_at: &fpp_updated_at,
        tombstones: &tombstones,
        cal_snapshot_epoch: now.timestamp(),
        fpp_snapshot_epoch: now.timestamp(),
        sync_mode: config.sync_mode()?,
        calendar_scope: &config.calendar_scope,
    })
    .map_err(anyhow::Error::from)?;

    Ok(RunContext {
        config,
        store,
        scheduler_file,
        cal_manifest,
        fpp_manifest,
        current_manifest,
        reconciled,
    })
}

pub fn render_action(action: &Action) -> String {
    use calsched_core::reconcile::ActionKind::*;
    let marker = match action.kind {
        Create => "+",
        Update => "~",
        Delete => "-",
        Noop => " ",
        Block => "!",
    };
    let target = match action.target {
        calsched_core::reconcile::Target::Calendar => "calendar",
        calsched_core::reconcile::Target::Scheduler => "scheduler",
    };
    format!(
        "{marker} [{target}] {} ({})",
        action.identity_hash, action.reason
    )
}
