//! `calsched adopt`: imports unmanaged scheduler rows as unmanaged intents
//! (§1.4), so a later `plan`/`apply` recognizes them as already-known
//! foreign rows instead of re-discovering them fresh every run.

use anyhow::Result;

use super::assemble;

pub async fn run() -> Result<()> {
    let ctx = assemble().await?;

    let mut manifest = ctx.current_manifest;
    let mut adopted = 0usize;
    for event in ctx.fpp_manifest.events.into_values() {
        if event.ownership.managed {
            continue;
        }
        ctx.store.upsert_event(&mut manifest, event)?;
        adopted += 1;
    }

    if adopted == 0 {
        println!("No unmanaged scheduler rows to adopt.");
        return Ok(());
    }

    ctx.store.save_manifest(&manifest)?;
    println!("Adopted {adopted} unmanaged scheduler row(s) into the manifest.");
    Ok(())
}
