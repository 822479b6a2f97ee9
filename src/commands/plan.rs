//! `calsched plan`: prints the action list without touching anything (§1.4).

use anyhow::Result;

use super::{assemble, render_action};

pub async fn run() -> Result<()> {
    let ctx = assemble().await?;

    if ctx.reconciled.actions.iter().all(|a| !a.is_executable()) {
        println!("No changes.");
        return Ok(());
    }

    for action in &ctx.reconciled.actions {
        println!("{}", render_action(action));
    }
    Ok(())
}
