use crate::commands::common::CliContext;
use crate::error::CliError;

/// One complete cycle: push, pull, reconcile and aggregate, purge.
pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;

    let report = engine.full_sync().await;
    if !report.pushed {
        println!("Sync failed: local changes were not uploaded ({})", engine.sync_state());
        return Ok(());
    }
    println!("Sync completed: {} records changed", report.changed);

    let lifecycle = engine.sync_lifecycles().await;
    println!(
        "Lifecycle: {} linked, {} updated",
        lifecycle.linked, lifecycle.updated
    );

    let purged = engine.purge_stale_pending().await;
    if purged > 0 {
        println!("Purged {purged} completed pending submissions");
    }
    Ok(())
}

pub async fn run_pull(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let changed = engine.pull().await;
    println!("Pulled {changed} changes");
    Ok(())
}

pub async fn run_push(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    if engine.push_all().await {
        println!("Push completed");
    } else {
        println!("Push failed; local records are unchanged and will be retried");
    }
    Ok(())
}
