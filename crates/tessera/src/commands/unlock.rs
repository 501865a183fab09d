use crate::utils::Context;
use colored::Colorize;

/// Remove a lock left behind by a crashed run
pub async fn handle(ctx: &Context, lock_id: &str) -> anyhow::Result<()> {
    let info = ctx.store().force_unlock(lock_id).await?;
    println!(
        "{} {} (held by {} pid {} since {})",
        "✓ Released lock".green(),
        info.id.cyan(),
        info.holder,
        info.pid,
        info.acquired_at
    );
    Ok(())
}
