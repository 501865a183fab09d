use crate::utils::Context;
use colored::Colorize;

/// List every record in state
pub async fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let snapshot = ctx.store().load().await?;
    if snapshot.is_empty() {
        println!("{}", "State is empty.".dimmed());
        return Ok(());
    }
    for record in snapshot.records.values() {
        println!(
            "{}  {}",
            record.address.cyan(),
            record.provider_id.dimmed()
        );
    }
    println!();
    println!(
        "{} resources (serial {})",
        snapshot.len(),
        snapshot.serial
    );
    Ok(())
}

/// Show one record as JSON
pub async fn handle_show(ctx: &Context, address: &str) -> anyhow::Result<()> {
    let snapshot = ctx.store().load().await?;
    let record = snapshot
        .get(address)
        .ok_or_else(|| anyhow::anyhow!("No resource '{}' in state", address))?;
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}
