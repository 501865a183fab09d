use crate::utils::{self, Context};
use colored::Colorize;
use std::process::ExitCode;
use tessera_cloud::DiffMode;

/// Destroy every resource recorded in state
pub async fn handle(ctx: &Context, refresh: Option<bool>, yes: bool) -> anyhow::Result<ExitCode> {
    let project = ctx.load_project()?;
    let engine = ctx.engine(refresh);

    let mut session = engine.begin().await?;
    let plan = session.plan(&project.graph, DiffMode::Destroy).await?;
    utils::print_plan(&plan);

    if !plan.has_changes() {
        session.release().await?;
        return Ok(ExitCode::SUCCESS);
    }
    if !yes {
        println!();
        println!(
            "{}",
            "Warning: every resource above will be deleted.".yellow()
        );
        println!("To destroy, run again with --yes");
        session.release().await?;
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    println!("{}", "Destroying...".red());
    let (cancel, watcher) = utils::cancel_on_ctrl_c();
    let result = session.apply(&plan, cancel).await;
    watcher.abort();
    session.release().await?;

    if utils::print_apply_result(&result?) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
