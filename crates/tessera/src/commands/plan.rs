use crate::utils::{self, Context};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use tessera_cloud::DiffMode;

/// Exit code for `--detailed-exitcode` when changes are pending
pub const EXIT_CHANGES_PENDING: u8 = 2;

pub async fn handle(
    ctx: &Context,
    destroy: bool,
    refresh: Option<bool>,
    out: Option<&Path>,
    detailed_exitcode: bool,
) -> anyhow::Result<ExitCode> {
    let project = ctx.load_project()?;
    let engine = ctx.engine(refresh);
    let mode = if destroy {
        DiffMode::Destroy
    } else {
        DiffMode::Apply
    };

    let plan = engine.plan(&project.graph, mode).await?;
    utils::print_plan(&plan);

    if let Some(path) = out {
        let json = serde_json::to_string_pretty(&plan)?;
        std::fs::write(path, json)?;
        println!();
        println!(
            "{} {}",
            "Saved plan to".green(),
            path.display().to_string().cyan()
        );
        println!("Apply it with: tessera apply {}", path.display());
    }

    if detailed_exitcode && plan.has_changes() {
        return Ok(ExitCode::from(EXIT_CHANGES_PENDING));
    }
    Ok(ExitCode::SUCCESS)
}
