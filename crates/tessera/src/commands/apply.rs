use crate::utils::{self, Context};
use anyhow::Context as _;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use tessera_cloud::{DiffMode, PLAN_FORMAT_VERSION, Plan};
use tessera_core::Project;

enum PlanSource {
    Saved(Plan),
    Config(Project),
}

/// Apply the configuration, or a plan saved with `plan --out`
pub async fn handle(
    ctx: &Context,
    plan_file: Option<&Path>,
    refresh: Option<bool>,
    yes: bool,
) -> anyhow::Result<ExitCode> {
    let source = match plan_file {
        Some(path) => PlanSource::Saved(read_plan(path)?),
        None => PlanSource::Config(ctx.load_project()?),
    };
    let engine = ctx.engine(refresh);

    let mut session = engine.begin().await?;
    tracing::debug!(lock_id = session.lock_id(), "Acquired state lock");

    let plan = match source {
        PlanSource::Saved(plan) => plan,
        PlanSource::Config(project) => session.plan(&project.graph, DiffMode::Apply).await?,
    };
    utils::print_plan(&plan);

    if !plan.has_changes() {
        session.release().await?;
        return Ok(ExitCode::SUCCESS);
    }
    // A saved plan was already reviewed
    if plan_file.is_none() && !yes {
        println!();
        println!("To apply these changes, run again with --yes");
        session.release().await?;
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    println!("{}", "Applying...".blue());
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

fn read_plan(path: &Path) -> anyhow::Result<Plan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&content)
        .with_context(|| format!("Invalid plan file {}", path.display()))?;
    if plan.format_version != PLAN_FORMAT_VERSION {
        anyhow::bail!(
            "Unsupported plan format version '{}' (expected '{}')",
            plan.format_version,
            PLAN_FORMAT_VERSION
        );
    }
    Ok(plan)
}
