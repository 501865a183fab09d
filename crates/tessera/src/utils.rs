use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tessera_cloud::{
    ApplyResult, CancelHandle, CancelSignal, ChangeAction, Engine, EngineOptions, LockOptions,
    Plan, ProviderRegistry, ResourceProvider, RetryConfig, RetryingProvider, StateStore,
};
use tessera_config::Settings;
use tessera_core::Project;
use tessera_cloud_local::LocalProvider;

/// Project root plus effective settings
pub struct Context {
    pub root: PathBuf,
    pub settings: Settings,
}

impl Context {
    /// Locate the project root (from `start` when given) and load settings
    pub fn discover(start: Option<&Path>) -> anyhow::Result<Self> {
        let root = match start {
            Some(dir) => tessera_core::find_project_root_from(dir)?,
            None => tessera_core::find_project_root()?,
        };
        let settings = tessera_config::load_settings(Some(&root))?;
        tracing::debug!(root = %root.display(), ?settings, "Project context");
        Ok(Self { root, settings })
    }

    pub fn load_project(&self) -> anyhow::Result<Project> {
        Ok(tessera_core::load_project_from_root(&self.root)?)
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.root)
    }

    /// Engine over the built-in providers; `refresh` overrides the setting
    pub fn engine(&self, refresh: Option<bool>) -> Engine {
        let settings = &self.settings;
        let options = EngineOptions {
            parallelism: settings.parallelism,
            refresh: refresh.unwrap_or(settings.refresh),
            lock: LockOptions {
                timeout: Duration::from_secs(settings.lock_timeout_secs),
                ttl: Duration::from_secs(settings.lock_ttl_secs),
            },
        };
        Engine::new(self.registry(), self.store(), options)
    }

    fn registry(&self) -> ProviderRegistry {
        let local: Arc<dyn ResourceProvider> = Arc::new(LocalProvider::new(&self.root));
        ProviderRegistry::new().with_provider(self.with_retry(local))
    }

    fn with_retry(&self, provider: Arc<dyn ResourceProvider>) -> Arc<dyn ResourceProvider> {
        let retry = &self.settings.retry;
        if !retry.enabled() {
            return provider;
        }
        let config = RetryConfig {
            max_attempts: retry.max_attempts,
            initial_delay: Duration::from_millis(retry.initial_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            ..RetryConfig::default()
        };
        Arc::new(RetryingProvider::new(provider, config))
    }
}

/// Cancel the returned signal on Ctrl-C
pub fn cancel_on_ctrl_c() -> (CancelSignal, tokio::task::JoinHandle<()>) {
    let (handle, signal) = CancelHandle::new();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "Interrupt received, stopping in-flight operations...".yellow()
            );
            handle.cancel();
        }
    });
    (signal, watcher)
}

fn symbol(action: &ChangeAction) -> colored::ColoredString {
    match action {
        ChangeAction::Create => "+".green(),
        ChangeAction::Update => "~".yellow(),
        ChangeAction::Replace { .. } => "-/+".magenta(),
        ChangeAction::Destroy => "-".red(),
        ChangeAction::NoOp => " ".normal(),
    }
}

/// Print a plan batch by batch
pub fn print_plan(plan: &Plan) {
    if !plan.has_changes() {
        println!(
            "{}",
            "No changes. Infrastructure matches the configuration.".green()
        );
        return;
    }

    let verb = if plan.destroy { "destroy" } else { "apply" };
    println!("{}", format!("Tessera will {} the following:", verb).bold());
    for (index, batch) in plan.batches.iter().enumerate() {
        println!();
        println!("{}", format!("Batch {}:", index + 1).dimmed());
        for address in &batch.addresses {
            let Some(change) = plan.change(address) else {
                continue;
            };
            println!(
                "  {} {} ({})",
                symbol(&change.action),
                address.cyan(),
                change.action
            );
            match &change.action {
                ChangeAction::Replace { forced_by } => {
                    println!("      forced by: {}", forced_by.join(", ").yellow());
                }
                ChangeAction::Update => {
                    for attribute in &change.changed {
                        println!("      {} {}", "~".yellow(), attribute);
                    }
                }
                _ => {}
            }
        }
    }
    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
}

/// Print an apply report; returns whether every node succeeded
pub fn print_apply_result(result: &ApplyResult) -> bool {
    println!();
    for success in &result.succeeded {
        println!("  {} {} {}", "✓".green(), success.address.cyan(), success.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {} ({}): {}",
            "✗".red(),
            failure.address.cyan(),
            failure.action,
            failure.error.as_deref().unwrap_or("unknown error").red()
        );
    }
    for address in &result.interrupted {
        println!("  {} {} interrupted", "!".yellow(), address.cyan());
    }
    for address in &result.not_attempted {
        println!("  {} {} not attempted", "-".dimmed(), address);
    }

    println!();
    let summary = format!(
        "{} succeeded, {} failed, {} interrupted, {} not attempted in {}ms",
        result.succeeded.len(),
        result.failed.len(),
        result.interrupted.len(),
        result.not_attempted.len(),
        result.duration_ms
    );
    if result.is_success() {
        println!("{} {}", "Apply complete:".green().bold(), summary);
        true
    } else if result.cancelled {
        println!("{} {}", "Apply cancelled:".yellow().bold(), summary);
        false
    } else {
        println!("{} {}", "Apply failed:".red().bold(), summary);
        false
    }
}
