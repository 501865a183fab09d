mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use utils::Context;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Declarative infrastructure reconciliation", long_about = None)]
struct Cli {
    /// Project directory (defaults to searching upward from the current directory)
    #[arg(short = 'C', long, global = true, env = "TESSERA_PROJECT_ROOT")]
    project: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct RefreshArgs {
    /// Read current resource state from providers before planning
    #[arg(long, overrides_with = "no_refresh")]
    refresh: bool,

    /// Plan against recorded state only
    #[arg(long, overrides_with = "refresh")]
    no_refresh: bool,
}

impl RefreshArgs {
    fn value(self) -> Option<bool> {
        match (self.refresh, self.no_refresh) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create tessera.kdl if missing and validate the configuration
    Init,
    /// Show the changes apply would make
    Plan {
        /// Plan the destruction of every recorded resource
        #[arg(long)]
        destroy: bool,
        /// Save the plan as JSON for a later `apply`
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Exit with 2 when changes are pending
        #[arg(long)]
        detailed_exitcode: bool,
        #[command(flatten)]
        refresh: RefreshArgs,
    },
    /// Reconcile infrastructure with the configuration
    Apply {
        /// Plan file saved by `plan --out`
        plan: Option<PathBuf>,
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        #[command(flatten)]
        refresh: RefreshArgs,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        #[command(flatten)]
        refresh: RefreshArgs,
    },
    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommands),
    /// Remove a stale state lock
    #[command(name = "force-unlock")]
    ForceUnlock {
        /// Lock id reported by the failing command
        lock_id: String,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List,
    /// Show one recorded resource
    Show {
        /// Resource address (`<type>.<name>`)
        address: String,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Commands that work without a project
    match &cli.command {
        Commands::Version => {
            println!("tessera {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Init => {
            let dir = match cli.project.clone() {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            commands::init::handle(&dir).await?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let ctx = Context::discover(cli.project.as_deref())?;

    match cli.command {
        Commands::Plan {
            destroy,
            out,
            detailed_exitcode,
            refresh,
        } => {
            commands::plan::handle(
                &ctx,
                destroy,
                refresh.value(),
                out.as_deref(),
                detailed_exitcode,
            )
            .await
        }
        Commands::Apply { plan, yes, refresh } => {
            commands::apply::handle(&ctx, plan.as_deref(), refresh.value(), yes).await
        }
        Commands::Destroy { yes, refresh } => {
            commands::destroy::handle(&ctx, refresh.value(), yes).await
        }
        Commands::State(StateCommands::List) => {
            commands::state::handle_list(&ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::State(StateCommands::Show { address }) => {
            commands::state::handle_show(&ctx, &address).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ForceUnlock { lock_id } => {
            commands::unlock::handle(&ctx, &lock_id).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version | Commands::Init => Ok(ExitCode::SUCCESS),
    }
}
