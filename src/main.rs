use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use commander::config::Config;
use commander::core::Plan;
use commander::orchestration::{builtin_registry, SerialFailurePolicy};
use commander::{clog, clog_warn, Orchestrator, Result};

/// Commander - stage plan runner for the RTS control layer
#[derive(Parser, Debug)]
#[command(name = "commander")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    COMMANDER_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.commander/commander.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.commander/commander.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a plan with the built-in handlers and print the JSON report
    Run {
        /// Path to a JSON plan file
        plan: PathBuf,

        /// Run id used to namespace blackboard keys
        #[arg(long, default_value = "cli")]
        run_id: String,

        /// Stop a serial stage at its first failed action
        #[arg(long)]
        abort_on_failure: bool,

        /// Give up on the whole run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Check that a plan file parses and is well formed
    Validate {
        /// Path to a JSON plan file
        plan: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    commander::log::init(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Run {
            plan,
            run_id,
            abort_on_failure,
            timeout_secs,
        } => run_plan(config, &plan, &run_id, abort_on_failure, timeout_secs).await,
        Command::Validate { plan } => validate_plan(&plan),
    }
}

fn read_plan(path: &Path) -> Result<Plan> {
    Plan::from_json(&std::fs::read_to_string(path)?)
}

async fn run_plan(
    mut config: Config,
    path: &Path,
    run_id: &str,
    abort_on_failure: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let plan = read_plan(path)?;
    if abort_on_failure {
        config.interpreter.serial_failure = SerialFailurePolicy::Abort;
    }
    clog!(
        "Run command: plan={}, run_id={}, stages={}, policy={:?}",
        path.display(),
        run_id,
        plan.len(),
        config.interpreter.serial_failure
    );

    let orchestrator = Orchestrator::new(config, builtin_registry());
    let run = orchestrator.execute_subtask(plan, run_id);
    tokio::pin!(run);
    let report = match timeout_secs {
        Some(secs) => tokio::select! {
            report = &mut run => report?,
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                clog_warn!("Run command: {} still running after {}s, cancelling", run_id, secs);
                orchestrator.shutdown().await;
                run.await?
            }
        },
        None => run.await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    report.check()
}

fn validate_plan(path: &Path) -> Result<()> {
    let plan = read_plan(path)?;
    println!(
        "{}: {} stage(s), {} action(s)",
        path.display(),
        plan.len(),
        plan.action_count()
    );
    Ok(())
}
