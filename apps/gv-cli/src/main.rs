//! # gv-cli
//!
//! Command-line interface for governance policies.
//!
//! - `gv policy check/fmt/eval`: compile, format and evaluate policy files
//! - `gv audit verify/tail/drain`: inspect the hash-chained audit log
//! - `gv audit keygen/checkpoint/verify-checkpoint`: signed chain checkpoints
//! - `gv replay`: read-only history queries over the audit log

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gv_governor::GovernorConfig;
use tracing_subscriber::EnvFilter;

/// Governance policy CLI: check policies and inspect what was decided.
#[derive(Parser)]
#[command(name = "gv", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, format and evaluate policy files.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Replay recorded history.
    Replay(commands::replay::ReplayArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gv=warn".parse()?))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = GovernorConfig::load_from_project(&project_root)?;
    tracing::debug!(
        project_root = %project_root.display(),
        tenant = %config.tenant_id,
        "loaded governor config"
    );

    match &cli.command {
        Commands::Policy { command } => commands::policy::execute(command, &config),
        Commands::Audit { command } => commands::audit::execute(command, &config),
        Commands::Replay(args) => commands::replay::execute(args, &config),
    }
}
