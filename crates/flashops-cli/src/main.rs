//! flashops - flash protocol operator console
//!
//! CLI for deploying and administering token protocols, with every
//! administrative action tracked in a durable operation ledger and
//! best-effort recovery of protocols after a redeployment.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use flashops_core::config::ConsoleConfig;
use flashops_core::recorder::OperationRecorder;
use flashops_core::records::OperationType;
use flashops_core::store::LedgerStore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

use commands::Context;

/// flashops - flash protocol operator console
#[derive(Parser, Debug)]
#[command(name = "flashops")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the console configuration file
    #[arg(short, long, default_value = "flashops.toml")]
    config: PathBuf,

    /// Override the data directory from the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run against the in-memory simulated chain instead of a network
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy a new protocol
    Deploy(commands::deploy::DeployArgs),

    /// Configure an existing protocol
    #[command(subcommand)]
    Configure(commands::configure::ConfigureCommand),

    /// Execute an operation on a protocol
    #[command(subcommand)]
    Execute(commands::execute::ExecuteCommand),

    /// Check balances and resources
    #[command(subcommand)]
    Balances(commands::balances::BalancesCommand),

    /// Inspect deployed tokens
    #[command(subcommand)]
    Tokens(commands::tokens::TokensCommand),

    /// Inspect the operation ledger
    #[command(subcommand)]
    Operations(commands::operations::OperationsCommand),

    /// Redeploy inactive protocols and replay their configuration
    Recover(commands::recover::RecoverArgs),

    /// Write a timestamped backup of the ledger document
    Backup,

    /// Write a timestamped export of the ledger document
    Export,
}

impl Commands {
    /// The error record written when this workflow fails, and the context
    /// tag it carries.
    const fn error_kind(&self) -> (OperationType, &'static str) {
        match self {
            Self::Deploy(_) => (OperationType::DeployError, "deploy"),
            Self::Configure(_) => (OperationType::ConfigureError, "configure"),
            Self::Execute(_) => (OperationType::ExecuteError, "execute"),
            Self::Balances(_) => (OperationType::BalanceCheckError, "balances"),
            Self::Tokens(_) => (OperationType::SystemError, "tokens"),
            Self::Operations(_) => (OperationType::SystemError, "operations"),
            Self::Recover(_) => (OperationType::SystemError, "recover"),
            Self::Backup => (OperationType::SystemError, "backup"),
            Self::Export => (OperationType::SystemError, "export"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = if cli.config.exists() {
        ConsoleConfig::from_file(&cli.config)
            .with_context(|| format!("failed to load config from {}", cli.config.display()))?
    } else {
        ConsoleConfig::default()
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let store = LedgerStore::open(&config.data_dir).context("failed to open ledger store")?;
    let recorder = OperationRecorder::new(store.clone());
    let chain = commands::connect(&config, cli.simulate)?;

    let ctx = Context {
        config,
        store,
        recorder,
        chain,
    };

    let (error_kind, error_context) = cli.command.error_kind();
    let result = run(&ctx, &cli.command);

    if let Err(err) = &result {
        // The ledger audits failures, not just successes; a failed append
        // here must not mask the original error.
        let message = err.to_string();
        let chain_text = format!("{err:#}");
        let stack = (chain_text != message).then_some(chain_text);
        if let Err(record_err) =
            ctx.recorder
                .record_error(error_kind, &message, stack, error_context)
        {
            tracing::warn!(error = %record_err, "failed to append error record to ledger");
        }
    }

    result
}

fn run(ctx: &Context, command: &Commands) -> Result<()> {
    match command {
        Commands::Deploy(args) => commands::deploy::run(ctx, args),
        Commands::Configure(command) => commands::configure::run(ctx, command),
        Commands::Execute(command) => commands::execute::run(ctx, command),
        Commands::Balances(command) => commands::balances::run(ctx, command),
        Commands::Tokens(command) => commands::tokens::run(ctx, command),
        Commands::Operations(command) => commands::operations::run(ctx, command),
        Commands::Recover(args) => commands::recover::run(ctx, args),
        Commands::Backup => commands::maintenance::backup(ctx),
        Commands::Export => commands::maintenance::export(ctx),
    }
}

#[cfg(test)]
mod unit_tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_error_kinds_match_workflows() {
        let cli = Cli::parse_from(["flashops", "--simulate", "backup"]);
        assert_eq!(
            cli.command.error_kind(),
            (OperationType::SystemError, "backup")
        );

        let cli = Cli::parse_from([
            "flashops",
            "--simulate",
            "deploy",
            "--abi-file",
            "abi.json",
            "--bytecode-file",
            "bytecode.hex",
        ]);
        assert_eq!(
            cli.command.error_kind(),
            (OperationType::DeployError, "deploy")
        );
    }
}
