use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use findash::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for findash::AppCommand {
    fn from(cmd: Commands) -> findash::AppCommand {
        match cmd {
            Commands::Summary => findash::AppCommand::Summary,
            Commands::History { name, refresh } => findash::AppCommand::History { name, refresh },
            Commands::Networth => findash::AppCommand::NetWorth,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display balances of all assets and liabilities
    Summary,
    /// Display the value history of one account
    History {
        /// Account name (case-sensitive)
        name: String,
        /// Re-fetch the history even if already loaded (requires allow_refresh)
        #[arg(long)]
        refresh: bool,
    },
    /// Display net worth over time
    Networth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => findash::cli::setup::setup(),
        Some(cmd) => findash::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
