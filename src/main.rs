use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use fundwatch::core::log::init_logging;

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

impl From<Commands> for fundwatch::AppCommand {
    fn from(cmd: Commands) -> fundwatch::AppCommand {
        match cmd {
            Commands::Fetch {
                codes,
                holdings,
                json,
            } => fundwatch::AppCommand::Fetch {
                codes,
                holdings,
                json,
            },
            Commands::Watch { codes, holdings } => fundwatch::AppCommand::Watch { codes, holdings },
            Commands::Search { query, json } => fundwatch::AppCommand::Search { query, json },
            Commands::Nav { code, date } => fundwatch::AppCommand::Nav { code, date },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show live estimates for funds (configured funds when none are given)
    Fetch {
        codes: Vec<String>,
        /// Also list each fund's top holdings
        #[arg(long)]
        holdings: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refresh estimates periodically until interrupted
    Watch {
        codes: Vec<String>,
        /// Also list each fund's top holdings
        #[arg(long)]
        holdings: bool,
    },
    /// Search funds by code, name or pinyin
    Search {
        query: String,
        /// Print the matches as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settled NAV on a date, or the first trading day after it
    Nav {
        code: String,
        /// Date as YYYY-MM-DD
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fundwatch::cli::setup::setup(),
        Some(cmd) => fundwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
