pub mod cli;
pub mod core;
pub mod providers;
pub mod tracker;

pub use crate::core::config;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};
use tracker::FundTracker;

pub enum AppCommand {
    Fetch {
        codes: Vec<String>,
        holdings: bool,
        json: bool,
    },
    Watch {
        codes: Vec<String>,
        holdings: bool,
    },
    Search {
        query: String,
        json: bool,
    },
    Nav {
        code: String,
        date: NaiveDate,
    },
}

/// Codes given on the command line, else the configured watch list.
fn resolve_codes(codes: Vec<String>, config: &config::AppConfig) -> Vec<String> {
    if codes.is_empty() {
        config.funds.clone()
    } else {
        codes
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Fund watch starting...");

    let config = config::AppConfig::load(config_path)?;
    debug!("Loaded config: {config:#?}");

    let tracker = FundTracker::new(&config).context("Failed to build HTTP client")?;

    match command {
        AppCommand::Fetch {
            codes,
            holdings,
            json,
        } => {
            let codes = resolve_codes(codes, &config);
            cli::fetch::run(&tracker, &codes, holdings, json).await
        }
        AppCommand::Watch { codes, holdings } => {
            let codes = resolve_codes(codes, &config);
            cli::watch::run(&tracker, &codes, holdings, config.refresh_interval()).await
        }
        AppCommand::Search { query, json } => cli::search::run(&tracker, &query, json).await,
        AppCommand::Nav { code, date } => cli::nav::run(&tracker, &code, date).await,
    }
}
