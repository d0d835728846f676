pub mod cli;
pub mod core;
pub mod dashboard;
pub mod providers;

use crate::core::config::AppConfig;
use crate::dashboard::Dashboard;
use crate::providers::HttpAccountApi;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Summary,
    History { name: String, refresh: bool },
    NetWorth,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("findash starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let api = Arc::new(HttpAccountApi::new(&config.api)?);
    let dashboard = Dashboard::new(api, &config);

    match command {
        AppCommand::Summary => cli::summary::run(&dashboard, &config.currency).await,
        AppCommand::History { name, refresh } => {
            cli::history::run(&dashboard, &name, refresh, &config.currency).await
        }
        AppCommand::NetWorth => cli::networth::run(&dashboard, &config.currency).await,
    }
}
