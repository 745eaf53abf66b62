#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod config;
mod db;
mod eventbrite;
mod ingest;
mod scheduler;
mod utils;

use cli::{Cli, Command};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(Config::load(cli.config.as_deref())?);
    utils::logging::init_tracing(&config.logging);
    info!("beluga ingest worker starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;
    info!("database ready backend={:?}", db_manager.db_type());

    cli.command
        .unwrap_or(Command::Run)
        .run(config, db_manager)
        .await?;

    info!("beluga ingest worker shutting down");
    Ok(())
}
