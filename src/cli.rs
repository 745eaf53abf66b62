use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::db::{DatabaseManager, EventQuery};
use crate::eventbrite::{EventbriteClient, SearchQuery};
use crate::ingest::{SyncOutcome, clear_old_events};
use crate::scheduler::{self, IngestWorker};

#[derive(Debug, Parser)]
#[command(name = "beluga-ingest", version, about = "Eventbrite ingestion worker")]
pub struct Cli {
    /// YAML configuration file. Defaults to CONFIG_PATH or ./config.yaml.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the scheduler until interrupted.
    Run,
    /// Run a single fetch cycle.
    Fetch(FetchArgs),
    /// Delete events that ended outside the retention window.
    Sweep,
    /// Mirror the upstream category list.
    SyncCategories {
        /// Refresh even when categories are already stored.
        #[arg(long)]
        force: bool,
    },
    /// Create tables and indexes, then exit.
    Migrate,
    /// Print stored events as JSON lines.
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,
    #[arg(long)]
    pub radius: Option<String>,
}

impl FetchArgs {
    fn query(&self, config: &Config) -> SearchQuery {
        let mut query = SearchQuery::from_config(&config.collection, &config.eventbrite);
        if let Some(lat) = self.lat {
            query.latitude = lat;
        }
        if let Some(lon) = self.lon {
            query.longitude = lon;
        }
        if let Some(radius) = &self.radius {
            query.radius = radius.clone();
        }
        query
    }
}

impl Command {
    pub async fn run(self, config: Arc<Config>, db_manager: Arc<DatabaseManager>) -> Result<()> {
        match self {
            Command::Migrate => {
                info!("migrations applied");
                Ok(())
            }
            Command::Sweep => {
                let deleted = clear_old_events(
                    db_manager.event_store().as_ref(),
                    config.retention.stale_event_days,
                    Utc::now().date_naive(),
                )
                .await?;
                println!("deleted {deleted} stale events");
                Ok(())
            }
            Command::List { category, limit } => list_events(&db_manager, category, limit).await,
            Command::Run => {
                let worker = worker(config, db_manager)?;
                let mut sched = scheduler::start(worker).await?;
                tokio::signal::ctrl_c()
                    .await
                    .context("waiting for shutdown signal")?;
                info!("shutdown requested");
                sched.shutdown().await.context("stopping scheduler")?;
                Ok(())
            }
            Command::Fetch(args) => {
                let query = args.query(&config);
                let summary = worker(config, db_manager)?.fetch_events(&query).await?;
                println!(
                    "fetched {}/{} pages: {} events seen, {} written, {} skipped",
                    summary.pages_fetched,
                    summary.pages_available,
                    summary.events_seen,
                    summary.events_written,
                    summary.events_skipped
                );
                Ok(())
            }
            Command::SyncCategories { force } => {
                match worker(config, db_manager)?.update_categories(force).await? {
                    SyncOutcome::Skipped { existing } => {
                        println!("{existing} categories already stored; use --force to refresh")
                    }
                    SyncOutcome::Synced { upserted } => println!("synchronized {upserted} categories"),
                }
                Ok(())
            }
        }
    }
}

fn worker(config: Arc<Config>, db_manager: Arc<DatabaseManager>) -> Result<IngestWorker> {
    let client = EventbriteClient::new(&config.eventbrite).context("building eventbrite client")?;
    Ok(IngestWorker::new(config, db_manager, Arc::new(client)))
}

async fn list_events(
    db_manager: &DatabaseManager,
    category: Option<String>,
    limit: i64,
) -> Result<()> {
    let mut query = EventQuery {
        starts_after: Some(Utc::now()),
        limit,
        ..EventQuery::default()
    };
    if let Some(name) = category {
        let found = db_manager
            .category_store()
            .find_category_by_name(&name)
            .await?
            .with_context(|| format!("no category named {name:?}"))?;
        query.category_id = Some(found.category_id);
    }

    for event in db_manager.event_store().list_events(&query).await? {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
