use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::db::DatabaseManager;
use crate::eventbrite::{EventSource, SearchQuery};
use crate::ingest::{
    self, FetchSettings, FetchSummary, SyncOutcome, clear_old_events, fetch_events,
    sync_categories,
};

#[derive(Clone)]
pub struct IngestWorker {
    config: Arc<Config>,
    db_manager: Arc<DatabaseManager>,
    source: Arc<dyn EventSource>,
}

impl IngestWorker {
    pub fn new(
        config: Arc<Config>,
        db_manager: Arc<DatabaseManager>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            config,
            db_manager,
            source,
        }
    }

    pub async fn fetch_events(&self, query: &SearchQuery) -> Result<FetchSummary, ingest::IngestError> {
        fetch_events(
            self.source.as_ref(),
            &self.db_manager,
            query,
            FetchSettings::from_config(&self.config),
        )
        .await
    }

    pub async fn fetch_default_area(&self) -> Result<FetchSummary, ingest::IngestError> {
        let query = SearchQuery::from_config(&self.config.collection, &self.config.eventbrite);
        self.fetch_events(&query).await
    }

    pub async fn clear_old_events(&self) -> Result<usize, ingest::IngestError> {
        clear_old_events(
            self.db_manager.event_store().as_ref(),
            self.config.retention.stale_event_days,
            Utc::now().date_naive(),
        )
        .await
    }

    pub async fn update_categories(&self, force: bool) -> Result<SyncOutcome, ingest::IngestError> {
        sync_categories(
            self.source.as_ref(),
            self.db_manager.category_store().as_ref(),
            force,
        )
        .await
    }

    async fn run_fetch(&self) {
        if let Err(e) = self.fetch_default_area().await {
            error!("fetch cycle failed: {}", e);
        }
    }

    async fn run_sweep(&self) {
        if let Err(e) = self.clear_old_events().await {
            error!("retention sweep failed: {}", e);
        }
    }

    async fn run_category_refresh(&self) {
        if let Err(e) = self.update_categories(true).await {
            error!("category refresh failed: {}", e);
        }
    }
}

/// Cron jobs are built first so a bad expression fails before any work runs.
/// The first fetch cycle completes before the interval job is registered.
pub async fn start(worker: IngestWorker) -> Result<JobScheduler> {
    let schedule = worker.config.schedule.clone();
    let interval = Duration::from_secs(worker.config.collection.interval_secs);
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let sweep_worker = worker.clone();
    let sweep_job = Job::new_async(schedule.sweep_cron.as_str(), move |_uuid, _l| {
        let worker = sweep_worker.clone();
        Box::pin(async move { worker.run_sweep().await })
    })
    .with_context(|| format!("creating sweep job for cron {}", schedule.sweep_cron))?;

    let category_worker = worker.clone();
    let category_job = Job::new_async(schedule.categories_cron.as_str(), move |_uuid, _l| {
        let worker = category_worker.clone();
        Box::pin(async move { worker.run_category_refresh().await })
    })
    .with_context(|| format!("creating category job for cron {}", schedule.categories_cron))?;

    worker.run_fetch().await;

    let fetch_worker = worker.clone();
    let fetch_job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let worker = fetch_worker.clone();
        Box::pin(async move { worker.run_fetch().await })
    })
    .context("creating fetch job")?;

    sched.add(sweep_job).await.context("adding sweep job")?;
    sched.add(category_job).await.context("adding category job")?;
    sched.add(fetch_job).await.context("adding fetch job")?;

    sched.start().await.context("starting scheduler")?;
    info!(
        "scheduler started fetch_every={}s sweep_cron={:?} categories_cron={:?}",
        interval.as_secs(),
        schedule.sweep_cron,
        schedule.categories_cron
    );
    Ok(sched)
}
