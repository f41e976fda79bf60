use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::services::aggregation::AggregationService;
use crate::services::forecast::ForecastService;
use crate::services::ingestion::{run_cycle_pipeline, IngestionService};
use crate::services::notifications::NotificationEngine;
use crate::services::scoring::ScoringService;
use crate::services::storage::Storage;
use crate::services::stream::{StreamHub, HEARTBEAT_INTERVAL};
use crate::utils::config::Config;

/// Owns every periodic trigger. Each job runs in its own task, the
/// in-window jobs are gated on the activity window, and no job overlaps
/// itself (a tick is skipped while the previous one still runs). Jobs may
/// overlap each other freely.
pub struct Scheduler {
    config: Arc<Config>,
    storage: Arc<Storage>,
    ingestion: Arc<IngestionService>,
    aggregation: Arc<AggregationService>,
    forecast: Arc<ForecastService>,
    scoring: Arc<ScoringService>,
    hub: Arc<StreamHub>,
    notifications: Arc<NotificationEngine>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        storage: Arc<Storage>,
        ingestion: Arc<IngestionService>,
        aggregation: Arc<AggregationService>,
        forecast: Arc<ForecastService>,
        scoring: Arc<ScoringService>,
        hub: Arc<StreamHub>,
        notifications: Arc<NotificationEngine>,
    ) -> Self {
        Self {
            config,
            storage,
            ingestion,
            aggregation,
            forecast,
            scoring,
            hub,
            notifications,
        }
    }

    /// Wire and start every job. The returned handle keeps the scheduler
    /// alive; dropping it stops all triggers.
    pub async fn start(&self) -> Result<JobScheduler> {
        let sched = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("scheduler init failed: {}", e))?;

        // Ingestion: every 5 minutes inside the activity window
        {
            let config = self.config.clone();
            let storage = self.storage.clone();
            let ingestion = self.ingestion.clone();
            let hub = self.hub.clone();
            let notifications = self.notifications.clone();
            let running = Arc::new(AtomicBool::new(false));

            let job = Job::new_async(self.config.ingest_cron.as_str(), move |_uuid, _lock| {
                let config = config.clone();
                let storage = storage.clone();
                let ingestion = ingestion.clone();
                let hub = hub.clone();
                let notifications = notifications.clone();
                let running = running.clone();
                Box::pin(async move {
                    if !config.in_activity_window(Utc::now()) {
                        return;
                    }
                    if running.swap(true, Ordering::SeqCst) {
                        warn!("Skipping ingestion tick: previous cycle still running");
                        return;
                    }
                    if let Err(e) =
                        run_cycle_pipeline(&ingestion, &storage, &hub, &notifications).await
                    {
                        warn!("Ingestion cycle failed: {:#}", e);
                    }
                    running.store(false, Ordering::SeqCst);
                })
            })
            .map_err(|e| anyhow!("bad ingest cron: {}", e))?;
            sched.add(job).await.map_err(|e| anyhow!("{}", e))?;
        }

        // Aggregation: hourly on the hour, window-independent
        {
            let aggregation = self.aggregation.clone();
            let running = Arc::new(AtomicBool::new(false));

            let job = Job::new_async(self.config.aggregate_cron.as_str(), move |_uuid, _lock| {
                let aggregation = aggregation.clone();
                let running = running.clone();
                Box::pin(async move {
                    if running.swap(true, Ordering::SeqCst) {
                        warn!("Skipping aggregation tick: previous run still running");
                        return;
                    }
                    if let Err(e) = aggregation.archive_previous_hour().await {
                        warn!("Hourly aggregation failed: {:#}", e);
                    }
                    running.store(false, Ordering::SeqCst);
                })
            })
            .map_err(|e| anyhow!("bad aggregate cron: {}", e))?;
            sched.add(job).await.map_err(|e| anyhow!("{}", e))?;
        }

        // Forecast snapshots: every three hours inside the activity window
        {
            let config = self.config.clone();
            let forecast = self.forecast.clone();
            let running = Arc::new(AtomicBool::new(false));

            let job = Job::new_async(self.config.forecast_cron.as_str(), move |_uuid, _lock| {
                let config = config.clone();
                let forecast = forecast.clone();
                let running = running.clone();
                Box::pin(async move {
                    if !config.in_activity_window(Utc::now()) {
                        return;
                    }
                    if running.swap(true, Ordering::SeqCst) {
                        warn!("Skipping forecast tick: previous cycle still running");
                        return;
                    }
                    match forecast.run_snapshot_cycle().await {
                        Ok(rows) => info!("Forecast snapshot cycle stored {} rows", rows),
                        Err(e) => warn!("Forecast snapshot cycle failed: {:#}", e),
                    }
                    running.store(false, Ordering::SeqCst);
                })
            })
            .map_err(|e| anyhow!("bad forecast cron: {}", e))?;
            sched.add(job).await.map_err(|e| anyhow!("{}", e))?;
        }

        // Scoring: daily, deliberately after the window closes
        {
            let scoring = self.scoring.clone();
            let running = Arc::new(AtomicBool::new(false));

            let job = Job::new_async(self.config.scoring_cron.as_str(), move |_uuid, _lock| {
                let scoring = scoring.clone();
                let running = running.clone();
                Box::pin(async move {
                    if running.swap(true, Ordering::SeqCst) {
                        warn!("Skipping scoring run: previous run still running");
                        return;
                    }
                    scoring.run_logged().await;
                    running.store(false, Ordering::SeqCst);
                })
            })
            .map_err(|e| anyhow!("bad scoring cron: {}", e))?;
            sched.add(job).await.map_err(|e| anyhow!("{}", e))?;
        }

        // Retention cleanup: daily, pre-dawn
        {
            let aggregation = self.aggregation.clone();
            let running = Arc::new(AtomicBool::new(false));

            let job = Job::new_async(self.config.cleanup_cron.as_str(), move |_uuid, _lock| {
                let aggregation = aggregation.clone();
                let running = running.clone();
                Box::pin(async move {
                    if running.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    aggregation.cleanup_logged().await;
                    running.store(false, Ordering::SeqCst);
                })
            })
            .map_err(|e| anyhow!("bad cleanup cron: {}", e))?;
            sched.add(job).await.map_err(|e| anyhow!("{}", e))?;
        }

        // Stream heartbeat: plain interval, not a cron job
        {
            let hub = self.hub.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                ticker.tick().await; // first tick fires immediately
                loop {
                    ticker.tick().await;
                    hub.heartbeat();
                }
            });
        }

        sched
            .start()
            .await
            .map_err(|e| anyhow!("scheduler start failed: {}", e))?;
        info!(
            "Scheduler started: ingest '{}', aggregate '{}', forecast '{}', scoring '{}', cleanup '{}'",
            self.config.ingest_cron,
            self.config.aggregate_cron,
            self.config.forecast_cron,
            self.config.scoring_cron,
            self.config.cleanup_cron
        );
        Ok(sched)
    }
}
