use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod models;
mod routes;
mod server;
mod services;
mod utils;

use crate::server::AppState;
use crate::services::aggregation::AggregationService;
use crate::services::apns::{ApnsClient, ApnsCredentials, TokenStore};
use crate::services::calibration::Calibration;
use crate::services::forecast::ForecastService;
use crate::services::ingestion::IngestionService;
use crate::services::notifications::NotificationEngine;
use crate::services::scheduler::Scheduler;
use crate::services::scoring::ScoringService;
use crate::services::storage::{migrate, Storage};
use crate::services::stream::StreamHub;
use crate::services::webpush::{SubscriptionStore, WebPushChannel};
use crate::utils::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env().expect("invalid configuration"));

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to DB");

    // Schema trouble is fatal: better to die at startup than to limp
    migrate(&pool).await.expect("Failed to run migrations");

    let calibration = Arc::new(Calibration::load(config.data_dir.join("calibration.json")));
    let storage = Arc::new(Storage::new(pool, calibration.clone()));

    let ingestion = Arc::new(
        IngestionService::new(&config, storage.clone()).expect("failed to build ingestion service"),
    );
    let aggregation = Arc::new(AggregationService::new(&config, storage.clone()));
    let forecast = Arc::new(
        ForecastService::new(&config, storage.clone()).expect("failed to build forecast service"),
    );
    let scoring = Arc::new(ScoringService::new(&config, storage.clone()));

    storage
        .ensure_model_scores(&forecast.model_ids())
        .await
        .expect("failed to seed model scores");

    let webpush = WebPushChannel::new(config.vapid_private_key.clone(), config.vapid_subject.clone());
    let subscriptions = SubscriptionStore::load(config.data_dir.join("subscriptions.json"));
    let apns = ApnsCredentials::load(&config.data_dir.join("apns.json"))
        .and_then(|creds| match ApnsClient::new(creds) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("APNs channel unavailable: {:#}", e);
                None
            }
        });
    let tokens = TokenStore::load(config.data_dir.join("device_tokens.json"));

    let hub = Arc::new(StreamHub::new());
    let notifications = Arc::new(NotificationEngine::new(
        &config,
        storage.clone(),
        webpush,
        subscriptions,
        apns,
        tokens,
    ));

    let scheduler = Scheduler::new(
        config.clone(),
        storage.clone(),
        ingestion.clone(),
        aggregation.clone(),
        forecast.clone(),
        scoring.clone(),
        hub.clone(),
        notifications.clone(),
    );
    let _scheduler_handle = scheduler.start().await.expect("failed to start scheduler");

    info!(
        "Starting server on http://{}:{}",
        config.http_host, config.http_port
    );

    server::run(AppState {
        config,
        storage,
        calibration,
        ingestion,
        aggregation,
        forecast,
        scoring,
        hub,
        notifications,
    })
    .await
}
