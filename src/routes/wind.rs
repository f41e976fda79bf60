use actix_web::{get, post, web, HttpResponse, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{error, info};

use crate::models::api_responses::{
    CurrentWindResponse, ErrorResponse, StatisticsResponse, SuccessResponse, TodayFullResponse,
};
use crate::server::AppState;
use crate::services::ingestion::{run_cycle_pipeline, wind_update_event};
use crate::utils::safety;
use crate::utils::stats;
use crate::utils::trend::compute_trend;
use crate::utils::units::round1;

fn internal_error(context: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: context.to_string(),
    })
}

/// GET /api/wind/current - Latest primary-station measurement
#[get("/wind/current")]
pub async fn get_current(state: web::Data<AppState>) -> Result<HttpResponse> {
    let station = state.config.primary_station().id.clone();
    match state.storage.latest_measurement(&station).await {
        Ok(Some(measurement)) => {
            let safety = safety::classify(
                measurement.wind_direction_deg as f64,
                measurement.wind_speed_knots,
            );
            Ok(HttpResponse::Ok().json(CurrentWindResponse {
                measurement,
                safety,
            }))
        }
        Ok(None) => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "No measurements recorded yet"
        }))),
        Err(e) => {
            error!("Failed to read current wind: {:#}", e);
            Ok(internal_error("Failed to read current wind"))
        }
    }
}

/// GET /api/wind/stream - Live event stream
///
/// An indefinite text/event-stream response: `wind_update` data frames on
/// every ingestion cycle, comment heartbeats in between. Fatal failures
/// close the connection without an error body; clients reconnect.
#[get("/wind/stream")]
pub async fn get_stream(state: web::Data<AppState>) -> Result<HttpResponse> {
    let station = state.config.primary_station().id.clone();
    let initial = wind_update_event(&state.storage, &station)
        .await
        .unwrap_or(None);

    let rx = state.hub.subscribe(initial.as_ref());

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(rx))
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    #[serde(default = "default_week_days")]
    days: i64,
}

fn default_week_days() -> i64 {
    7
}

/// GET /api/wind/history/week - Per-day groups, activity window only
#[get("/wind/history/week")]
pub async fn get_history_week(
    state: web::Data<AppState>,
    query: web::Query<WeekQuery>,
) -> Result<HttpResponse> {
    let days = query.days.clamp(1, 31);
    let station = state.config.primary_station().id.clone();
    match state
        .storage
        .week_history(
            &station,
            state.config.timezone,
            days,
            state.config.activity_start_hour,
            state.config.activity_end_hour,
        )
        .await
    {
        Ok(groups) => Ok(HttpResponse::Ok().json(groups)),
        Err(e) => {
            error!("Failed to read week history: {:#}", e);
            Ok(internal_error("Failed to read week history"))
        }
    }
}

async fn history_response(state: &AppState, hours: i64) -> HttpResponse {
    let hours = hours.clamp(1, 24 * 30);
    let station = state.config.primary_station().id.clone();
    let since = Utc::now() - Duration::hours(hours);
    match state.storage.measurements_since(&station, since).await {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => {
            error!("Failed to read history: {:#}", e);
            internal_error("Failed to read history")
        }
    }
}

/// GET /api/wind/history - Raw rows, last 24 hours
#[get("/wind/history")]
pub async fn get_history_default(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(history_response(&state, 24).await)
}

/// GET /api/wind/history/{hours} - Raw rows, last N hours
#[get("/wind/history/{hours}")]
pub async fn get_history(
    state: web::Data<AppState>,
    hours: web::Path<i64>,
) -> Result<HttpResponse> {
    Ok(history_response(&state, hours.into_inner()).await)
}

#[derive(Debug, Deserialize)]
pub struct GradientQuery {
    #[serde(default = "default_gradient_start")]
    start: u32,
    #[serde(default = "default_gradient_end")]
    end: u32,
    /// Omitted means hourly buckets.
    interval: Option<u32>,
}

fn default_gradient_start() -> u32 {
    6
}

fn default_gradient_end() -> u32 {
    20
}

/// GET /api/wind/today/gradient - k-minute buckets of today
#[get("/wind/today/gradient")]
pub async fn get_today_gradient(
    state: web::Data<AppState>,
    query: web::Query<GradientQuery>,
) -> Result<HttpResponse> {
    if query.start > 23 || query.end > 23 || query.start > query.end {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "start and end must be hours with start <= end"
        })));
    }
    let interval = query.interval.unwrap_or(60);
    let station = state.config.primary_station().id.clone();
    match state
        .storage
        .today_gradient(&station, state.config.timezone, query.start, query.end, interval)
        .await
    {
        Ok(buckets) => Ok(HttpResponse::Ok().json(buckets)),
        Err(e) => {
            error!("Failed to bucket today: {:#}", e);
            Ok(internal_error("Failed to bucket today"))
        }
    }
}

async fn statistics_response(state: &AppState, hours: i64) -> HttpResponse {
    let hours = hours.clamp(1, 24 * 30);
    let station = state.config.primary_station().id.clone();
    let since = Utc::now() - Duration::hours(hours);
    let rows = match state.storage.measurements_since(&station, since).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Failed to read statistics range: {:#}", e);
            return internal_error("Failed to read statistics");
        }
    };

    let speeds: Vec<f64> = rows.iter().map(|m| m.wind_speed_knots).collect();
    let dirs: Vec<f64> = rows.iter().map(|m| m.wind_direction_deg as f64).collect();
    let gusts: Vec<f64> = rows.iter().filter_map(|m| m.wind_gust_knots).collect();

    HttpResponse::Ok().json(StatisticsResponse {
        hours,
        sample_count: rows.len(),
        min_speed: stats::min(&speeds).map(round1),
        avg_speed: stats::mean(&speeds).map(round1),
        max_speed: stats::max(&speeds).map(round1),
        max_gust: stats::max(&gusts).map(round1),
        trend: compute_trend(&speeds, &dirs),
    })
}

/// GET /api/wind/statistics - Min/avg/max/trend over the last 24 hours
#[get("/wind/statistics")]
pub async fn get_statistics_default(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(statistics_response(&state, 24).await)
}

/// GET /api/wind/statistics/{hours}
#[get("/wind/statistics/{hours}")]
pub async fn get_statistics(
    state: web::Data<AppState>,
    hours: web::Path<i64>,
) -> Result<HttpResponse> {
    Ok(statistics_response(&state, hours.into_inner()).await)
}

/// GET /api/wind/trend - Trend over the last hour of readings
#[get("/wind/trend")]
pub async fn get_trend(state: web::Data<AppState>) -> Result<HttpResponse> {
    let station = state.config.primary_station().id.clone();
    match state.storage.recent_measurements(&station, 12).await {
        Ok(rows) => {
            let speeds: Vec<f64> = rows.iter().map(|m| m.wind_speed_knots).collect();
            let dirs: Vec<f64> = rows.iter().map(|m| m.wind_direction_deg as f64).collect();
            Ok(HttpResponse::Ok().json(compute_trend(&speeds, &dirs)))
        }
        Err(e) => {
            error!("Failed to read trend window: {:#}", e);
            Ok(internal_error("Failed to compute trend"))
        }
    }
}

/// GET /api/wind/today/full - Actuals so far plus the remaining forecast
#[get("/wind/today/full")]
pub async fn get_today_full(state: web::Data<AppState>) -> Result<HttpResponse> {
    let station = state.config.primary_station().id.clone();
    let today = Utc::now()
        .with_timezone(&state.config.timezone)
        .date_naive();

    let actual = match state
        .storage
        .today_gradient(&station, state.config.timezone, 0, 23, 60)
        .await
    {
        Ok(buckets) => buckets,
        Err(e) => {
            error!("Failed to read today's actuals: {:#}", e);
            return Ok(internal_error("Failed to read today's actuals"));
        }
    };

    match state.forecast.serve_forecast(None).await {
        Ok(forecast) => Ok(HttpResponse::Ok().json(TodayFullResponse {
            date: today,
            actual,
            forecast_model: forecast.model_id,
            forecast: forecast
                .hours
                .into_iter()
                .filter(|h| h.target_date == today)
                .collect(),
        })),
        Err(e) => {
            error!("Failed to read today's forecast: {:#}", e);
            Ok(internal_error("Failed to read today's forecast"))
        }
    }
}

/// POST /api/wind/collect - Force an ingestion cycle (admin)
#[post("/wind/collect")]
pub async fn post_collect(state: web::Data<AppState>) -> Result<HttpResponse> {
    info!("Manual ingestion cycle triggered");
    match run_cycle_pipeline(
        &state.ingestion,
        &state.storage,
        &state.hub,
        &state.notifications,
    )
    .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(SuccessResponse {
            success: true,
            message: Some(format!(
                "{} stations stored, {} failed",
                outcome.stored, outcome.failed
            )),
        })),
        Err(e) => {
            error!("Manual ingestion cycle failed: {:#}", e);
            Ok(internal_error("All stations failed"))
        }
    }
}
