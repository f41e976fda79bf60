use actix_web::{get, post, web, HttpResponse, Result};
use chrono::{Duration, NaiveDate, Utc};
use tracing::{error, info};

use crate::models::api_responses::{ArchiveStatisticsResponse, ErrorResponse, SuccessResponse};
use crate::server::AppState;
use crate::utils::stats;
use crate::utils::units::round1;

fn internal_error(context: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: context.to_string(),
    })
}

async fn days_response(state: &AppState, days: i64) -> HttpResponse {
    let days = days.clamp(1, 365);
    let station = state.config.primary_station().id.clone();
    let since = Utc::now() - Duration::days(days);
    match state.storage.aggregates_since(&station, since).await {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => {
            error!("Failed to read archive days: {:#}", e);
            internal_error("Failed to read archive")
        }
    }
}

/// GET /api/archive/days - Aggregates, last 7 days
#[get("/archive/days")]
pub async fn get_days_default(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(days_response(&state, 7).await)
}

/// GET /api/archive/days/{days}
#[get("/archive/days/{days}")]
pub async fn get_days(state: web::Data<AppState>, days: web::Path<i64>) -> Result<HttpResponse> {
    Ok(days_response(&state, days.into_inner()).await)
}

/// GET /api/archive/day/{date} - Aggregates for one local date
#[get("/archive/day/{date}")]
pub async fn get_day(state: web::Data<AppState>, date: web::Path<String>) -> Result<HttpResponse> {
    let date = match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "date must be yyyy-mm-dd"
            })))
        }
    };
    let station = state.config.primary_station().id.clone();
    match state
        .storage
        .aggregates_for_local_date(&station, date, state.config.timezone)
        .await
    {
        Ok(rows) => Ok(HttpResponse::Ok().json(rows)),
        Err(e) => {
            error!("Failed to read archive day {}: {:#}", date, e);
            Ok(internal_error("Failed to read archive day"))
        }
    }
}

async fn statistics_response(state: &AppState, days: i64) -> HttpResponse {
    let days = days.clamp(1, 365);
    let station = state.config.primary_station().id.clone();
    let since = Utc::now() - Duration::days(days);
    let rows = match state.storage.aggregates_since(&station, since).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Failed to read archive statistics: {:#}", e);
            return internal_error("Failed to read archive statistics");
        }
    };

    let avg_speeds: Vec<f64> = rows.iter().map(|a| a.avg_speed).collect();
    let min_speeds: Vec<f64> = rows.iter().map(|a| a.min_speed).collect();
    let max_speeds: Vec<f64> = rows.iter().map(|a| a.max_speed).collect();
    let gusts: Vec<f64> = rows.iter().filter_map(|a| a.max_gust).collect();

    let tz = state.config.timezone;
    let windiest_day = rows
        .iter()
        .max_by(|a, b| {
            a.avg_speed
                .partial_cmp(&b.avg_speed)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|a| a.hour_ts.with_timezone(&tz).date_naive());

    HttpResponse::Ok().json(ArchiveStatisticsResponse {
        days,
        aggregate_count: rows.len(),
        min_speed: stats::min(&min_speeds).map(round1),
        avg_speed: stats::mean(&avg_speeds).map(round1),
        max_speed: stats::max(&max_speeds).map(round1),
        max_gust: stats::max(&gusts).map(round1),
        windiest_day,
    })
}

/// GET /api/archive/statistics - Rollup over the last 30 days
#[get("/archive/statistics")]
pub async fn get_statistics_default(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(statistics_response(&state, 30).await)
}

/// GET /api/archive/statistics/{days}
#[get("/archive/statistics/{days}")]
pub async fn get_statistics(
    state: web::Data<AppState>,
    days: web::Path<i64>,
) -> Result<HttpResponse> {
    Ok(statistics_response(&state, days.into_inner()).await)
}

async fn patterns_response(state: &AppState, days: i64) -> HttpResponse {
    let days = days.clamp(1, 365);
    let station = state.config.primary_station().id.clone();
    match state
        .storage
        .hourly_patterns(&station, state.config.timezone, days)
        .await
    {
        Ok(patterns) => HttpResponse::Ok().json(patterns),
        Err(e) => {
            error!("Failed to read hourly patterns: {:#}", e);
            internal_error("Failed to read hourly patterns")
        }
    }
}

/// GET /api/archive/patterns - Per-local-hour averages, last 30 days
#[get("/archive/patterns")]
pub async fn get_patterns_default(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(patterns_response(&state, 30).await)
}

/// GET /api/archive/patterns/{days}
#[get("/archive/patterns/{days}")]
pub async fn get_patterns(
    state: web::Data<AppState>,
    days: web::Path<i64>,
) -> Result<HttpResponse> {
    Ok(patterns_response(&state, days.into_inner()).await)
}

/// POST /api/archive/hourly - Force aggregation of the previous hour (admin)
#[post("/archive/hourly")]
pub async fn post_hourly(state: web::Data<AppState>) -> Result<HttpResponse> {
    info!("Manual hourly aggregation triggered");
    match state.aggregation.archive_previous_hour().await {
        Ok(written) => Ok(HttpResponse::Ok().json(SuccessResponse {
            success: true,
            message: Some(format!("{} station hours archived", written)),
        })),
        Err(e) => {
            error!("Manual aggregation failed: {:#}", e);
            Ok(internal_error("Aggregation failed"))
        }
    }
}
