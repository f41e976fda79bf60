use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::forecast::{ForecastHour, ModelScore, ModelState};
use crate::models::measurement::Measurement;
use crate::utils::safety::SafetyLevel;
use crate::utils::trend::TrendReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub timestamp: String,
}

/// Latest primary-station reading plus its rideability label.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWindResponse {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub safety: SafetyLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub hours: i64,
    pub sample_count: usize,
    pub min_speed: Option<f64>,
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub max_gust: Option<f64>,
    pub trend: TrendReport,
}

/// One k-minute bucket of today, aligned on the local clock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientBucket {
    pub bucket_start_local: String,
    pub avg_speed: f64,
    pub max_gust: Option<f64>,
    pub avg_direction_deg: Option<f64>,
    pub sample_count: usize,
}

/// Measurements of one activity-zone local date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGroup {
    pub date: NaiveDate,
    pub measurements: Vec<Measurement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResponse {
    pub model_id: String,
    pub correction_factor: f64,
    pub hours: Vec<ForecastHour>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAccuracyResponse {
    #[serde(flatten)]
    pub score: ModelScore,
    pub state: ModelState,
    pub is_best: bool,
}

/// Actuals so far today plus the remaining forecast hours.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayFullResponse {
    pub date: NaiveDate,
    pub actual: Vec<GradientBucket>,
    pub forecast_model: String,
    pub forecast: Vec<ForecastHour>,
}

/// Per-local-hour archive averages, for the daily pattern view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourPattern {
    pub hour_local: u32,
    pub avg_speed: f64,
    pub avg_gust: Option<f64>,
    pub avg_direction_deg: Option<f64>,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStatisticsResponse {
    pub days: i64,
    pub aggregate_count: usize,
    pub min_speed: Option<f64>,
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub max_gust: Option<f64>,
    pub windiest_day: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatsResponse {
    pub web_subscriptions: usize,
    pub device_tokens: usize,
    pub notified_today: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResponse {
    pub offset: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationRequest {
    pub offset: f64,
}
