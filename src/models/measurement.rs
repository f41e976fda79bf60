use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw reading as stored, speeds already normalised to knots.
/// `ts` is the upstream's reported observation time, not the insert time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub station_id: String,
    pub wind_speed_knots: f64,
    pub wind_gust_knots: Option<f64>,
    pub max_gust_knots: Option<f64>,
    #[serde(rename = "windDir")]
    pub wind_direction_deg: i32,
    #[serde(rename = "windDirAvg")]
    pub wind_direction_avg_deg: Option<i32>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

/// A reading produced by a station driver, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub ts: DateTime<Utc>,
    pub station_id: String,
    pub wind_speed_knots: f64,
    pub wind_gust_knots: Option<f64>,
    pub max_gust_knots: Option<f64>,
    pub wind_direction_deg: i32,
    pub wind_direction_avg_deg: Option<i32>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

/// One archived hour for one station. Direction fields are circular means.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HourlyAggregate {
    pub hour_ts: DateTime<Utc>,
    pub station_id: String,
    pub avg_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub avg_gust: Option<f64>,
    pub max_gust: Option<f64>,
    pub avg_direction_deg: f64,
    pub dominant_direction_deg: f64,
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_pressure: Option<f64>,
    pub measurement_count: i32,
}
