use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One forecast reading as recorded at its polling instant. Several
/// snapshots for the same (model, date, hour) accumulate between prunes;
/// scoring picks the latest one taken before the observed hour.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSnapshot {
    pub id: i64,
    pub snapshot_ts: DateTime<Utc>,
    pub model_id: String,
    pub target_date: NaiveDate,
    pub target_hour_local: i32,
    pub speed_knots: f64,
    pub gust_knots: f64,
    pub direction_deg: f64,
}

/// Per-hour forecast error against the realised aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyRow {
    pub model_id: String,
    pub eval_date: NaiveDate,
    pub target_hour_local: i32,
    pub actual_speed: f64,
    pub actual_direction: f64,
    pub forecast_speed: f64,
    pub forecast_direction: f64,
    pub speed_error: f64,
    pub direction_error: f64,
}

/// Rollup accuracy scores, one row per model. `composite_score` is
/// lower-is-better; `correction_factor` is applied to forecast speeds at
/// read time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModelScore {
    pub model_id: String,
    pub rmse_speed: f64,
    pub mae_speed: f64,
    pub rmse_direction: f64,
    pub mae_direction: f64,
    pub correlation_speed: f64,
    pub correction_factor: f64,
    pub eval_count: i32,
    pub composite_score: f64,
    pub last_updated: DateTime<Utc>,
}

impl ModelScore {
    /// Cold-start state for a freshly configured model.
    pub fn unscored(model_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            model_id: model_id.to_string(),
            rmse_speed: 0.0,
            mae_speed: 0.0,
            rmse_direction: 0.0,
            mae_direction: 0.0,
            correlation_speed: 0.0,
            correction_factor: 1.0,
            eval_count: 0,
            composite_score: 1.0,
            last_updated: now,
        }
    }

    pub fn state(&self, min_evals: i32) -> ModelState {
        if self.eval_count == 0 {
            ModelState::Unscored
        } else if self.eval_count < min_evals {
            ModelState::Warming
        } else {
            ModelState::Scored
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unscored,
    Warming,
    Scored,
}

/// One served forecast hour, correction factor already applied to the speed
/// fields when the response says so.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastHour {
    pub target_date: NaiveDate,
    pub hour_local: i32,
    pub speed_knots: f64,
    pub gust_knots: f64,
    pub direction_deg: f64,
    pub snapshot_ts: DateTime<Utc>,
}
