use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Timelike, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::api_responses::ForecastResponse;
use crate::models::{ForecastHour, ForecastSnapshot};
use crate::services::storage::Storage;
use crate::utils::config::{Config, ModelConfig};
use crate::utils::units;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const FORECAST_DAYS: u32 = 3;
pub const BEST_MODEL_MIN_EVALS: i32 = 10;

/// Parallel hourly arrays as served by the forecast family. All models
/// share this shape and differ only in base URL.
#[derive(Debug, Deserialize)]
struct ForecastPayload {
    hourly: ForecastHourly,
}

#[derive(Debug, Deserialize)]
struct ForecastHourly {
    time: Vec<String>,
    #[serde(default)]
    wind_speed_10m: Vec<f64>,
    #[serde(default)]
    wind_direction_10m: Vec<f64>,
    #[serde(default)]
    wind_gusts_10m: Vec<f64>,
}

/// Polls every configured model every three in-window hours and appends one
/// snapshot row per forecast hour. Serving applies the per-model correction
/// factor learned by the scorer.
pub struct ForecastService {
    http: reqwest::Client,
    models: Vec<ModelConfig>,
    default_model: String,
    latitude: f64,
    longitude: f64,
    timezone: chrono_tz::Tz,
    storage: Arc<Storage>,
}

impl ForecastService {
    pub fn new(config: &Config, storage: Arc<Storage>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build forecast http client")?;
        Ok(Self {
            http,
            models: config.models.clone(),
            default_model: config.default_model.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
            timezone: config.timezone,
            storage,
        })
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.iter().map(|m| m.id.clone()).collect()
    }

    async fn fetch_model(&self, model: &ModelConfig) -> Result<usize> {
        let url = format!("{}/forecast", model.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                (
                    "hourly",
                    "wind_speed_10m,wind_direction_10m,wind_gusts_10m".to_string(),
                ),
                ("timezone", self.timezone.name().to_string()),
                ("forecast_days", FORECAST_DAYS.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("model {} request failed", model.id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("model {} returned HTTP {}", model.id, status));
        }

        let payload: ForecastPayload = response
            .json()
            .await
            .with_context(|| format!("model {} payload decode failed", model.id))?;

        let snapshot_ts = Utc::now();
        let mut written = 0usize;

        for (idx, raw_time) in payload.hourly.time.iter().enumerate() {
            // Hour stamps arrive in the requested (activity-zone) clock
            let Ok(local) = NaiveDateTime::parse_from_str(raw_time.trim(), "%Y-%m-%dT%H:%M") else {
                continue;
            };
            let (Some(speed), Some(direction)) = (
                payload.hourly.wind_speed_10m.get(idx).copied(),
                payload.hourly.wind_direction_10m.get(idx).copied(),
            ) else {
                continue;
            };
            let gust = payload
                .hourly
                .wind_gusts_10m
                .get(idx)
                .copied()
                .unwrap_or(speed);

            self.storage
                .insert_snapshot(
                    snapshot_ts,
                    &model.id,
                    local.date(),
                    local.hour() as i32,
                    units::kmh_to_knots(speed),
                    units::kmh_to_knots(gust),
                    direction.rem_euclid(360.0),
                )
                .await?;
            written += 1;
        }

        Ok(written)
    }

    /// One snapshot cycle over all models; a failing model never aborts the
    /// others.
    pub async fn run_snapshot_cycle(&self) -> Result<usize> {
        let fetches = self.models.iter().map(|m| self.fetch_model(m));
        let results = join_all(fetches).await;

        let mut total = 0usize;
        let mut failed = 0usize;
        for (model, result) in self.models.iter().zip(results) {
            match result {
                Ok(written) => {
                    total += written;
                    info!("Model {}: {} snapshot rows", model.id, written);
                }
                Err(e) => {
                    failed += 1;
                    warn!("Model {} snapshot failed: {:#}", model.id, e);
                }
            }
        }

        if total == 0 && failed > 0 {
            return Err(anyhow!("all {} forecast models failed", failed));
        }
        Ok(total)
    }

    pub async fn best_model_id(&self) -> Result<String> {
        let scores = self.storage.model_scores().await?;
        Ok(crate::services::scoring::select_best_model(
            &scores,
            BEST_MODEL_MIN_EVALS,
            &self.default_model,
        ))
    }

    fn is_known_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m.id == model_id)
    }

    /// Upcoming hours for one model with the correction factor applied to
    /// the speed fields. Directions are model output and stay untouched.
    pub async fn serve_forecast(&self, model_id: Option<&str>) -> Result<ForecastResponse> {
        let model_id = match model_id {
            Some(id) => {
                if !self.is_known_model(id) {
                    return Err(anyhow!("unknown forecast model {}", id));
                }
                id.to_string()
            }
            None => self.best_model_id().await?,
        };

        let correction = self
            .storage
            .model_score(&model_id)
            .await?
            .map(|s| s.correction_factor)
            .unwrap_or(1.0);

        let now_local = Utc::now().with_timezone(&self.timezone);
        let snapshots = self
            .storage
            .upcoming_snapshots(&model_id, now_local.date_naive(), now_local.hour() as i32)
            .await?;

        Ok(ForecastResponse {
            model_id,
            correction_factor: correction,
            hours: snapshots
                .into_iter()
                .map(|s| corrected_hour(s, correction))
                .collect(),
        })
    }

    /// Every configured model side by side, corrections applied.
    pub async fn compare_forecasts(&self) -> Result<Vec<ForecastResponse>> {
        let mut out = Vec::with_capacity(self.models.len());
        for model in &self.models {
            out.push(self.serve_forecast(Some(&model.id)).await?);
        }
        Ok(out)
    }
}

fn corrected_hour(s: ForecastSnapshot, correction: f64) -> ForecastHour {
    ForecastHour {
        target_date: s.target_date,
        hour_local: s.target_hour_local,
        speed_knots: units::round1(s.speed_knots * correction),
        gust_knots: units::round1(s.gust_knots * correction),
        direction_deg: s.direction_deg,
        snapshot_ts: s.snapshot_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_corrected_hour_scales_speeds_only() {
        let snapshot = ForecastSnapshot {
            id: 1,
            snapshot_ts: Utc::now(),
            model_id: "gfs".to_string(),
            target_date: NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(),
            target_hour_local: 10,
            speed_knots: 14.0,
            gust_knots: 20.0,
            direction_deg: 95.0,
        };
        let hour = corrected_hour(snapshot, 1.14);
        assert!((hour.speed_knots - 16.0).abs() < 0.1);
        assert!((hour.gust_knots - 22.8).abs() < 0.1);
        assert_eq!(hour.direction_deg, 95.0);
    }

    #[test]
    fn test_hourly_payload_parses() {
        let raw = r#"{
            "hourly": {
                "time": ["2026-07-02T09:00", "2026-07-02T10:00"],
                "wind_speed_10m": [18.5, 22.0],
                "wind_direction_10m": [80.0, 95.0],
                "wind_gusts_10m": [30.0, 33.5]
            }
        }"#;
        let payload: ForecastPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.hourly.time.len(), 2);
        assert_eq!(payload.hourly.wind_speed_10m[1], 22.0);

        let local =
            NaiveDateTime::parse_from_str(&payload.hourly.time[1], "%Y-%m-%dT%H:%M").unwrap();
        assert_eq!(local.hour(), 10);
        assert_eq!(local.date(), NaiveDate::from_ymd_opt(2026, 7, 2).unwrap());
    }
}
