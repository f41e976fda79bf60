use anyhow::Result;
use chrono::{Duration, Timelike, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{AccuracyRow, ModelScore};
use crate::services::storage::Storage;
use crate::utils::circular;
use crate::utils::config::Config;
use crate::utils::stats;

const EVALUATION_DAYS: i64 = 14;

#[derive(Debug, Default)]
pub struct ScoringSummary {
    pub accuracy_rows: usize,
    pub models_scored: usize,
}

/// Error statistics for one model before cross-model normalisation.
#[derive(Debug, Clone)]
pub struct ModelRollup {
    pub rmse_speed: f64,
    pub mae_speed: f64,
    pub rmse_direction: f64,
    pub mae_direction: f64,
    pub correlation_speed: f64,
    pub correction_factor: f64,
    pub eval_count: i32,
}

/// Collapse a model's accuracy rows into its rollup statistics. `None`
/// while the model has no evaluated hours.
pub fn compute_rollup(rows: &[AccuracyRow]) -> Option<ModelRollup> {
    if rows.is_empty() {
        return None;
    }

    let speed_errors: Vec<f64> = rows.iter().map(|r| r.speed_error).collect();
    let direction_errors: Vec<f64> = rows.iter().map(|r| r.direction_error).collect();
    let actual: Vec<f64> = rows.iter().map(|r| r.actual_speed).collect();
    let forecast: Vec<f64> = rows.iter().map(|r| r.forecast_speed).collect();

    // Bias correction from the qualifying actual/forecast ratios only;
    // wildly-off hours (ratio outside [0.5, 2]) don't drag the factor.
    let ratios: Vec<f64> = rows
        .iter()
        .filter(|r| r.forecast_speed > 0.0)
        .map(|r| r.actual_speed / r.forecast_speed)
        .filter(|ratio| (0.5..=2.0).contains(ratio))
        .collect();
    let correction_factor = stats::mean(&ratios).unwrap_or(1.0);

    Some(ModelRollup {
        rmse_speed: stats::rmse(&speed_errors)?,
        mae_speed: stats::mae(&speed_errors)?,
        rmse_direction: stats::rmse(&direction_errors)?,
        mae_direction: stats::mae(&direction_errors)?,
        correlation_speed: stats::pearson(&actual, &forecast).unwrap_or(0.0),
        correction_factor,
        eval_count: rows.len() as i32,
    })
}

/// Lower-is-better composite rank: error magnitudes normalised against the
/// worst model in this run, blended with correlation.
pub fn composite_score(rollup: &ModelRollup, max_rmse_speed: f64, max_mae_speed: f64) -> f64 {
    let norm = |x: f64, max: f64| x / max.max(1.0);
    let score = 0.5 * norm(rollup.rmse_speed, max_rmse_speed)
        + 0.3 * norm(rollup.mae_speed, max_mae_speed)
        + 0.2 * (1.0 - rollup.correlation_speed);
    score.clamp(0.0, 1.0)
}

/// The lowest-composite model among those with enough evaluations, or the
/// configured default while everything is still unscored or warming up.
pub fn select_best_model(scores: &[ModelScore], min_evals: i32, default: &str) -> String {
    scores
        .iter()
        .filter(|s| s.eval_count >= min_evals)
        .min_by(|a, b| {
            a.composite_score
                .partial_cmp(&b.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|s| s.model_id.clone())
        .unwrap_or_else(|| default.to_string())
}

/// Daily scorer: joins archived aggregates against the snapshots that
/// predate them, then recomputes every model's rollup row in one shot.
pub struct ScoringService {
    storage: Arc<Storage>,
    model_ids: Vec<String>,
    primary_station: String,
    timezone: chrono_tz::Tz,
    window_start: u32,
    window_end: u32,
}

impl ScoringService {
    pub fn new(config: &Config, storage: Arc<Storage>) -> Self {
        Self {
            storage,
            model_ids: config.models.iter().map(|m| m.id.clone()).collect(),
            primary_station: config.primary_station().id.clone(),
            timezone: config.timezone,
            window_start: config.activity_start_hour,
            window_end: config.activity_end_hour,
        }
    }

    pub async fn run(&self) -> Result<ScoringSummary> {
        let mut summary = ScoringSummary::default();
        summary.accuracy_rows = self.evaluate_models().await?;
        summary.models_scored = self.recompute_scores().await?;
        info!(
            "Scoring pass complete: {} accuracy rows, {} models scored",
            summary.accuracy_rows, summary.models_scored
        );
        Ok(summary)
    }

    /// Upsert per-hour accuracy rows for every model over the evaluation
    /// horizon. Hours with no pre-observation snapshot are skipped.
    async fn evaluate_models(&self) -> Result<usize> {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let mut written = 0usize;

        for model_id in &self.model_ids {
            for offset in 0..EVALUATION_DAYS {
                let date = today - Duration::days(offset);
                let aggregates = self
                    .storage
                    .aggregates_for_local_date(&self.primary_station, date, self.timezone)
                    .await?;

                for aggregate in aggregates {
                    let hour_local = aggregate.hour_ts.with_timezone(&self.timezone).hour();
                    if hour_local < self.window_start || hour_local > self.window_end {
                        continue;
                    }

                    let snapshots = self
                        .storage
                        .snapshots_for_hour(model_id, date, hour_local as i32)
                        .await?;
                    // Newest poll first; take the latest one made before
                    // the hour actually happened.
                    let Some(snapshot) = snapshots
                        .into_iter()
                        .find(|s| s.snapshot_ts < aggregate.hour_ts)
                    else {
                        continue;
                    };

                    let speed_error = (snapshot.speed_knots - aggregate.avg_speed).abs();
                    let direction_error =
                        circular::shortest_arc(snapshot.direction_deg, aggregate.avg_direction_deg);

                    self.storage
                        .upsert_accuracy(&AccuracyRow {
                            model_id: model_id.clone(),
                            eval_date: date,
                            target_hour_local: hour_local as i32,
                            actual_speed: aggregate.avg_speed,
                            actual_direction: aggregate.avg_direction_deg,
                            forecast_speed: snapshot.speed_knots,
                            forecast_direction: snapshot.direction_deg,
                            speed_error,
                            direction_error,
                        })
                        .await?;
                    written += 1;
                }
            }
        }

        Ok(written)
    }

    /// Recompute every rollup row. The cross-model normalisation needs all
    /// rollups in hand before any composite is final, and the writes land
    /// in a single transaction.
    async fn recompute_scores(&self) -> Result<usize> {
        let now = Utc::now();
        let mut rollups: Vec<(String, Option<ModelRollup>)> = Vec::new();

        for model_id in &self.model_ids {
            let rows = self.storage.accuracy_for_model(model_id).await?;
            rollups.push((model_id.clone(), compute_rollup(&rows)));
        }

        let max_rmse = rollups
            .iter()
            .filter_map(|(_, r)| r.as_ref().map(|r| r.rmse_speed))
            .fold(0.0f64, f64::max);
        let max_mae = rollups
            .iter()
            .filter_map(|(_, r)| r.as_ref().map(|r| r.mae_speed))
            .fold(0.0f64, f64::max);

        let scores: Vec<ModelScore> = rollups
            .into_iter()
            .map(|(model_id, rollup)| match rollup {
                Some(r) => ModelScore {
                    model_id,
                    rmse_speed: r.rmse_speed,
                    mae_speed: r.mae_speed,
                    rmse_direction: r.rmse_direction,
                    mae_direction: r.mae_direction,
                    correlation_speed: r.correlation_speed,
                    correction_factor: r.correction_factor,
                    eval_count: r.eval_count,
                    composite_score: composite_score(&r, max_rmse, max_mae),
                    last_updated: now,
                },
                None => ModelScore::unscored(&model_id, now),
            })
            .collect();

        self.storage.replace_model_scores(&scores).await?;
        Ok(scores.len())
    }

    /// Scheduler wrapper: scoring failure is logged and retried next day.
    pub async fn run_logged(&self) {
        if let Err(e) = self.run().await {
            warn!("Forecast scoring failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(actual: f64, forecast: f64) -> AccuracyRow {
        AccuracyRow {
            model_id: "gfs".to_string(),
            eval_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            target_hour_local: 10,
            actual_speed: actual,
            actual_direction: 90.0,
            forecast_speed: forecast,
            forecast_direction: 95.0,
            speed_error: (forecast - actual).abs(),
            direction_error: 5.0,
        }
    }

    #[test]
    fn test_rollup_empty() {
        assert!(compute_rollup(&[]).is_none());
    }

    #[test]
    fn test_correction_factor_moves_toward_ratio() {
        // Forecast said 14, the hour realised 16: factor heads for 16/14
        let rollup = compute_rollup(&[row(16.0, 14.0)]).unwrap();
        assert!((rollup.correction_factor - 16.0 / 14.0).abs() < 1e-9);
        assert_eq!(rollup.eval_count, 1);
        assert!((rollup.mae_speed - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_correction_ignores_outlier_ratios() {
        // 3x over-forecast falls outside [0.5, 2.0] and must not qualify
        let rollup = compute_rollup(&[row(30.0, 10.0), row(12.0, 12.0)]).unwrap();
        assert!((rollup.correction_factor - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_correction_defaults_without_qualifiers() {
        let rollup = compute_rollup(&[row(30.0, 10.0)]).unwrap();
        assert_eq!(rollup.correction_factor, 1.0);
    }

    #[test]
    fn test_rollup_deterministic() {
        let rows = vec![row(16.0, 14.0), row(12.0, 13.0), row(10.0, 9.0)];
        let a = compute_rollup(&rows).unwrap();
        let b = compute_rollup(&rows).unwrap();
        assert_eq!(a.rmse_speed, b.rmse_speed);
        assert_eq!(a.mae_speed, b.mae_speed);
        assert_eq!(a.correlation_speed, b.correlation_speed);
        assert_eq!(a.correction_factor, b.correction_factor);
    }

    #[test]
    fn test_best_model_gating_below_min_evals() {
        let now = Utc::now();
        let mut strong = ModelScore::unscored("warming", now);
        strong.eval_count = 9;
        strong.composite_score = 0.05;
        let mut weak = ModelScore::unscored("scored", now);
        weak.eval_count = 10;
        weak.composite_score = 0.8;

        // A warming model never wins, however good its score looks
        let best = select_best_model(&[strong.clone(), weak.clone()], 10, "best_match");
        assert_eq!(best, "scored");

        // With nothing eligible the configured default stands
        let best = select_best_model(&[strong], 10, "best_match");
        assert_eq!(best, "best_match");

        // Empty table: default as well
        assert_eq!(select_best_model(&[], 10, "best_match"), "best_match");
    }

    #[test]
    fn test_composite_bounds_and_ranking() {
        let good = compute_rollup(&[row(10.0, 10.5), row(12.0, 12.4), row(14.0, 14.2)]).unwrap();
        let bad = compute_rollup(&[row(10.0, 18.0), row(12.0, 5.0), row(14.0, 25.0)]).unwrap();

        let max_rmse = good.rmse_speed.max(bad.rmse_speed);
        let max_mae = good.mae_speed.max(bad.mae_speed);

        let good_score = composite_score(&good, max_rmse, max_mae);
        let bad_score = composite_score(&bad, max_rmse, max_mae);

        assert!((0.0..=1.0).contains(&good_score));
        assert!((0.0..=1.0).contains(&bad_score));
        assert!(good_score < bad_score);
    }
}
