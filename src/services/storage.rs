use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use std::sync::Arc;

use crate::models::api_responses::{DayGroup, GradientBucket, HourPattern};
use crate::models::{AccuracyRow, ForecastSnapshot, HourlyAggregate, Measurement, ModelScore, NewMeasurement};
use crate::services::calibration::Calibration;
use crate::utils::circular;
use crate::utils::stats;
use crate::utils::units::round1;

const MEASUREMENT_COLS: &str = "\
    id, ts, station_id, wind_speed_knots, wind_gust_knots, max_gust_knots, \
    wind_direction_deg, wind_direction_avg_deg, temperature, humidity, pressure";

const AGGREGATE_COLS: &str = "\
    hour_ts, station_id, avg_speed, min_speed, max_speed, avg_gust, max_gust, \
    avg_direction_deg, dominant_direction_deg, avg_temperature, avg_humidity, \
    avg_pressure, measurement_count";

const SNAPSHOT_COLS: &str = "\
    id, snapshot_ts, model_id, target_date, target_hour_local, speed_knots, \
    gust_knots, direction_deg";

const ACCURACY_COLS: &str = "\
    model_id, eval_date, target_hour_local, actual_speed, actual_direction, \
    forecast_speed, forecast_direction, speed_error, direction_error";

const SCORE_COLS: &str = "\
    model_id, rmse_speed, mae_speed, rmse_direction, mae_direction, \
    correlation_speed, correction_factor, eval_count, composite_score, last_updated";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Run embedded schema migrations. A failure here is fatal at startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("schema migration failed")?;
    tracing::info!("Schema migrations up to date");
    Ok(())
}

/// UTC bounds of one local calendar day at the spot.
pub fn local_day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = |d: NaiveDate| {
        let naive = d.and_hms_opt(0, 0, 0).expect("midnight is valid");
        tz.from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive))
            .with_timezone(&Utc)
    };
    (midnight(date), midnight(date + Duration::days(1)))
}

/// Sole owner of the SQL store. All reads that return a wind direction
/// apply the calibration offset on the way out; raw values stay untouched
/// on disk.
pub struct Storage {
    pool: PgPool,
    calibration: Arc<Calibration>,
}

impl Storage {
    pub fn new(pool: PgPool, calibration: Arc<Calibration>) -> Self {
        Self { pool, calibration }
    }

    fn calibrate_deg_i32(&self, raw: i32) -> i32 {
        circular::apply_offset(raw as f64, self.calibration.offset()).round() as i32 % 360
    }

    fn calibrate_deg_f64(&self, raw: f64) -> f64 {
        circular::apply_offset(raw, self.calibration.offset())
    }

    fn calibrate_measurement(&self, mut m: Measurement) -> Measurement {
        m.wind_direction_deg = self.calibrate_deg_i32(m.wind_direction_deg);
        m.wind_direction_avg_deg = m.wind_direction_avg_deg.map(|d| self.calibrate_deg_i32(d));
        m
    }

    fn calibrate_aggregate(&self, mut a: HourlyAggregate) -> HourlyAggregate {
        a.avg_direction_deg = self.calibrate_deg_f64(a.avg_direction_deg);
        a.dominant_direction_deg = self.calibrate_deg_f64(a.dominant_direction_deg);
        a
    }

    // --- raw measurements ---

    pub async fn insert_measurement(&self, m: &NewMeasurement) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO wind_measurements (
                ts, station_id, wind_speed_knots, wind_gust_knots, max_gust_knots,
                wind_direction_deg, wind_direction_avg_deg, temperature, humidity, pressure
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            RETURNING id
            "#,
        )
        .bind(m.ts)
        .bind(&m.station_id)
        .bind(m.wind_speed_knots)
        .bind(m.wind_gust_knots)
        .bind(m.max_gust_knots)
        .bind(m.wind_direction_deg)
        .bind(m.wind_direction_avg_deg)
        .bind(m.temperature)
        .bind(m.humidity)
        .bind(m.pressure)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert measurement")?;
        Ok(id)
    }

    pub async fn latest_measurement(&self, station_id: &str) -> Result<Option<Measurement>> {
        let row: Option<Measurement> = sqlx::query_as(&format!(
            "SELECT {MEASUREMENT_COLS} FROM wind_measurements \
             WHERE station_id = $1 ORDER BY ts DESC LIMIT 1"
        ))
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read latest measurement")?;
        Ok(row.map(|m| self.calibrate_measurement(m)))
    }

    /// The N most recent readings for a station, newest first.
    pub async fn recent_measurements(&self, station_id: &str, limit: i64) -> Result<Vec<Measurement>> {
        let rows: Vec<Measurement> = sqlx::query_as(&format!(
            "SELECT {MEASUREMENT_COLS} FROM wind_measurements \
             WHERE station_id = $1 ORDER BY ts DESC LIMIT $2"
        ))
        .bind(station_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to read recent measurements")?;
        Ok(rows.into_iter().map(|m| self.calibrate_measurement(m)).collect())
    }

    /// Readings since a cutoff, newest first.
    pub async fn measurements_since(
        &self,
        station_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let rows: Vec<Measurement> = sqlx::query_as(&format!(
            "SELECT {MEASUREMENT_COLS} FROM wind_measurements \
             WHERE station_id = $1 AND ts >= $2 ORDER BY ts DESC"
        ))
        .bind(station_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to read measurements since cutoff")?;
        Ok(rows.into_iter().map(|m| self.calibrate_measurement(m)).collect())
    }

    /// Readings in `[from, to)`, oldest first (archiver order).
    pub async fn measurements_between(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let rows: Vec<Measurement> = sqlx::query_as(&format!(
            "SELECT {MEASUREMENT_COLS} FROM wind_measurements \
             WHERE station_id = $1 AND ts >= $2 AND ts < $3 ORDER BY ts ASC"
        ))
        .bind(station_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("failed to read measurement range")?;
        Ok(rows.into_iter().map(|m| self.calibrate_measurement(m)).collect())
    }

    /// Readings in `[from, to)` with directions left in the raw sensor
    /// frame. Only the archiver uses this: aggregates persist raw-frame
    /// circular means so the calibration offset is applied exactly once,
    /// on aggregate reads.
    pub async fn measurements_between_raw(
        &self,
        station_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let rows: Vec<Measurement> = sqlx::query_as(&format!(
            "SELECT {MEASUREMENT_COLS} FROM wind_measurements \
             WHERE station_id = $1 AND ts >= $2 AND ts < $3 ORDER BY ts ASC"
        ))
        .bind(station_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("failed to read raw measurement range")?;
        Ok(rows)
    }

    pub async fn prune_measurements_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM wind_measurements WHERE ts < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune measurements")?;
        Ok(done.rows_affected())
    }

    /// Today's readings whose local hour falls inside `[h0, h1]`, oldest
    /// first. Grouping is done in the activity zone even though rows are
    /// stored UTC.
    pub async fn today_measurements_in_hours(
        &self,
        station_id: &str,
        tz: Tz,
        h0: u32,
        h1: u32,
    ) -> Result<Vec<Measurement>> {
        let today = Utc::now().with_timezone(&tz).date_naive();
        let (from, to) = local_day_bounds(today, tz);
        let rows = self.measurements_between(station_id, from, to).await?;
        Ok(rows
            .into_iter()
            .filter(|m| {
                let hour = m.ts.with_timezone(&tz).hour();
                hour >= h0 && hour <= h1
            })
            .collect())
    }

    /// Collapse today's readings into k-minute buckets aligned on the local
    /// clock. `interval_min = 60` gives the hourly view.
    pub async fn today_gradient(
        &self,
        station_id: &str,
        tz: Tz,
        h0: u32,
        h1: u32,
        interval_min: u32,
    ) -> Result<Vec<GradientBucket>> {
        let interval = interval_min.clamp(1, 24 * 60);
        let rows = self.today_measurements_in_hours(station_id, tz, h0, h1).await?;

        let mut buckets: Vec<(u32, Vec<&Measurement>)> = Vec::new();
        for m in &rows {
            let local = m.ts.with_timezone(&tz);
            let minutes = local.hour() * 60 + local.minute();
            let slot = minutes - minutes % interval;
            match buckets.last_mut() {
                Some((start, group)) if *start == slot => group.push(m),
                _ => buckets.push((slot, vec![m])),
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(slot, group)| {
                let speeds: Vec<f64> = group.iter().map(|m| m.wind_speed_knots).collect();
                let dirs: Vec<f64> = group.iter().map(|m| m.wind_direction_deg as f64).collect();
                let gusts: Vec<f64> = group.iter().filter_map(|m| m.wind_gust_knots).collect();
                GradientBucket {
                    bucket_start_local: format!("{:02}:{:02}", slot / 60, slot % 60),
                    avg_speed: round1(stats::mean(&speeds).unwrap_or(0.0)),
                    max_gust: stats::max(&gusts).map(round1),
                    avg_direction_deg: circular::circular_mean(&dirs).map(round1),
                    sample_count: group.len(),
                }
            })
            .collect())
    }

    /// Per-day groups over the last `days` local dates, filtered to the
    /// activity window, newest day first.
    pub async fn week_history(
        &self,
        station_id: &str,
        tz: Tz,
        days: i64,
        h0: u32,
        h1: u32,
    ) -> Result<Vec<DayGroup>> {
        let today = Utc::now().with_timezone(&tz).date_naive();
        let mut groups = Vec::new();
        for offset in 0..days {
            let date = today - Duration::days(offset);
            let (from, to) = local_day_bounds(date, tz);
            let measurements: Vec<Measurement> = self
                .measurements_between(station_id, from, to)
                .await?
                .into_iter()
                .filter(|m| {
                    let hour = m.ts.with_timezone(&tz).hour();
                    hour >= h0 && hour <= h1
                })
                .collect();
            groups.push(DayGroup { date, measurements });
        }
        Ok(groups)
    }

    // --- hourly aggregates ---

    pub async fn upsert_hourly_aggregate(&self, a: &HourlyAggregate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hourly_aggregates (
                hour_ts, station_id, avg_speed, min_speed, max_speed, avg_gust,
                max_gust, avg_direction_deg, dominant_direction_deg,
                avg_temperature, avg_humidity, avg_pressure, measurement_count
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            ON CONFLICT (station_id, hour_ts) DO UPDATE SET
                avg_speed = EXCLUDED.avg_speed,
                min_speed = EXCLUDED.min_speed,
                max_speed = EXCLUDED.max_speed,
                avg_gust = EXCLUDED.avg_gust,
                max_gust = EXCLUDED.max_gust,
                avg_direction_deg = EXCLUDED.avg_direction_deg,
                dominant_direction_deg = EXCLUDED.dominant_direction_deg,
                avg_temperature = EXCLUDED.avg_temperature,
                avg_humidity = EXCLUDED.avg_humidity,
                avg_pressure = EXCLUDED.avg_pressure,
                measurement_count = EXCLUDED.measurement_count
            "#,
        )
        .bind(a.hour_ts)
        .bind(&a.station_id)
        .bind(a.avg_speed)
        .bind(a.min_speed)
        .bind(a.max_speed)
        .bind(a.avg_gust)
        .bind(a.max_gust)
        .bind(a.avg_direction_deg)
        .bind(a.dominant_direction_deg)
        .bind(a.avg_temperature)
        .bind(a.avg_humidity)
        .bind(a.avg_pressure)
        .bind(a.measurement_count)
        .execute(&self.pool)
        .await
        .context("failed to upsert hourly aggregate")?;
        Ok(())
    }

    /// Aggregates newer than a cutoff, newest first.
    pub async fn aggregates_since(
        &self,
        station_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAggregate>> {
        let rows: Vec<HourlyAggregate> = sqlx::query_as(&format!(
            "SELECT {AGGREGATE_COLS} FROM hourly_aggregates \
             WHERE station_id = $1 AND hour_ts >= $2 ORDER BY hour_ts DESC"
        ))
        .bind(station_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to read aggregates")?;
        Ok(rows.into_iter().map(|a| self.calibrate_aggregate(a)).collect())
    }

    /// Aggregates for one local date, oldest first.
    pub async fn aggregates_for_local_date(
        &self,
        station_id: &str,
        date: NaiveDate,
        tz: Tz,
    ) -> Result<Vec<HourlyAggregate>> {
        let (from, to) = local_day_bounds(date, tz);
        let rows: Vec<HourlyAggregate> = sqlx::query_as(&format!(
            "SELECT {AGGREGATE_COLS} FROM hourly_aggregates \
             WHERE station_id = $1 AND hour_ts >= $2 AND hour_ts < $3 ORDER BY hour_ts ASC"
        ))
        .bind(station_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("failed to read aggregates for date")?;
        Ok(rows.into_iter().map(|a| self.calibrate_aggregate(a)).collect())
    }

    /// Per-local-hour averages over the last `days` days of archive.
    pub async fn hourly_patterns(
        &self,
        station_id: &str,
        tz: Tz,
        days: i64,
    ) -> Result<Vec<HourPattern>> {
        let since = Utc::now() - Duration::days(days);
        let rows = self.aggregates_since(station_id, since).await?;

        let mut by_hour: Vec<(u32, Vec<&HourlyAggregate>)> = Vec::new();
        for hour in 0..24u32 {
            let group: Vec<&HourlyAggregate> = rows
                .iter()
                .filter(|a| a.hour_ts.with_timezone(&tz).hour() == hour)
                .collect();
            if !group.is_empty() {
                by_hour.push((hour, group));
            }
        }

        Ok(by_hour
            .into_iter()
            .map(|(hour, group)| {
                let speeds: Vec<f64> = group.iter().map(|a| a.avg_speed).collect();
                let gusts: Vec<f64> = group.iter().filter_map(|a| a.max_gust).collect();
                let dirs: Vec<f64> = group.iter().map(|a| a.avg_direction_deg).collect();
                HourPattern {
                    hour_local: hour,
                    avg_speed: round1(stats::mean(&speeds).unwrap_or(0.0)),
                    avg_gust: stats::mean(&gusts).map(round1),
                    avg_direction_deg: circular::circular_mean(&dirs).map(round1),
                    sample_count: group.len(),
                }
            })
            .collect())
    }

    pub async fn prune_aggregates_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM hourly_aggregates WHERE hour_ts < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune aggregates")?;
        Ok(done.rows_affected())
    }

    // --- forecast snapshots ---

    pub async fn insert_snapshot(
        &self,
        snapshot_ts: DateTime<Utc>,
        model_id: &str,
        target_date: NaiveDate,
        target_hour_local: i32,
        speed_knots: f64,
        gust_knots: f64,
        direction_deg: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forecast_snapshots (
                snapshot_ts, model_id, target_date, target_hour_local,
                speed_knots, gust_knots, direction_deg
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            "#,
        )
        .bind(snapshot_ts)
        .bind(model_id)
        .bind(target_date)
        .bind(target_hour_local)
        .bind(speed_knots)
        .bind(gust_knots)
        .bind(direction_deg)
        .execute(&self.pool)
        .await
        .context("failed to insert forecast snapshot")?;
        Ok(())
    }

    /// All snapshots for one (model, date, hour), newest poll first.
    pub async fn snapshots_for_hour(
        &self,
        model_id: &str,
        target_date: NaiveDate,
        target_hour_local: i32,
    ) -> Result<Vec<ForecastSnapshot>> {
        let rows: Vec<ForecastSnapshot> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLS} FROM forecast_snapshots \
             WHERE model_id = $1 AND target_date = $2 AND target_hour_local = $3 \
             ORDER BY snapshot_ts DESC"
        ))
        .bind(model_id)
        .bind(target_date)
        .bind(target_hour_local)
        .fetch_all(&self.pool)
        .await
        .context("failed to read snapshots for hour")?;
        Ok(rows)
    }

    /// Latest snapshot per upcoming (date, hour) for one model, starting at
    /// the given local date/hour.
    pub async fn upcoming_snapshots(
        &self,
        model_id: &str,
        from_date: NaiveDate,
        from_hour: i32,
    ) -> Result<Vec<ForecastSnapshot>> {
        let rows: Vec<ForecastSnapshot> = sqlx::query_as(&format!(
            "SELECT DISTINCT ON (target_date, target_hour_local) {SNAPSHOT_COLS} \
             FROM forecast_snapshots \
             WHERE model_id = $1 \
               AND (target_date > $2 OR (target_date = $2 AND target_hour_local >= $3)) \
             ORDER BY target_date, target_hour_local, snapshot_ts DESC"
        ))
        .bind(model_id)
        .bind(from_date)
        .bind(from_hour)
        .fetch_all(&self.pool)
        .await
        .context("failed to read upcoming snapshots")?;
        Ok(rows)
    }

    pub async fn prune_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM forecast_snapshots WHERE snapshot_ts < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune snapshots")?;
        Ok(done.rows_affected())
    }

    // --- accuracy & scores ---

    pub async fn upsert_accuracy(&self, row: &AccuracyRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forecast_accuracy (
                model_id, eval_date, target_hour_local, actual_speed,
                actual_direction, forecast_speed, forecast_direction,
                speed_error, direction_error
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ON CONFLICT (model_id, eval_date, target_hour_local) DO UPDATE SET
                actual_speed = EXCLUDED.actual_speed,
                actual_direction = EXCLUDED.actual_direction,
                forecast_speed = EXCLUDED.forecast_speed,
                forecast_direction = EXCLUDED.forecast_direction,
                speed_error = EXCLUDED.speed_error,
                direction_error = EXCLUDED.direction_error
            "#,
        )
        .bind(&row.model_id)
        .bind(row.eval_date)
        .bind(row.target_hour_local)
        .bind(row.actual_speed)
        .bind(row.actual_direction)
        .bind(row.forecast_speed)
        .bind(row.forecast_direction)
        .bind(row.speed_error)
        .bind(row.direction_error)
        .execute(&self.pool)
        .await
        .context("failed to upsert accuracy row")?;
        Ok(())
    }

    pub async fn accuracy_for_model(&self, model_id: &str) -> Result<Vec<AccuracyRow>> {
        let rows: Vec<AccuracyRow> = sqlx::query_as(&format!(
            "SELECT {ACCURACY_COLS} FROM forecast_accuracy \
             WHERE model_id = $1 ORDER BY eval_date, target_hour_local"
        ))
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to read accuracy rows")?;
        Ok(rows)
    }

    pub async fn prune_accuracy_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let done = sqlx::query("DELETE FROM forecast_accuracy WHERE eval_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune accuracy rows")?;
        Ok(done.rows_affected())
    }

    /// Seed an unscored row for every configured model so the rollup table
    /// always has one row per model.
    pub async fn ensure_model_scores(&self, model_ids: &[String]) -> Result<()> {
        for model_id in model_ids {
            let unscored = ModelScore::unscored(model_id, Utc::now());
            sqlx::query(
                r#"
                INSERT INTO forecast_model_scores (
                    model_id, rmse_speed, mae_speed, rmse_direction, mae_direction,
                    correlation_speed, correction_factor, eval_count,
                    composite_score, last_updated
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
                ON CONFLICT (model_id) DO NOTHING
                "#,
            )
            .bind(&unscored.model_id)
            .bind(unscored.rmse_speed)
            .bind(unscored.mae_speed)
            .bind(unscored.rmse_direction)
            .bind(unscored.mae_direction)
            .bind(unscored.correlation_speed)
            .bind(unscored.correction_factor)
            .bind(unscored.eval_count)
            .bind(unscored.composite_score)
            .bind(unscored.last_updated)
            .execute(&self.pool)
            .await
            .context("failed to seed model score row")?;
        }
        Ok(())
    }

    /// Replace all rollup rows in one transaction, so a reader never sees a
    /// half-updated ranking.
    pub async fn replace_model_scores(&self, scores: &[ModelScore]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin score tx")?;
        for s in scores {
            sqlx::query(
                r#"
                INSERT INTO forecast_model_scores (
                    model_id, rmse_speed, mae_speed, rmse_direction, mae_direction,
                    correlation_speed, correction_factor, eval_count,
                    composite_score, last_updated
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
                ON CONFLICT (model_id) DO UPDATE SET
                    rmse_speed = EXCLUDED.rmse_speed,
                    mae_speed = EXCLUDED.mae_speed,
                    rmse_direction = EXCLUDED.rmse_direction,
                    mae_direction = EXCLUDED.mae_direction,
                    correlation_speed = EXCLUDED.correlation_speed,
                    correction_factor = EXCLUDED.correction_factor,
                    eval_count = EXCLUDED.eval_count,
                    composite_score = EXCLUDED.composite_score,
                    last_updated = EXCLUDED.last_updated
                "#,
            )
            .bind(&s.model_id)
            .bind(s.rmse_speed)
            .bind(s.mae_speed)
            .bind(s.rmse_direction)
            .bind(s.mae_direction)
            .bind(s.correlation_speed)
            .bind(s.correction_factor)
            .bind(s.eval_count)
            .bind(s.composite_score)
            .bind(s.last_updated)
            .execute(&mut *tx)
            .await
            .context("failed to upsert model score")?;
        }
        tx.commit().await.context("failed to commit score tx")?;
        Ok(())
    }

    pub async fn model_scores(&self) -> Result<Vec<ModelScore>> {
        let rows: Vec<ModelScore> = sqlx::query_as(&format!(
            "SELECT {SCORE_COLS} FROM forecast_model_scores ORDER BY composite_score ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to read model scores")?;
        Ok(rows)
    }

    pub async fn model_score(&self, model_id: &str) -> Result<Option<ModelScore>> {
        let row: Option<ModelScore> = sqlx::query_as(&format!(
            "SELECT {SCORE_COLS} FROM forecast_model_scores WHERE model_id = $1"
        ))
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read model score")?;
        Ok(row)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_day_bounds_utc() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let (from, to) = local_day_bounds(date, chrono_tz::UTC);
        assert_eq!(from.to_rfc3339(), "2026-07-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2026-07-02T00:00:00+00:00");
    }

    #[test]
    fn test_local_day_bounds_offset_zone() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let (from, to) = local_day_bounds(date, chrono_tz::Europe::Lisbon);
        // Lisbon is UTC+0 in winter
        assert_eq!(from.to_rfc3339(), "2026-01-15T00:00:00+00:00");

        let (summer_from, _) = local_day_bounds(
            NaiveDate::from_ymd_opt(2026, 7, 15).unwrap(),
            chrono_tz::Europe::Lisbon,
        );
        // +1 in summer: local midnight is 23:00 UTC the previous day
        assert_eq!(summer_from.to_rfc3339(), "2026-07-14T23:00:00+00:00");
        assert!(to > from);
    }
}
