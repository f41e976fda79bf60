use anyhow::Result;
use chrono::{DateTime, Duration, DurationRound, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{HourlyAggregate, Measurement};
use crate::services::storage::Storage;
use crate::utils::circular;
use crate::utils::config::Config;
use crate::utils::stats;

/// Collapse one hour of readings into a single aggregate row. Returns
/// `None` for an empty hour. Direction means are circular; the arithmetic
/// mean of headings is never used.
pub fn aggregate_hour(
    station_id: &str,
    hour_ts: DateTime<Utc>,
    rows: &[Measurement],
) -> Option<HourlyAggregate> {
    if rows.is_empty() {
        return None;
    }

    let speeds: Vec<f64> = rows.iter().map(|m| m.wind_speed_knots).collect();
    let gusts: Vec<f64> = rows.iter().filter_map(|m| m.wind_gust_knots).collect();
    let dirs: Vec<f64> = rows.iter().map(|m| m.wind_direction_deg as f64).collect();
    let avg_dirs: Vec<f64> = rows
        .iter()
        .map(|m| m.wind_direction_avg_deg.unwrap_or(m.wind_direction_deg) as f64)
        .collect();
    let temps: Vec<f64> = rows.iter().filter_map(|m| m.temperature).collect();
    let hums: Vec<f64> = rows.iter().filter_map(|m| m.humidity).collect();
    let pressures: Vec<f64> = rows.iter().filter_map(|m| m.pressure).collect();

    let avg_direction = circular::circular_mean(&dirs)?;
    let dominant_direction = circular::circular_mean(&avg_dirs).unwrap_or(avg_direction);

    Some(HourlyAggregate {
        hour_ts,
        station_id: station_id.to_string(),
        avg_speed: stats::mean(&speeds)?,
        min_speed: stats::min(&speeds)?,
        max_speed: stats::max(&speeds)?,
        avg_gust: stats::mean(&gusts),
        max_gust: stats::max(&gusts),
        avg_direction_deg: avg_direction,
        dominant_direction_deg: dominant_direction,
        avg_temperature: stats::mean(&temps),
        avg_humidity: stats::mean(&hums),
        avg_pressure: stats::mean(&pressures),
        measurement_count: rows.len() as i32,
    })
}

/// Hourly archiver plus the daily retention sweep.
pub struct AggregationService {
    storage: Arc<Storage>,
    station_ids: Vec<String>,
    measurement_retention_days: i64,
    snapshot_retention_days: i64,
    aggregate_retention_days: i64,
}

impl AggregationService {
    pub fn new(config: &Config, storage: Arc<Storage>) -> Self {
        Self {
            storage,
            station_ids: config.stations.iter().map(|s| s.id.clone()).collect(),
            measurement_retention_days: 7,
            snapshot_retention_days: 14,
            aggregate_retention_days: 365,
        }
    }

    /// Archive the previous whole hour for every station. Re-runs upsert
    /// over the same hour, last write wins.
    pub async fn archive_previous_hour(&self) -> Result<usize> {
        let hour_end = Utc::now()
            .duration_trunc(Duration::hours(1))
            .unwrap_or_else(|_| Utc::now());
        let hour_start = hour_end - Duration::hours(1);
        self.archive_hour(hour_start).await
    }

    /// Archive one specific hour (admin force-runs reuse this).
    pub async fn archive_hour(&self, hour_start: DateTime<Utc>) -> Result<usize> {
        let hour_end = hour_start + Duration::hours(1);
        let mut written = 0usize;

        for station_id in &self.station_ids {
            let rows = self
                .storage
                .measurements_between_raw(station_id, hour_start, hour_end)
                .await?;

            match aggregate_hour(station_id, hour_start, &rows) {
                Some(aggregate) => {
                    self.storage.upsert_hourly_aggregate(&aggregate).await?;
                    written += 1;
                    info!(
                        "Archived {} {}: {} readings, avg {:.1} kn",
                        station_id,
                        hour_start.to_rfc3339(),
                        aggregate.measurement_count,
                        aggregate.avg_speed
                    );
                }
                None => {
                    info!("No readings to archive for {} at {}", station_id, hour_start);
                }
            }
        }

        Ok(written)
    }

    /// Daily retention sweep over every table plus the snapshot-aligned
    /// accuracy prune.
    pub async fn cleanup(&self) -> Result<()> {
        let now = Utc::now();

        let measurements = self
            .storage
            .prune_measurements_before(now - Duration::days(self.measurement_retention_days))
            .await?;
        let snapshots = self
            .storage
            .prune_snapshots_before(now - Duration::days(self.snapshot_retention_days))
            .await?;
        let accuracy_cutoff: NaiveDate =
            (now - Duration::days(self.snapshot_retention_days)).date_naive();
        let accuracy = self.storage.prune_accuracy_before(accuracy_cutoff).await?;
        let aggregates = self
            .storage
            .prune_aggregates_before(now - Duration::days(self.aggregate_retention_days))
            .await?;

        if measurements + snapshots + accuracy + aggregates > 0 {
            info!(
                "Cleanup removed {} measurements, {} snapshots, {} accuracy rows, {} aggregates",
                measurements, snapshots, accuracy, aggregates
            );
        }
        Ok(())
    }

    /// Cleanup wrapper for the scheduler: failures are logged, never fatal.
    pub async fn cleanup_logged(&self) {
        if let Err(e) = self.cleanup().await {
            warn!("Retention cleanup failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(speed: f64, dir: i32, gust: Option<f64>) -> Measurement {
        Measurement {
            id: 0,
            ts: Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap(),
            station_id: "pier".to_string(),
            wind_speed_knots: speed,
            wind_gust_knots: gust,
            max_gust_knots: None,
            wind_direction_deg: dir,
            wind_direction_avg_deg: None,
            temperature: Some(20.0),
            humidity: Some(60.0),
            pressure: None,
        }
    }

    #[test]
    fn test_empty_hour_skipped() {
        let hour = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        assert!(aggregate_hour("pier", hour, &[]).is_none());
    }

    #[test]
    fn test_speed_stats() {
        let hour = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        let rows = vec![
            reading(10.0, 90, Some(14.0)),
            reading(12.0, 90, Some(16.0)),
            reading(14.0, 90, None),
        ];
        let a = aggregate_hour("pier", hour, &rows).unwrap();
        assert_eq!(a.avg_speed, 12.0);
        assert_eq!(a.min_speed, 10.0);
        assert_eq!(a.max_speed, 14.0);
        assert_eq!(a.max_gust, Some(16.0));
        assert_eq!(a.measurement_count, 3);
    }

    #[test]
    fn test_circular_mean_across_north() {
        let hour = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        let rows: Vec<Measurement> = [350, 5, 15, 355, 10, 0]
            .iter()
            .map(|d| reading(10.0, *d, None))
            .collect();
        let a = aggregate_hour("pier", hour, &rows).unwrap();
        assert!(
            a.avg_direction_deg < 1.0 || a.avg_direction_deg > 359.0,
            "got {}",
            a.avg_direction_deg
        );
        assert_eq!(a.measurement_count, 6);
    }

    #[test]
    fn test_two_reading_wraparound() {
        let hour = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        let rows = vec![reading(10.0, 350, None), reading(10.0, 10, None)];
        let a = aggregate_hour("pier", hour, &rows).unwrap();
        assert!(
            a.avg_direction_deg < 1.0 || a.avg_direction_deg > 359.0,
            "arithmetic mean would say 180, circular must say ~0, got {}",
            a.avg_direction_deg
        );
    }
}
