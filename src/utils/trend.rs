//! On-demand trend and stability derivations over recent measurements.
//!
//! Inputs are ordered newest first, the way the storage layer returns
//! recent readings. At the 5-minute ingestion cadence, 12 samples cover the
//! last hour: the first six form the current window, the next six the
//! previous window.

use serde::Serialize;

use crate::utils::circular;
use crate::utils::stats;
use crate::utils::units::round1;

const WINDOW: usize = 6;
const MIN_WINDOW_SAMPLES: usize = 3;
const DIRECTION_SAMPLES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTrend {
    Stable,
    Increasing,
    IncreasingStrong,
    Decreasing,
    DecreasingStrong,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionStability {
    Stable,
    Variable,
    Changing,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub speed_trend: SpeedTrend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_knots: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_percent: Option<f64>,
    pub direction_stability: DirectionStability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction_spread_deg: Option<f64>,
    pub sample_count: usize,
}

fn classify_speed(delta_percent: f64) -> SpeedTrend {
    if delta_percent.abs() < 5.0 {
        SpeedTrend::Stable
    } else if delta_percent > 15.0 {
        SpeedTrend::IncreasingStrong
    } else if delta_percent >= 5.0 {
        SpeedTrend::Increasing
    } else if delta_percent < -15.0 {
        SpeedTrend::DecreasingStrong
    } else {
        SpeedTrend::Decreasing
    }
}

fn classify_direction(spread_deg: f64) -> DirectionStability {
    if spread_deg < 15.0 {
        DirectionStability::Stable
    } else if spread_deg < 30.0 {
        DirectionStability::Variable
    } else {
        DirectionStability::Changing
    }
}

/// Compute the trend report from speeds and directions ordered newest first.
pub fn compute_trend(speeds: &[f64], directions: &[f64]) -> TrendReport {
    let sample_count = speeds.len();

    let current: Vec<f64> = speeds.iter().take(WINDOW).copied().collect();
    let previous: Vec<f64> = speeds.iter().skip(WINDOW).take(WINDOW).copied().collect();

    let (speed_trend, delta_knots, delta_percent) =
        if current.len() < MIN_WINDOW_SAMPLES || previous.len() < MIN_WINDOW_SAMPLES {
            (SpeedTrend::InsufficientData, None, None)
        } else {
            let cur = stats::mean(&current).unwrap_or(0.0);
            let prev = stats::mean(&previous).unwrap_or(0.0);
            let delta = cur - prev;
            let percent = if prev.abs() < f64::EPSILON {
                if delta.abs() < f64::EPSILON {
                    0.0
                } else {
                    100.0
                }
            } else {
                100.0 * delta / prev
            };
            (
                classify_speed(percent),
                Some(round1(delta)),
                Some(round1(percent)),
            )
        };

    let recent_dirs: Vec<f64> = directions.iter().take(DIRECTION_SAMPLES).copied().collect();
    let (direction_stability, direction_spread_deg) = if recent_dirs.len() < 2 {
        (DirectionStability::InsufficientData, None)
    } else {
        match circular::spread_degrees(&recent_dirs) {
            Some(spread) => (classify_direction(spread), Some(round1(spread))),
            None => (DirectionStability::InsufficientData, None),
        }
    };

    TrendReport {
        speed_trend,
        delta_knots,
        delta_percent,
        direction_stability,
        direction_spread_deg,
        sample_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_dirs(n: usize) -> Vec<f64> {
        vec![90.0; n]
    }

    #[test]
    fn test_insufficient_data_short_history() {
        // 8 samples leaves only 2 in the previous window
        let speeds = vec![10.0; 8];
        let report = compute_trend(&speeds, &flat_dirs(8));
        assert_eq!(report.speed_trend, SpeedTrend::InsufficientData);
        assert!(report.delta_percent.is_none());
    }

    #[test]
    fn test_stable() {
        let speeds = vec![10.0, 10.2, 9.9, 10.1, 10.0, 10.0, 10.0, 10.1, 9.9, 10.0, 10.0, 10.1];
        let report = compute_trend(&speeds, &flat_dirs(12));
        assert_eq!(report.speed_trend, SpeedTrend::Stable);
    }

    #[test]
    fn test_increasing_and_strong() {
        // Newest first: current window ~11, previous ~10 (+10%)
        let mut speeds = vec![11.0; 6];
        speeds.extend(vec![10.0; 6]);
        let report = compute_trend(&speeds, &flat_dirs(12));
        assert_eq!(report.speed_trend, SpeedTrend::Increasing);

        let mut speeds = vec![13.0; 6];
        speeds.extend(vec![10.0; 6]);
        let report = compute_trend(&speeds, &flat_dirs(12));
        assert_eq!(report.speed_trend, SpeedTrend::IncreasingStrong);
    }

    #[test]
    fn test_decreasing_and_strong() {
        let mut speeds = vec![9.0; 6];
        speeds.extend(vec![10.0; 6]);
        let report = compute_trend(&speeds, &flat_dirs(12));
        assert_eq!(report.speed_trend, SpeedTrend::Decreasing);

        let mut speeds = vec![8.0; 6];
        speeds.extend(vec![10.0; 6]);
        let report = compute_trend(&speeds, &flat_dirs(12));
        assert_eq!(report.speed_trend, SpeedTrend::DecreasingStrong);
    }

    #[test]
    fn test_direction_stability_classes() {
        let speeds = vec![10.0; 12];
        let tight = compute_trend(&speeds, &[90.0, 91.0, 89.0, 90.0, 92.0, 88.0]);
        assert_eq!(tight.direction_stability, DirectionStability::Stable);

        let wild = compute_trend(&speeds, &[0.0, 90.0, 180.0, 270.0, 45.0, 200.0]);
        assert_eq!(wild.direction_stability, DirectionStability::Changing);
    }
}
