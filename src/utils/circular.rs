//! Circular statistics over wind headings.
//!
//! Headings wrap at 360°, so the arithmetic mean of raw degrees is wrong
//! (mean of 350° and 10° is 0°, not 180°). Every direction average in the
//! codebase goes through this module: the hourly archiver, the trend
//! derivation and the notification stability predicate.

/// Circular mean of headings in degrees, normalised to `[0, 360)`.
/// Returns `None` for an empty slice or a degenerate vector sum.
pub fn circular_mean(degrees: &[f64]) -> Option<f64> {
    if degrees.is_empty() {
        return None;
    }
    let (sin_sum, cos_sum) = degrees.iter().fold((0.0f64, 0.0f64), |(s, c), d| {
        let r = d.to_radians();
        (s + r.sin(), c + r.cos())
    });
    if sin_sum.abs() < 1e-12 && cos_sum.abs() < 1e-12 {
        // Perfectly opposing headings, no meaningful mean
        return None;
    }
    let mean = sin_sum.atan2(cos_sum).to_degrees();
    Some(mean.rem_euclid(360.0))
}

/// Mean resultant length `R ∈ [0, 1]`: 1 for identical headings, 0 for a
/// uniform spread.
pub fn mean_resultant_length(degrees: &[f64]) -> Option<f64> {
    if degrees.is_empty() {
        return None;
    }
    let n = degrees.len() as f64;
    let (sin_sum, cos_sum) = degrees.iter().fold((0.0f64, 0.0f64), |(s, c), d| {
        let r = d.to_radians();
        (s + r.sin(), c + r.cos())
    });
    Some(((sin_sum / n).powi(2) + (cos_sum / n).powi(2)).sqrt())
}

/// Angular spread in degrees, `acos(min(R, 1))`.
pub fn spread_degrees(degrees: &[f64]) -> Option<f64> {
    mean_resultant_length(degrees).map(|r| r.min(1.0).acos().to_degrees())
}

/// Shortest arc between two headings, in `[0, 180]`.
pub fn shortest_arc(a: f64, b: f64) -> f64 {
    let delta = (a - b).rem_euclid(360.0);
    delta.min(360.0 - delta)
}

/// Largest deviation of any heading from the set's circular mean.
pub fn max_deviation(degrees: &[f64]) -> Option<f64> {
    let mean = circular_mean(degrees)?;
    degrees
        .iter()
        .map(|d| shortest_arc(*d, mean))
        .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d))))
}

/// Apply a calibration offset to a raw heading, staying in `[0, 360)`.
pub fn apply_offset(raw: f64, offset: f64) -> f64 {
    (raw + offset).rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_across_north() {
        let mean = circular_mean(&[350.0, 10.0]).unwrap();
        assert!(mean < 1.0 || mean > 359.0, "got {}", mean);
    }

    #[test]
    fn test_mean_of_hourly_scenario() {
        // One archived hour of readings hugging north
        let mean = circular_mean(&[350.0, 5.0, 15.0, 355.0, 10.0, 0.0]).unwrap();
        assert!(mean < 1.0 || mean > 359.0, "got {}", mean);
    }

    #[test]
    fn test_mean_plain() {
        let mean = circular_mean(&[80.0, 90.0, 100.0]).unwrap();
        assert!((mean - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_empty_and_opposing() {
        assert!(circular_mean(&[]).is_none());
        assert!(circular_mean(&[0.0, 180.0]).is_none());
    }

    #[test]
    fn test_shortest_arc() {
        assert_eq!(shortest_arc(350.0, 10.0), 20.0);
        assert_eq!(shortest_arc(10.0, 350.0), 20.0);
        assert_eq!(shortest_arc(0.0, 180.0), 180.0);
        assert_eq!(shortest_arc(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_max_deviation() {
        // 20° cone around north
        let dev = max_deviation(&[350.0, 0.0, 10.0]).unwrap();
        assert!(dev <= 10.5, "got {}", dev);

        let wide = max_deviation(&[0.0, 90.0]).unwrap();
        assert!(wide > 40.0);
    }

    #[test]
    fn test_spread_tight_vs_wide() {
        let tight = spread_degrees(&[88.0, 90.0, 92.0]).unwrap();
        assert!(tight < 15.0);
        let wide = spread_degrees(&[0.0, 90.0, 180.0]).unwrap();
        assert!(wide > 30.0);
    }

    #[test]
    fn test_apply_offset_wraps() {
        assert_eq!(apply_offset(350.0, 30.0), 20.0);
        assert_eq!(apply_offset(10.0, -30.0), 340.0);
        assert_eq!(apply_offset(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_apply_offset_round_trip_over_full_range() {
        // Every calibration offset and raw heading maps to (raw + d) mod 360
        for d in (-180..=180).step_by(5) {
            for raw in (0..360).step_by(7) {
                let got = apply_offset(raw as f64, d as f64);
                let want = ((raw + d) % 360 + 360) % 360;
                assert!(
                    (got - want as f64).abs() < 1e-9,
                    "raw {} offset {}: got {} want {}",
                    raw,
                    d,
                    got,
                    want
                );
                assert!((0.0..360.0).contains(&got));
            }
        }
    }
}
