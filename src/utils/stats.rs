//! Scalar statistics used by forecast scoring and the statistics endpoints.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| {
        Some(acc.map_or(v, |m: f64| m.min(v)))
    })
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| {
        Some(acc.map_or(v, |m: f64| m.max(v)))
    })
}

/// Root mean square of a set of errors.
pub fn rmse(errors: &[f64]) -> Option<f64> {
    mean(&errors.iter().map(|e| e * e).collect::<Vec<_>>()).map(f64::sqrt)
}

/// Mean absolute error (the inputs are already absolute deltas).
pub fn mae(errors: &[f64]) -> Option<f64> {
    mean(errors)
}

/// Pearson correlation coefficient between two equal-length samples.
/// Returns `None` when fewer than two pairs or either sample is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_min_max() {
        let v = [3.0, 1.0, 2.0];
        assert_eq!(mean(&v), Some(2.0));
        assert_eq!(min(&v), Some(1.0));
        assert_eq!(max(&v), Some(3.0));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_rmse_mae() {
        let errs = [3.0, 4.0];
        assert!((rmse(&errs).unwrap() - 3.5355339).abs() < 1e-6);
        assert_eq!(mae(&errs), Some(3.5));
    }

    #[test]
    fn test_pearson_perfect() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&xs, &ys).unwrap() - 1.0).abs() < 1e-9);

        let inv: Vec<f64> = ys.iter().map(|y| -y).collect();
        assert!((pearson(&xs, &inv).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[1.0], &[2.0]), None);
        assert_eq!(pearson(&[1.0, 1.0], &[2.0, 3.0]), None);
    }
}
