//! Numeric helpers shared by indicator calculations.

/// Weighted mean and (population) standard deviation. `None` if there are no
/// values, the lengths differ, or the weights sum to zero.
pub fn weighted_avg_and_std(values: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() || values.len() != weights.len() {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return None;
    }
    let mean = values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total;
    let variance = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    Some((mean, variance.sqrt()))
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Least-squares line through `(x, y)` points with x measured from the
/// smallest x. Returns `(gradient, offset)`. If every x is equal the line is
/// flat through the mean of y.
pub fn linear_regression(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0 - min_x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in points {
        let dx = (x - min_x) - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if sxx == 0.0 {
        return Some((0.0, mean_y));
    }
    let gradient = sxy / sxx;
    Some((gradient, mean_y - gradient * mean_x))
}

/// Exponential moving average where element `i` weights `values[i]` by 1,
/// `values[i-1]` by `alpha`, `values[i-2]` by `alpha^2` and so on, normalised
/// by the sum of weights.
pub fn exponential_moving_average(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for v in values {
        numerator = numerator * alpha + v;
        denominator = denominator * alpha + 1.0;
        out.push(numerator / denominator);
    }
    out
}

/// Smoothed value of a most-recent-first series: `data[0]` carries the most
/// weight.
pub fn exponential_smooth(data: &[f64], alpha: f64) -> Option<f64> {
    let reversed: Vec<f64> = data.iter().rev().copied().collect();
    exponential_moving_average(&reversed, alpha).last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weighted_mean_and_std() {
        let (mean, std) = weighted_avg_and_std(&[1.0, 3.0], &[1.0, 1.0]).unwrap();
        assert_relative_eq!(mean, 2.0);
        assert_relative_eq!(std, 1.0);

        let (mean, _) = weighted_avg_and_std(&[100.0, 200.0], &[3.0, 1.0]).unwrap();
        assert_relative_eq!(mean, 125.0);

        assert!(weighted_avg_and_std(&[], &[]).is_none());
        assert!(weighted_avg_and_std(&[1.0], &[0.0]).is_none());
        assert!(weighted_avg_and_std(&[1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn std_dev_population() {
        assert_relative_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap(), 2.0);
        assert!(std_dev(&[]).is_none());
    }

    #[test]
    fn regression_recovers_exact_line() {
        let points: Vec<(f64, f64)> = (0..10)
            .map(|i| (1_000_000.0 + i as f64 * 60.0, 250.0 + i as f64 * 0.5))
            .collect();
        let (gradient, offset) = linear_regression(&points).unwrap();
        assert_relative_eq!(gradient, 0.5 / 60.0, epsilon = 1e-12);
        assert_relative_eq!(offset, 250.0, epsilon = 1e-9);
    }

    #[test]
    fn regression_degenerate_inputs() {
        assert!(linear_regression(&[]).is_none());
        assert_eq!(linear_regression(&[(5.0, 7.0)]), Some((0.0, 7.0)));
        assert_eq!(linear_regression(&[(5.0, 6.0), (5.0, 8.0)]), Some((0.0, 7.0)));
    }

    #[test]
    fn ema_matches_explicit_weights() {
        let ema = exponential_moving_average(&[1.0, 2.0, 4.0], 0.5);
        assert_relative_eq!(ema[0], 1.0);
        assert_relative_eq!(ema[1], (2.0 + 0.5) / 1.5);
        assert_relative_eq!(ema[2], (4.0 + 1.0 + 0.25) / 1.75);
    }

    #[test]
    fn smooth_favours_first_element() {
        let v = exponential_smooth(&[4.0, 2.0, 1.0], 0.5).unwrap();
        assert_relative_eq!(v, (4.0 + 1.0 + 0.25) / 1.75);
        assert!(exponential_smooth(&[], 0.5).is_none());
    }
}
