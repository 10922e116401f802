//! Entertainment from heart rate
//!
//! Statistical features of the heart-rate window that correlate with reported
//! entertainment: level, spread, linearity over time, lag-1 autocorrelation and
//! approximate entropy.

use crate::error::ComputeError;

/// Embedding dimension for approximate entropy
const APEN_DIMENSION: usize = 2;

/// Tolerance (bpm) for approximate entropy
const APEN_TOLERANCE: f64 = 3.0;

/// Header of the entertainment measurement log
pub const HEADERS: &[&str] = &[
    "avg_hr",
    "var_hr",
    "max_hr",
    "min_hr",
    "diff",
    "autocorrelation",
    "approximate_entropy",
    "time_correlation",
];

/// Entertainment feature vector, in [`HEADERS`] order
pub fn compute_entertainment(hr: &[f64]) -> Result<Vec<f64>, ComputeError> {
    if hr.len() < APEN_DIMENSION + 1 {
        return Err(ComputeError::DataShapeError(format!(
            "entertainment needs at least {} heart rate samples, got {}",
            APEN_DIMENSION + 1,
            hr.len()
        )));
    }

    let n = hr.len() as f64;
    let mean = hr.iter().sum::<f64>() / n;
    let variance = hr.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let max = hr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = hr.iter().copied().fold(f64::INFINITY, f64::min);

    let time: Vec<f64> = (0..hr.len()).map(|i| i as f64).collect();

    Ok(vec![
        mean,
        variance,
        max,
        min,
        max - min,
        lag1_autocorrelation(hr, mean),
        approximate_entropy(hr, APEN_DIMENSION, APEN_TOLERANCE),
        pearson(hr, &time),
    ])
}

/// Lag-1 sample autocorrelation; 0 for a constant series
fn lag1_autocorrelation(values: &[f64], mean: f64) -> f64 {
    let denominator: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
    if denominator == 0.0 {
        return 0.0;
    }
    let numerator: f64 = values
        .windows(2)
        .map(|w| (w[0] - mean) * (w[1] - mean))
        .sum();
    numerator / denominator
}

/// Pearson correlation; 0 when either side is constant
fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x * var_y).sqrt()
}

/// Approximate entropy ApEn(m, r) (Pincus, 1991)
pub fn approximate_entropy(values: &[f64], m: usize, r: f64) -> f64 {
    let phi = |m: usize| -> f64 {
        let count = values.len() - m + 1;
        let templates: Vec<&[f64]> = values.windows(m).collect();
        let log_sum: f64 = templates
            .iter()
            .map(|a| {
                let close = templates
                    .iter()
                    .filter(|b| a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= r))
                    .count();
                (close as f64 / count as f64).ln()
            })
            .sum();
        log_sum / count as f64
    };
    (phi(m + 1) - phi(m)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_features() {
        let features = compute_entertainment(&[60.0, 62.0, 64.0, 66.0]).unwrap();
        assert_eq!(features.len(), HEADERS.len());
        assert_eq!(features[0], 63.0);
        assert_eq!(features[1], 5.0);
        assert_eq!(features[2], 66.0);
        assert_eq!(features[3], 60.0);
        assert_eq!(features[4], 6.0);
        // A straight ramp is perfectly correlated with time
        assert!((features[7] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_lag1_autocorrelation() {
        // deviations -1.5, -0.5, 0.5, 1.5: (0.75 - 0.25 + 0.75) / 5 = 0.25
        let value = lag1_autocorrelation(&[1.0, 2.0, 3.0, 4.0], 2.5);
        assert!((value - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_is_regular() {
        let features = compute_entertainment(&[70.0; 12]).unwrap();
        assert_eq!(features[5], 0.0);
        assert!(features[6].abs() < 1e-12);
        assert_eq!(features[7], 0.0);
    }

    #[test]
    fn test_irregular_series_has_more_entropy() {
        let regular: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 60.0 } else { 70.0 }).collect();
        let irregular: Vec<f64> = (0..40).map(|i| 60.0 + ((i * 37) % 11) as f64 * 2.0).collect();
        assert!(
            approximate_entropy(&irregular, 2, 3.0) > approximate_entropy(&regular, 2, 3.0)
        );
    }

    #[test]
    fn test_too_short() {
        assert!(compute_entertainment(&[70.0, 71.0]).is_err());
    }
}
