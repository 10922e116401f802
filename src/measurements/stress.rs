//! Acute stress from skin temperature
//!
//! Peripheral temperature drops under acute stress, so the index is the
//! negated least-squares slope of temperature over time.

use crate::error::ComputeError;

/// Skin temperature sampling rate of the wristband (Hz)
pub const TEMPERATURE_RATE_HZ: f64 = 4.0;

/// Header of the stress measurement log
pub const HEADERS: &[&str] = &[];

/// Negated temperature slope in degrees per second
pub fn compute_stress(temperatures: &[f64]) -> Result<f64, ComputeError> {
    if temperatures.len() < 2 {
        return Err(ComputeError::DataShapeError(format!(
            "stress needs at least 2 temperature samples, got {}",
            temperatures.len()
        )));
    }

    let n = temperatures.len() as f64;
    let times: Vec<f64> = (0..temperatures.len())
        .map(|i| i as f64 / TEMPERATURE_RATE_HZ)
        .collect();
    let mean_t = times.iter().sum::<f64>() / n;
    let mean_y = temperatures.iter().sum::<f64>() / n;

    let (covariance, spread) = times
        .iter()
        .zip(temperatures)
        .fold((0.0, 0.0), |(cov, var), (t, y)| {
            (cov + (t - mean_t) * (y - mean_y), var + (t - mean_t).powi(2))
        });

    Ok(-(covariance / spread))
}
