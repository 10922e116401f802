//! Emotional regulation from inter-beat intervals
//!
//! Three heart-rate-variability features: RMSSD, the share of successive
//! intervals differing by more than 50 ms, and the mean of the "normal"
//! intervals between the 10th and 90th percentile.

use crate::error::ComputeError;

/// Successive IBI differences above this many seconds count as differing
const DIFFERENCE_THRESHOLD_S: f64 = 0.05;

/// Lower bound on the differing share, keeps the baseline nonzero
const MIN_DIFFERING_SHARE: f64 = 0.01;

/// Header of the emotional regulation measurement log
pub const HEADERS: &[&str] = &["rmssd", "percentage_that_differ", "mean_normal_ibi"];

/// `[rmssd, differing share, mean normal IBI]` of an IBI window (seconds)
pub fn compute_emotional_regulation(ibi: &[f64]) -> Result<Vec<f64>, ComputeError> {
    if ibi.len() <= 2 {
        return Err(ComputeError::DataShapeError(format!(
            "emotional regulation needs more than 2 inter-beat intervals, got {}",
            ibi.len()
        )));
    }

    Ok(vec![rmssd(ibi), differing_share(ibi), mean_normal_ibi(ibi)])
}

/// Root mean square of successive differences
pub fn rmssd(ibi: &[f64]) -> f64 {
    let squares: f64 = ibi.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (squares / (ibi.len() - 1) as f64).sqrt()
}

fn differing_share(ibi: &[f64]) -> f64 {
    let differing = ibi
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > DIFFERENCE_THRESHOLD_S)
        .count();
    (differing as f64 / (ibi.len() - 1) as f64).max(MIN_DIFFERING_SHARE)
}

/// Mean of the intervals strictly inside the 10th..90th percentile band.
///
/// Falls back to the mean of all intervals when the band is empty.
fn mean_normal_ibi(ibi: &[f64]) -> f64 {
    let low = percentile(ibi, 10.0);
    let high = percentile(ibi, 90.0);
    let normal: Vec<f64> = ibi.iter().copied().filter(|v| low < *v && *v < high).collect();
    let values = if normal.is_empty() { ibi } else { &normal };
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentile with linear interpolation between closest ranks
pub(crate) fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (sorted.len() - 1) as f64 * q / 100.0;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    sorted[below] + (sorted[above] - sorted[below]) * (rank - below as f64)
}
