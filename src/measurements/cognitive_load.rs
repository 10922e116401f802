//! Cognitive load index (LHIPA)
//!
//! Low/High Index of Pupillary Activity: the pupil diameter signal is
//! decomposed with a symlet-16 wavelet, the ratio of low-band to high-band
//! detail coefficients is scanned for modulus maxima, and the maxima that
//! survive a universal threshold are counted per second of signal.
//!
//! Duchowski et al., "The Low/High Index of Pupillary Activity", CHI 2020.

use super::wavelet::{Band, Wavelet};
use crate::error::ComputeError;
use crate::handler::MeasurementFn;
use crate::types::{channels, Measurement};
use crate::window::ChannelWindows;

/// Header of the cognitive load measurement log
pub const HEADERS: &[&str] = &[];

/// High-frequency decomposition level
const HIGH_LEVEL: usize = 1;

/// High-band coefficients below this fraction of the signal scale count as zero
const ZERO_COEFFICIENT_RATIO: f64 = 1e-9;

/// Load index of a pair of pupil-diameter windows sampled at `sampling_rate_hz`.
///
/// Returns modulus-maxima events per second; 0 for a signal without detail
/// energy.
pub fn compute_cognitive_load(
    left: &[f64],
    right: &[f64],
    sampling_rate_hz: f64,
) -> Result<f64, ComputeError> {
    if left.len() != right.len() {
        return Err(ComputeError::DataShapeError(format!(
            "pupil channels differ in length: {} vs {}",
            left.len(),
            right.len()
        )));
    }
    if !(sampling_rate_hz.is_finite() && sampling_rate_hz > 0.0) {
        return Err(ComputeError::ConfigurationError(format!(
            "sampling rate must be positive, got {}",
            sampling_rate_hz
        )));
    }

    let signal: Vec<f64> = left
        .iter()
        .zip(right)
        .map(|(l, r)| (l + r) / 2.0)
        .collect();
    let duration = signal.len() as f64 / sampling_rate_hz;

    lhipa(&signal, duration)
}

/// LHIPA of an already fused signal lasting `duration` seconds
pub fn lhipa(signal: &[f64], duration: f64) -> Result<f64, ComputeError> {
    let wavelet = Wavelet::sym16();
    let max_level = wavelet.max_level(signal.len());
    if max_level < 1 {
        return Err(ComputeError::DataShapeError(format!(
            "{} samples are too few for a symlet-16 decomposition (need at least {})",
            signal.len(),
            2 * (wavelet.taps() - 1)
        )));
    }

    let low_level = (max_level / 2).max(HIGH_LEVEL);

    let high = normalized_detail(&wavelet, signal, HIGH_LEVEL)?;
    let low = normalized_detail(&wavelet, signal, low_level)?;

    let scale = signal.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    let zero_cutoff = scale * ZERO_COEFFICIENT_RATIO;
    let stride = 1usize << (low_level - HIGH_LEVEL);

    let ratio = low
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let h = high.get(stride * i).copied().ok_or_else(|| {
                ComputeError::DataShapeError(format!(
                    "high band has {} coefficients, index {} requested",
                    high.len(),
                    stride * i
                ))
            })?;
            Ok(if h.abs() <= zero_cutoff { 0.0 } else { l / h })
        })
        .collect::<Result<Vec<f64>, ComputeError>>()?;

    let maxima = modulus_maxima(&ratio);
    Ok(count_above_universal_threshold(&maxima) as f64 / duration)
}

fn normalized_detail(wavelet: &Wavelet, signal: &[f64], level: usize) -> Result<Vec<f64>, ComputeError> {
    let norm = (2.0_f64.powi(level as i32)).sqrt();
    Ok(wavelet
        .downcoef(Band::Detail, signal, level)?
        .into_iter()
        .map(|c| c / norm)
        .collect())
}

/// Keep the magnitude of every local modulus maximum, zero elsewhere.
///
/// A maximum is at least as large as both neighbours and strictly larger than
/// one of them. Edge samples use themselves as the missing neighbour.
pub(crate) fn modulus_maxima(series: &[f64]) -> Vec<f64> {
    let modulus: Vec<f64> = series.iter().map(|x| x.abs()).collect();
    let last = modulus.len().saturating_sub(1);

    (0..modulus.len())
        .map(|i| {
            let here = modulus[i];
            let left = if i > 0 { modulus[i - 1] } else { here };
            let right = if i < last { modulus[i + 1] } else { here };
            if left <= here && here >= right && (left < here || here > right) {
                here
            } else {
                0.0
            }
        })
        .collect()
}

/// Nonzero maxima with magnitude at or above `σ · sqrt(2 · log2(n))`
pub(crate) fn count_above_universal_threshold(maxima: &[f64]) -> usize {
    if maxima.is_empty() {
        return 0;
    }
    let n = maxima.len() as f64;
    let mean = maxima.iter().sum::<f64>() / n;
    let variance = maxima.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let threshold = variance.sqrt() * (2.0 * n.log2()).sqrt();

    maxima
        .iter()
        .filter(|m| m.abs() > 0.0 && m.abs() >= threshold)
        .count()
}

/// Load estimator over the left/right pupil channels, for use as a handler
/// measurement function
#[derive(Debug, Clone, Copy)]
pub struct LoadEstimator {
    pub sampling_rate_hz: f64,
}

impl LoadEstimator {
    pub fn new(sampling_rate_hz: f64) -> Self {
        Self { sampling_rate_hz }
    }

    /// Channels the estimator reads
    pub fn channels() -> [&'static str; 2] {
        [channels::LEFT_PUPIL, channels::RIGHT_PUPIL]
    }
}

impl MeasurementFn for LoadEstimator {
    fn measure(&self, windows: &ChannelWindows) -> Result<Measurement, ComputeError> {
        let left = windows.require(channels::LEFT_PUPIL)?;
        let right = windows.require(channels::RIGHT_PUPIL)?;
        compute_cognitive_load(&left, &right, self.sampling_rate_hz).map(Measurement::Scalar)
    }
}
