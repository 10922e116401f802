//! Engagement from electrodermal activity
//!
//! The EDA window is split into a tonic level (running mean shifted down to
//! touch the signal) and a phasic response. Engagement features are the summed
//! phasic peak amplitude, the number of phasic peaks and the area under the
//! tonic curve.

use crate::error::ComputeError;

/// EDA sampling rate of the wristband (Hz)
pub const EDA_RATE_HZ: f64 = 4.0;

/// Half-width of the running mean kernel, in samples (5 s)
const KERNEL_HALF_WIDTH: usize = 5 * EDA_RATE_HZ as usize;

/// Rise above the running mean (µS) that opens a peak
const ONSET_THRESHOLD: f64 = 0.01;

/// Fall below the running mean (µS) that closes a peak
const OFFSET_THRESHOLD: f64 = 0.0;

/// Header of the engagement measurement log
pub const HEADERS: &[&str] = &["amplitude", "nr_peaks", "auc"];

/// Smallest window the feature extraction accepts
pub const MIN_WINDOW: usize = 2 * KERNEL_HALF_WIDTH + 2;

/// `[phasic amplitude, number of peaks, tonic area under curve]`
pub fn compute_engagement(eda: &[f64]) -> Result<Vec<f64>, ComputeError> {
    if eda.len() < MIN_WINDOW {
        return Err(ComputeError::DataShapeError(format!(
            "engagement needs at least {} EDA samples, got {}",
            MIN_WINDOW,
            eda.len()
        )));
    }

    let running_mean = mean_filter(eda);
    let relevant = &eda[KERNEL_HALF_WIDTH..eda.len() - KERNEL_HALF_WIDTH];

    let deviation: Vec<f64> = relevant
        .iter()
        .zip(&running_mean)
        .map(|(value, mean)| value - mean)
        .collect();
    let lowest = deviation.iter().copied().fold(f64::INFINITY, f64::min);

    let tonic: Vec<f64> = running_mean.iter().map(|m| m - lowest.abs()).collect();
    let phasic: Vec<f64> = relevant.iter().zip(&tonic).map(|(v, t)| v - t).collect();

    let peaks = find_peaks(&deviation);
    let amplitude = peak_amplitude(&peaks, &phasic);
    let count = peaks.iter().filter(|p| p.start).count() as f64;

    Ok(vec![amplitude, count, area_under_curve(&tonic)])
}

/// Centered mean over `2 * KERNEL_HALF_WIDTH + 1` samples, for every sample
/// with a full kernel
fn mean_filter(eda: &[f64]) -> Vec<f64> {
    let width = 2 * KERNEL_HALF_WIDTH + 1;
    eda.windows(width)
        .map(|kernel| kernel.iter().sum::<f64>() / width as f64)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PeakMark {
    start: bool,
    end: bool,
}

fn find_peaks(deviation: &[f64]) -> Vec<PeakMark> {
    let mut marks = vec![PeakMark::default(); deviation.len()];
    let mut rising = false;

    if ONSET_THRESHOLD < deviation[0] && deviation[0] < deviation[1] {
        marks[0].start = true;
        rising = true;
    }

    for i in 0..deviation.len() - 1 {
        let (here, next) = (deviation[i], deviation[i + 1]);
        if !rising && here < ONSET_THRESHOLD && ONSET_THRESHOLD < next {
            marks[i + 1].start = true;
            rising = true;
        } else if rising && here > OFFSET_THRESHOLD && OFFSET_THRESHOLD > next {
            marks[i + 1].end = true;
            rising = false;
        }
    }
    marks
}

/// Sum over peaks of the highest phasic value between onset and offset
fn peak_amplitude(marks: &[PeakMark], phasic: &[f64]) -> f64 {
    let mut amplitude = 0.0;
    for start in (0..marks.len()).filter(|i| marks[*i].start) {
        let end = (start..marks.len())
            .find(|j| marks[*j].end)
            .unwrap_or(marks.len() - 1);
        amplitude += phasic[start..=end]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
    }
    amplitude
}

/// Trapezoidal area under the tonic curve
fn area_under_curve(tonic: &[f64]) -> f64 {
    let dx = 1.0 / EDA_RATE_HZ;
    tonic.windows(2).map(|w| (w[0] + w[1]) / 2.0 * dx).sum()
}
