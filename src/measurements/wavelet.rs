//! Discrete wavelet transform with periodization
//!
//! Only what the load estimator needs: the symlet-16 filter bank, single-band
//! multi-level decomposition (`downcoef`) and the maximum useful level.

use crate::error::ComputeError;

/// Symlet-16 decomposition low-pass filter (least-asymmetric Daubechies, 16 vanishing moments)
pub const SYM16_DEC_LO: [f64; 32] = [
    5.359_038_046_268_959e-6,
    -6.387_996_260_198_792e-6,
    -1.001_485_203_696_570_8e-4,
    8.651_115_502_326_690e-5,
    8.745_695_867_130_958e-4,
    -4.449_474_164_188_862e-4,
    -4.539_916_546_908_660_5e-3,
    8.547_749_494_901_028e-4,
    1.470_215_796_027_932_9e-2,
    5.364_340_248_225_064e-4,
    -2.620_964_925_134_758_6e-2,
    7.986_606_099_498_649e-3,
    1.952_133_907_762_910_2e-2,
    -1.167_338_736_422_570_5e-1,
    -1.188_827_319_973_563_1e-1,
    3.231_022_390_642_956_8e-1,
    7.467_880_503_688_456e-1,
    5.367_441_345_860_742e-1,
    2.999_397_311_013_924e-2,
    -1.048_631_298_774_843_6e-1,
    4.669_417_556_700_702e-2,
    7.766_352_704_546_800e-2,
    -2.993_448_032_045_679_5e-3,
    -2.297_515_288_816_105_7e-2,
    1.633_824_056_274_031_5e-3,
    6.219_665_992_202_444e-3,
    -4.837_833_239_505_696e-4,
    -1.214_622_299_813_356_2e-3,
    1.179_732_112_114_712_3e-4,
    1.635_552_960_721_369_3e-4,
    -1.496_311_761_917_112_7e-5,
    -1.255_290_600_458_805_8e-5,
];

/// Which half of the filter bank a decomposition ends in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Approximation (low-pass) coefficients
    Approximation,
    /// Detail (high-pass) coefficients
    Detail,
}

/// Orthogonal wavelet described by its decomposition filters
#[derive(Debug, Clone)]
pub struct Wavelet {
    dec_lo: Vec<f64>,
    dec_hi: Vec<f64>,
}

impl Wavelet {
    /// Build a wavelet from its low-pass decomposition filter.
    ///
    /// The high-pass filter is the quadrature mirror:
    /// `dec_hi[k] = (-1)^(k+1) * dec_lo[F-1-k]`.
    pub fn from_dec_lo(dec_lo: &[f64]) -> Self {
        let taps = dec_lo.len();
        let dec_hi = (0..taps)
            .map(|k| {
                let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
                sign * dec_lo[taps - 1 - k]
            })
            .collect();
        Self {
            dec_lo: dec_lo.to_vec(),
            dec_hi,
        }
    }

    pub fn sym16() -> Self {
        Self::from_dec_lo(&SYM16_DEC_LO)
    }

    pub fn taps(&self) -> usize {
        self.dec_lo.len()
    }

    /// Deepest level at which a signal of `len` samples still carries
    /// information: `floor(log2(len / (taps - 1)))`, 0 when too short.
    pub fn max_level(&self, len: usize) -> usize {
        let span = self.taps().saturating_sub(1);
        if span == 0 || len < span {
            return 0;
        }
        (len as f64 / span as f64).log2().floor() as usize
    }

    /// One periodized analysis step: (approximation, detail)
    pub fn dwt(&self, signal: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (
            downsample_periodized(signal, &self.dec_lo),
            downsample_periodized(signal, &self.dec_hi),
        )
    }

    /// Coefficients of a single band after `level` decomposition steps.
    ///
    /// The first `level - 1` steps keep the approximation; the final step
    /// keeps the requested band.
    pub fn downcoef(&self, band: Band, signal: &[f64], level: usize) -> Result<Vec<f64>, ComputeError> {
        if level == 0 {
            return Err(ComputeError::DataShapeError(
                "decomposition level must be at least 1".to_string(),
            ));
        }
        if signal.is_empty() {
            return Err(ComputeError::DataShapeError(
                "cannot decompose an empty signal".to_string(),
            ));
        }

        let mut approximation = signal.to_vec();
        for _ in 1..level {
            approximation = downsample_periodized(&approximation, &self.dec_lo);
        }

        let filter = match band {
            Band::Approximation => &self.dec_lo,
            Band::Detail => &self.dec_hi,
        };
        Ok(downsample_periodized(&approximation, filter))
    }
}

/// Convolve with `filter` and keep every second sample, treating the signal
/// as periodic. Odd-length signals are padded by repeating the last sample.
fn downsample_periodized(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let mut padded = signal.to_vec();
    if padded.len() % 2 == 1 {
        if let Some(last) = padded.last().copied() {
            padded.push(last);
        }
    }

    let period = padded.len() as isize;
    let offset = (filter.len() / 2) as isize;

    (0..padded.len() / 2)
        .map(|o| {
            let centre = offset + 2 * o as isize;
            filter
                .iter()
                .enumerate()
                .map(|(j, tap)| tap * padded[(centre - j as isize).rem_euclid(period) as usize])
                .sum()
        })
        .collect()
}
