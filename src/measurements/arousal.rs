//! Arousal from electrodermal activity
//!
//! EDA positive change: the sum of every rise between successive samples in
//! the window (Leiner, Fahr & Früh, 2012).

/// Header of the arousal measurement log
pub const HEADERS: &[&str] = &[];

pub fn compute_arousal(eda: &[f64]) -> f64 {
    eda.windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|change| *change > 0.0)
        .sum()
}
