//! Window measurement functions
//!
//! Pure functions from one ready window to a scalar or vector measurement.
//! The pupil-based load index drives forecasting; the wristband measures are
//! logged alongside it.

pub mod arousal;
pub mod cognitive_load;
pub mod emotional_regulation;
pub mod engagement;
pub mod entertainment;
pub mod stress;
pub mod wavelet;

pub use arousal::compute_arousal;
pub use cognitive_load::{compute_cognitive_load, LoadEstimator};
pub use emotional_regulation::compute_emotional_regulation;
pub use engagement::compute_engagement;
pub use entertainment::compute_entertainment;
pub use stress::compute_stress;

use crate::error::ComputeError;
use crate::handler::MeasurementFn;
use crate::types::{channels, Measurement};
use crate::window::ChannelWindows;
use serde::{Deserialize, Serialize};

/// Measurements computed from a single wristband channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WristbandMeasure {
    Arousal,
    Stress,
    EmotionalRegulation,
    Engagement,
    Entertainment,
}

impl WristbandMeasure {
    pub const ALL: [WristbandMeasure; 5] = [
        WristbandMeasure::Arousal,
        WristbandMeasure::Stress,
        WristbandMeasure::EmotionalRegulation,
        WristbandMeasure::Engagement,
        WristbandMeasure::Entertainment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WristbandMeasure::Arousal => "arousal",
            WristbandMeasure::Stress => "stress",
            WristbandMeasure::EmotionalRegulation => "emotional_regulation",
            WristbandMeasure::Engagement => "engagement",
            WristbandMeasure::Entertainment => "entertainment",
        }
    }

    /// Channel (and dispatch stream) the measure reads
    pub fn channel(&self) -> &'static str {
        match self {
            WristbandMeasure::Arousal | WristbandMeasure::Engagement => channels::EDA,
            WristbandMeasure::Stress => channels::SKIN_TEMPERATURE,
            WristbandMeasure::EmotionalRegulation => channels::IBI,
            WristbandMeasure::Entertainment => channels::HEART_RATE,
        }
    }

    /// Extra measurement-log columns after `time,value`
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            WristbandMeasure::Arousal => arousal::HEADERS,
            WristbandMeasure::Stress => stress::HEADERS,
            WristbandMeasure::EmotionalRegulation => emotional_regulation::HEADERS,
            WristbandMeasure::Engagement => engagement::HEADERS,
            WristbandMeasure::Entertainment => entertainment::HEADERS,
        }
    }

    pub fn compute(&self, window: &[f64]) -> Result<Measurement, ComputeError> {
        Ok(match self {
            WristbandMeasure::Arousal => Measurement::Scalar(compute_arousal(window)),
            WristbandMeasure::Stress => Measurement::Scalar(compute_stress(window)?),
            WristbandMeasure::EmotionalRegulation => {
                Measurement::Vector(compute_emotional_regulation(window)?)
            }
            WristbandMeasure::Engagement => Measurement::Vector(compute_engagement(window)?),
            WristbandMeasure::Entertainment => Measurement::Vector(compute_entertainment(window)?),
        })
    }
}

impl MeasurementFn for WristbandMeasure {
    fn measure(&self, windows: &ChannelWindows) -> Result<Measurement, ComputeError> {
        self.compute(&windows.require(self.channel())?)
    }
}
