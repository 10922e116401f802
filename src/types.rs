//! Core types for the cogload-flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw samples, window measurements, measurement log rows, and the
//! per-tick forecast records published to the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Well-known channel names used by the acquisition layers
pub mod channels {
    /// Left pupil diameter (mm)
    pub const LEFT_PUPIL: &str = "lpup";
    /// Right pupil diameter (mm)
    pub const RIGHT_PUPIL: &str = "rpup";
    /// Electrodermal activity (µS)
    pub const EDA: &str = "EDA";
    /// Heart rate (bpm)
    pub const HEART_RATE: &str = "HR";
    /// Inter-beat interval (s)
    pub const IBI: &str = "IBI";
    /// Skin temperature (°C)
    pub const SKIN_TEMPERATURE: &str = "TEMP";
    /// Fixation centre, horizontal (px)
    pub const FIXATION_X: &str = "fx";
    /// Fixation centre, vertical (px)
    pub const FIXATION_Y: &str = "fy";
    /// Fixation duration (ms)
    pub const FIXATION_DURATION: &str = "fixation_ms";
}

/// A timestamped set of named scalar readings pushed by an acquisition layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the readings were taken (UTC)
    pub timestamp: DateTime<Utc>,
    /// Channel name to reading
    pub readings: BTreeMap<String, f64>,
}

impl Sample {
    /// Create an empty sample at the given time
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            readings: BTreeMap::new(),
        }
    }

    /// Create a single-channel sample
    pub fn scalar(channel: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp).with(channel, value)
    }

    /// Add a reading, replacing any previous value for the channel
    pub fn with(mut self, channel: impl Into<String>, value: f64) -> Self {
        self.readings.insert(channel.into(), value);
        self
    }

    pub fn get(&self, channel: &str) -> Option<f64> {
        self.readings.get(channel).copied()
    }
}

/// Result of applying a measurement function to one ready window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Measurement {
    /// Feature view: a scalar is a one-element feature vector
    pub fn features(&self) -> &[f64] {
        match self {
            Measurement::Scalar(value) => std::slice::from_ref(value),
            Measurement::Vector(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.features().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features().is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Measurement::Scalar(_))
    }

    pub fn is_finite(&self) -> bool {
        self.features().iter().all(|v| v.is_finite())
    }
}

impl From<f64> for Measurement {
    fn from(value: f64) -> Self {
        Measurement::Scalar(value)
    }
}

impl From<Vec<f64>> for Measurement {
    fn from(values: Vec<f64>) -> Self {
        Measurement::Vector(values)
    }
}

/// Lifecycle phase of a windowed measurement handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Windows have never been full
    Uninitialized,
    /// Collecting measurements for the baseline
    BaselinePhase,
    /// Baseline fixed; measurements are normalized and emitted (terminal)
    SteadyState,
}

/// One emitted measurement, as written to the measurement log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    /// Time of the sample that completed the window
    pub timestamp: DateTime<Utc>,
    /// Normalized value (raw value when baseline calculation is disabled)
    pub value: f64,
    /// Raw per-feature values for vector measurements, empty for scalars
    pub features: Vec<f64>,
}

/// Per-tick forecast record handed to the transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// Session this record belongs to
    pub session_id: Uuid,
    /// Number of observations fed to the predictor so far
    pub tick: u64,
    /// Time of the observation
    pub timestamp: DateTime<Utc>,
    /// Current observation (raw scale)
    pub observation: f64,
    /// Current observation as a z-score against the calibration window
    pub standardized_observation: f64,
    /// Combined ARMA+GARCH forecast for the next `forecast_length` ticks
    pub forecast: Vec<f64>,
    /// Consensus forecast for this tick from earlier overlapping forecasts
    pub consensus_forecast: f64,
    /// |standardized_observation - consensus_forecast|
    pub absolute_error: f64,
    /// High-load flag
    pub is_outlier: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_measurement_features() {
        let m = Measurement::from(3.0);
        assert_eq!(m.features(), &[3.0]);
        assert!(m.is_scalar());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_measurement_untagged_serde() {
        let scalar: Measurement = serde_json::from_str("1.5").unwrap();
        assert_eq!(scalar, Measurement::Scalar(1.5));

        let vector: Measurement = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(vector, Measurement::Vector(vec![1.0, 2.0]));
    }

    #[test]
    fn test_sample_builder() {
        let sample = Sample::scalar(channels::LEFT_PUPIL, 3.2, Utc::now()).with(channels::RIGHT_PUPIL, 3.4);
        assert_eq!(sample.get("lpup"), Some(3.2));
        assert_eq!(sample.get("rpup"), Some(3.4));
        assert_eq!(sample.get("EDA"), None);
    }
}
