//! Baseline management
//!
//! A baseline is computed once, from the first `baseline_length` measurements a
//! handler produces, and is immutable afterwards. Later measurements are
//! interpreted relative to it.

use crate::error::ComputeError;
use crate::types::Measurement;
use serde::{Deserialize, Serialize};

/// Per-feature reference values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// One reference value per feature
    values: Vec<f64>,
    /// Whether the baseline was built from scalar measurements
    scalar: bool,
    /// Number of measurements averaged
    measurements_used: usize,
}

impl Baseline {
    /// Compute a baseline from baseline-phase measurements.
    ///
    /// Scalar measurements use the arithmetic mean; vector measurements use the
    /// per-feature mean of magnitudes.
    pub fn from_measurements(measurements: &[Measurement]) -> Result<Self, ComputeError> {
        let first = measurements.first().ok_or_else(|| {
            ComputeError::DataShapeError("baseline needs at least one measurement".to_string())
        })?;

        let width = first.len();
        let scalar = first.is_scalar();
        if width == 0 {
            return Err(ComputeError::DataShapeError(
                "baseline measurements have no features".to_string(),
            ));
        }
        if let Some(odd) = measurements
            .iter()
            .find(|m| m.len() != width || m.is_scalar() != scalar)
        {
            return Err(ComputeError::DataShapeError(format!(
                "baseline measurements disagree in shape: expected {} features, got {}",
                width,
                odd.len()
            )));
        }

        let count = measurements.len() as f64;
        let values = (0..width)
            .map(|feature| {
                let sum: f64 = measurements
                    .iter()
                    .map(|m| {
                        let value = m.features()[feature];
                        if scalar {
                            value
                        } else {
                            value.abs()
                        }
                    })
                    .sum();
                sum / count
            })
            .collect();

        Ok(Self {
            values,
            scalar,
            measurements_used: measurements.len(),
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar
    }

    pub fn feature_count(&self) -> usize {
        self.values.len()
    }

    pub fn measurements_used(&self) -> usize {
        self.measurements_used
    }
}

/// Collects baseline-phase measurements until the target count is reached
#[derive(Debug, Clone)]
pub struct BaselineAccumulator {
    target: usize,
    measurements: Vec<Measurement>,
}

impl BaselineAccumulator {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            measurements: Vec::with_capacity(target),
        }
    }

    /// Store a measurement; returns the baseline once `target` measurements exist.
    ///
    /// A measurement whose shape differs from the first one is rejected and not stored.
    pub fn push(&mut self, measurement: Measurement) -> Result<Option<Baseline>, ComputeError> {
        if let Some(first) = self.measurements.first() {
            if first.len() != measurement.len() || first.is_scalar() != measurement.is_scalar() {
                return Err(ComputeError::DataShapeError(format!(
                    "baseline measurement has {} features, expected {}",
                    measurement.len(),
                    first.len()
                )));
            }
        }
        self.measurements.push(measurement);
        if self.measurements.len() < self.target {
            return Ok(None);
        }
        Baseline::from_measurements(&self.measurements).map(Some)
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalar_baseline_is_arithmetic_mean() {
        let baseline =
            Baseline::from_measurements(&[Measurement::Scalar(1.0), Measurement::Scalar(2.0)])
                .unwrap();
        assert_eq!(baseline.values(), &[1.5]);
        assert!(baseline.is_scalar());
        assert_eq!(baseline.measurements_used(), 2);
    }

    #[test]
    fn test_vector_baseline_uses_magnitudes() {
        let baseline = Baseline::from_measurements(&[
            Measurement::Vector(vec![-2.0, 4.0]),
            Measurement::Vector(vec![4.0, -8.0]),
        ])
        .unwrap();
        assert_eq!(baseline.values(), &[3.0, 6.0]);
        assert!(!baseline.is_scalar());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = Baseline::from_measurements(&[
            Measurement::Vector(vec![1.0, 2.0]),
            Measurement::Vector(vec![1.0]),
        ]);
        assert!(matches!(result, Err(ComputeError::DataShapeError(_))));
    }

    #[test]
    fn test_accumulator_completes_at_target() {
        let mut accumulator = BaselineAccumulator::new(3);
        assert!(accumulator.push(1.0.into()).unwrap().is_none());
        assert!(accumulator.push(2.0.into()).unwrap().is_none());
        let baseline = accumulator.push(6.0.into()).unwrap().unwrap();
        assert_eq!(baseline.values(), &[3.0]);
        assert_eq!(accumulator.len(), 3);
    }

    #[test]
    fn test_accumulator_rejects_shape_change() {
        let mut accumulator = BaselineAccumulator::new(3);
        accumulator.push(Measurement::Vector(vec![1.0, 2.0])).unwrap();
        let result = accumulator.push(Measurement::Vector(vec![1.0]));
        assert!(result.is_err());
        assert_eq!(accumulator.len(), 1);
    }
}
