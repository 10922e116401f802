//! Measurement normalization
//!
//! Steady-state measurements are reported relative to the handler's baseline:
//! - Scalars: `measurement / baseline`
//! - Vectors: inner product with the elementwise reciprocal of the baseline,
//!   divided by the feature count

use crate::baseline::Baseline;
use crate::error::ComputeError;
use crate::types::Measurement;

/// Normalizer for converting raw measurements to baseline-relative values
pub struct Normalizer;

impl Normalizer {
    /// Normalize a measurement against a baseline
    pub fn normalize(measurement: &Measurement, baseline: &Baseline) -> Result<f64, ComputeError> {
        let features = measurement.features();
        let reference = baseline.values();

        if features.len() != reference.len() {
            return Err(ComputeError::DataShapeError(format!(
                "measurement has {} features but the baseline has {}",
                features.len(),
                reference.len()
            )));
        }

        if let Some(index) = reference
            .iter()
            .position(|value| *value == 0.0 || !value.is_finite())
        {
            return Err(ComputeError::NormalizationError(format!(
                "baseline feature {} is {}, cannot normalize",
                index, reference[index]
            )));
        }

        if measurement.is_scalar() {
            return Ok(features[0] / reference[0]);
        }

        let dot: f64 = features
            .iter()
            .zip(reference)
            .map(|(value, base)| value * base.recip())
            .sum();
        Ok(dot / reference.len() as f64)
    }

    /// Value reported when baseline calculation is disabled.
    ///
    /// Equivalent to normalizing against a baseline of ones: the scalar itself,
    /// or the feature mean of a vector.
    pub fn raw(measurement: &Measurement) -> f64 {
        let features = measurement.features();
        if features.is_empty() {
            return 0.0;
        }
        features.iter().sum::<f64>() / features.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_baseline(value: f64) -> Baseline {
        Baseline::from_measurements(&[Measurement::Scalar(value)]).unwrap()
    }

    #[test]
    fn test_scalar_ratio() {
        let baseline = scalar_baseline(1.5);
        let normalized = Normalizer::normalize(&Measurement::Scalar(3.0), &baseline).unwrap();
        assert!((normalized - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_vector_reciprocal_inner_product() {
        let baseline = Baseline::from_measurements(&[Measurement::Vector(vec![2.0, 4.0])]).unwrap();
        // (4/2 + 2/4) / 2 = 1.25
        let normalized =
            Normalizer::normalize(&Measurement::Vector(vec![4.0, 2.0]), &baseline).unwrap();
        assert!((normalized - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_zero_baseline_rejected() {
        let baseline = scalar_baseline(0.0);
        let result = Normalizer::normalize(&Measurement::Scalar(1.0), &baseline);
        assert!(matches!(result, Err(ComputeError::NormalizationError(_))));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let baseline = scalar_baseline(1.0);
        let result = Normalizer::normalize(&Measurement::Vector(vec![1.0, 2.0]), &baseline);
        assert!(matches!(result, Err(ComputeError::DataShapeError(_))));
    }

    #[test]
    fn test_raw_value() {
        assert_eq!(Normalizer::raw(&Measurement::Scalar(0.7)), 0.7);
        assert_eq!(Normalizer::raw(&Measurement::Vector(vec![1.0, 3.0])), 2.0);
    }
}
