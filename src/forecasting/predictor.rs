//! Forecast orchestration
//!
//! The predictor calibrates a fixed mean and standard deviation from the first
//! measurements, then for every new observation:
//!
//! 1. standardizes it and appends it to the standardized series
//! 2. refits ARMA on the most recent `history_used_in_forecasting` points
//! 3. refits GARCH on the ARMA residuals
//! 4. combines both into one forecast vector and flags outliers
//! 5. scores the observation against the consensus of earlier forecasts
//!
//! A tick whose fit fails still advances the series and the consensus matrix,
//! so both stay aligned with the observations.

use super::arma::ArmaModel;
use super::consensus::{Backtest, ConsensusEngine};
use super::garch::GarchModel;
use crate::config::ForecastConfig;
use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of one `update_and_predict` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorTick {
    pub standardized_observation: f64,
    pub forecast: Vec<f64>,
    pub consensus_forecast: f64,
    pub absolute_error: f64,
    pub is_outlier: bool,
}

/// Online ARMA+GARCH predictor over a standardized series
#[derive(Debug, Clone)]
pub struct Predictor {
    config: ForecastConfig,
    mean_initial: f64,
    std_initial: f64,
    standardized: Vec<f64>,
    arma: ArmaModel,
    garch: GarchModel,
    consensus: ConsensusEngine,
    current_forecast: Vec<f64>,
    is_outlier: bool,
    last_backtest: Option<Backtest>,
    /// Forecasts issued, including the first one made at construction
    forecasts_issued: u64,
}

impl Predictor {
    /// Calibrate on `calibration`, fit both models and issue the first forecast
    pub fn new(calibration: &[f64], config: &ForecastConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        if calibration.len() < 2 {
            return Err(ComputeError::DataShapeError(format!(
                "calibration needs at least 2 observations, got {}",
                calibration.len()
            )));
        }
        if calibration.iter().any(|x| !x.is_finite()) {
            return Err(ComputeError::DataShapeError(
                "calibration contains non-finite values".to_string(),
            ));
        }

        let n = calibration.len() as f64;
        let mean_initial = calibration.iter().sum::<f64>() / n;
        let std_initial =
            (calibration.iter().map(|x| (x - mean_initial).powi(2)).sum::<f64>() / n).sqrt();
        if std_initial == 0.0 || !std_initial.is_finite() {
            return Err(ComputeError::NormalizationError(
                "calibration data has zero spread".to_string(),
            ));
        }

        let mut standardized: Vec<f64> = calibration
            .iter()
            .map(|x| (x - mean_initial) / std_initial)
            .collect();

        let history = tail(&standardized, config.history_used_in_forecasting);
        let arma = ArmaModel::new(history, config)?;
        let garch = GarchModel::new(arma.residuals(), config)?;
        let retention = retained_observations(config);
        let consensus =
            ConsensusEngine::new(config.forecast_length, &standardized)?.with_retention(retention);
        trim_front(&mut standardized, retention);

        info!(
            mean = mean_initial,
            std = std_initial,
            observations = calibration.len(),
            arma_order = %arma.order(),
            garch_order = %garch.order(),
            "predictor calibrated"
        );

        let mut predictor = Self {
            config: config.clone(),
            mean_initial,
            std_initial,
            standardized,
            arma,
            garch,
            consensus,
            current_forecast: Vec::new(),
            is_outlier: false,
            last_backtest: None,
            forecasts_issued: 0,
        };
        predictor.first_forecast()?;
        Ok(predictor)
    }

    fn first_forecast(&mut self) -> Result<(), ComputeError> {
        let forecast = self.combined_forecast()?;
        let latest = self.standardized.last().copied().unwrap_or(0.0);
        self.is_outlier = self.flags_outlier(&forecast, latest);
        self.consensus.push_forecast(&forecast)?;
        self.current_forecast = forecast;
        self.forecasts_issued = 1;
        Ok(())
    }

    /// Z-score of a raw value against the calibration window
    pub fn standardize(&self, value: f64) -> f64 {
        (value - self.mean_initial) / self.std_initial
    }

    /// Feed one raw observation.
    ///
    /// Non-finite observations and standardized values beyond
    /// `max_standardized_magnitude` are rejected without touching any state.
    ///
    /// Otherwise the observation is appended to the standardized series and
    /// scored against the consensus. When a model fit fails the consensus
    /// matrix shifts with an empty row, the error is returned, and the
    /// forecast and outlier flag keep their previous values.
    pub fn update_and_predict(&mut self, observation: f64) -> Result<PredictorTick, ComputeError> {
        if !observation.is_finite() {
            return Err(ComputeError::DataShapeError(format!(
                "observation {} is not finite",
                observation
            )));
        }

        let standardized = self.standardize(observation);
        if !standardized.is_finite() || standardized.abs() > self.config.max_standardized_magnitude {
            return Err(ComputeError::DataShapeError(format!(
                "observation {} is {} standard deviations from the calibration mean (limit {})",
                observation,
                standardized.abs(),
                self.config.max_standardized_magnitude
            )));
        }

        self.standardized.push(standardized);
        trim_front(&mut self.standardized, retained_observations(&self.config));

        let forecast = match self.combined_forecast() {
            Ok(forecast) => forecast,
            Err(err) => {
                let backtest = self.consensus.observe_without_forecast(standardized);
                self.last_backtest = Some(backtest);
                debug!(error = %err, consensus = backtest.consensus, "no forecast issued this tick");
                return Err(err);
            }
        };
        let is_outlier = self.flags_outlier(&forecast, standardized);
        let backtest = self.consensus.observe(standardized, &forecast)?;

        self.current_forecast = forecast;
        self.is_outlier = is_outlier;
        self.last_backtest = Some(backtest);
        self.forecasts_issued += 1;

        Ok(PredictorTick {
            standardized_observation: standardized,
            forecast: self.current_forecast.clone(),
            consensus_forecast: backtest.consensus,
            absolute_error: backtest.absolute_error,
            is_outlier,
        })
    }

    /// ARMA level forecast shifted by the GARCH mean forecast of its residuals
    fn combined_forecast(&mut self) -> Result<Vec<f64>, ComputeError> {
        let history = tail(&self.standardized, self.config.history_used_in_forecasting);
        let level = self.arma.update_and_predict(history)?;
        let shift = self.garch.update_and_predict(self.arma.residuals())?;
        Ok(level.into_iter().map(|value| value + shift).collect())
    }

    fn flags_outlier(&self, forecast: &[f64], standardized: f64) -> bool {
        let threshold = self.config.outlier_threshold;
        forecast.iter().any(|f| f.abs() >= threshold) || standardized.abs() >= threshold
    }

    /// Combined forecast issued by the latest call
    pub fn current_forecast(&self) -> &[f64] {
        &self.current_forecast
    }

    pub fn is_outlier(&self) -> bool {
        self.is_outlier
    }

    pub fn last_backtest(&self) -> Option<Backtest> {
        self.last_backtest
    }

    pub fn mean_initial(&self) -> f64 {
        self.mean_initial
    }

    pub fn std_initial(&self) -> f64 {
        self.std_initial
    }

    /// Calibration window followed by every observation, standardized.
    ///
    /// Holds at most `max(history_used_in_forecasting, observations_to_plot)`
    /// of the most recent values.
    pub fn standardized_series(&self) -> &[f64] {
        &self.standardized
    }

    pub fn forecasts_issued(&self) -> u64 {
        self.forecasts_issued
    }

    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    pub fn arma(&self) -> &ArmaModel {
        &self.arma
    }

    pub fn garch(&self) -> &GarchModel {
        &self.garch
    }

    /// GARCH conditional standard deviation forecast of the latest call
    pub fn volatility_forecast(&self) -> &[f64] {
        self.garch.volatility_forecast()
    }

    /// Most recent standardized observations kept for display
    pub fn observation_window(&self) -> &[f64] {
        tail(&self.standardized, self.config.observations_to_plot)
    }

    /// Most recent consensus forecasts kept for display
    pub fn average_forecast_window(&self) -> &[f64] {
        tail(self.consensus.average_forecasts(), self.config.observations_to_plot)
    }

    /// Most recent absolute errors kept for display
    pub fn error_window(&self) -> &[f64] {
        tail(self.consensus.errors(), self.config.observations_to_plot)
    }

    pub fn mean_absolute_error(&self) -> Option<f64> {
        self.consensus.mean_absolute_error()
    }
}

fn tail(values: &[f64], length: usize) -> &[f64] {
    &values[values.len().saturating_sub(length)..]
}

fn trim_front(values: &mut Vec<f64>, length: usize) {
    if values.len() > length {
        values.drain(..values.len() - length);
    }
}

/// Observations any consumer of the series looks back over
fn retained_observations(config: &ForecastConfig) -> usize {
    config
        .history_used_in_forecasting
        .max(config.observations_to_plot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Mean 5, population standard deviation 1
    const CALIBRATION: [f64; 10] = [3.5, 5.5, 6.0, 4.0, 5.5, 6.5, 4.0, 6.0, 4.0, 5.0];

    fn make_config() -> ForecastConfig {
        ForecastConfig {
            order_max: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_calibration_statistics() {
        let predictor = Predictor::new(&CALIBRATION, &make_config()).unwrap();
        assert_eq!(predictor.mean_initial(), 5.0);
        assert_eq!(predictor.std_initial(), 1.0);
        assert_eq!(predictor.standardized_series()[0], -1.5);
        assert_eq!(predictor.forecasts_issued(), 1);
        assert_eq!(predictor.current_forecast().len(), 10);
        assert_eq!(predictor.consensus().forecasts_stored(), 1);
    }

    #[test]
    fn test_standardization_and_outlier_flag() {
        let mut predictor = Predictor::new(&CALIBRATION, &make_config()).unwrap();

        let tick = predictor.update_and_predict(5.0).unwrap();
        assert_eq!(tick.standardized_observation, 0.0);
        assert_eq!(tick.forecast.len(), 10);

        let tick = predictor.update_and_predict(7.0).unwrap();
        assert_eq!(tick.standardized_observation, 2.0);
        assert!(tick.is_outlier);
        assert!(predictor.is_outlier());
    }

    #[test]
    fn test_negative_excursion_is_outlier() {
        let mut predictor = Predictor::new(&CALIBRATION, &make_config()).unwrap();
        let tick = predictor.update_and_predict(2.5).unwrap();
        assert_eq!(tick.standardized_observation, -2.5);
        assert!(tick.is_outlier);
    }

    #[test]
    fn test_backtest_uses_previous_forecast() {
        let mut predictor = Predictor::new(&CALIBRATION, &make_config()).unwrap();
        let first_step = predictor.current_forecast()[0];

        let tick = predictor.update_and_predict(5.5).unwrap();
        assert_eq!(tick.consensus_forecast, first_step);
        assert_eq!(tick.absolute_error, (0.5 - first_step).abs());
        assert_eq!(predictor.consensus().errors().len(), 1);
        assert_eq!(predictor.consensus().average_forecasts().len(), 11);
    }

    #[test]
    fn test_display_windows_are_bounded() {
        let config = ForecastConfig {
            observations_to_plot: 12,
            ..make_config()
        };
        let mut predictor = Predictor::new(&CALIBRATION, &config).unwrap();
        for value in [5.0, 5.5, 4.5, 5.2, 4.8] {
            predictor.update_and_predict(value).unwrap();
        }

        assert_eq!(predictor.observation_window().len(), 12);
        assert_eq!(predictor.average_forecast_window().len(), 12);
        assert_eq!(predictor.error_window().len(), 5);
        assert_eq!(predictor.volatility_forecast().len(), 10);
        assert!(predictor.mean_absolute_error().is_some());
    }

    #[test]
    fn test_degenerate_calibration_rejected() {
        let result = Predictor::new(&[4.0; 10], &make_config());
        assert!(matches!(result, Err(ComputeError::NormalizationError(_))));

        let result = Predictor::new(&[4.0], &make_config());
        assert!(matches!(result, Err(ComputeError::DataShapeError(_))));
    }

    /// Mean of the diagonal over the forecasts issued for the next tick;
    /// `issued[t]` is the forecast issued at tick t (None when its fit failed)
    fn make_expected_consensus(issued: &[Option<Vec<f64>>], length: usize) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, forecast) in issued.iter().rev().take(length).enumerate() {
            if let Some(forecast) = forecast {
                sum += forecast[i];
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    #[test]
    fn test_failed_ticks_keep_consensus_aligned() {
        let config = ForecastConfig {
            history_used_in_forecasting: 12,
            forecast_length: 3,
            max_standardized_magnitude: f64::MAX,
            ..make_config()
        };
        let mut predictor = Predictor::new(&CALIBRATION, &config).unwrap();
        let mut issued = vec![Some(predictor.current_forecast().to_vec())];

        // Squares of the spike overflow, so every fit over a window holding it fails
        let observations: Vec<f64> = std::iter::once(1e200)
            .chain((0..30).map(|i| CALIBRATION[i % CALIBRATION.len()]))
            .collect();

        let mut failures = 0;
        let mut recovered = false;
        for (i, observation) in observations.into_iter().enumerate() {
            let tick = i + 1;
            let expected = make_expected_consensus(&issued, 3);

            match predictor.update_and_predict(observation) {
                Ok(outcome) => {
                    assert_eq!(outcome.consensus_forecast, expected, "tick {}", tick);
                    recovered |= failures > 0;
                    issued.push(Some(outcome.forecast));
                }
                Err(err) => {
                    assert!(err.is_model_fit(), "tick {}: {}", tick, err);
                    assert_eq!(predictor.last_backtest().unwrap().consensus, expected);
                    failures += 1;
                    issued.push(None);
                }
            }

            assert_eq!(predictor.standardized_series().len(), CALIBRATION.len() + tick);
            assert_eq!(predictor.consensus().average_forecasts().len(), CALIBRATION.len() + tick);
            assert_eq!(predictor.consensus().errors().len(), tick);
            let stored = issued.iter().rev().take(3).filter(|f| f.is_some()).count();
            assert_eq!(predictor.consensus().forecasts_stored(), stored);
        }

        assert!(failures > 0);
        assert!(recovered);
    }

    #[test]
    fn test_extreme_observation_rejected() {
        let mut predictor = Predictor::new(&CALIBRATION, &make_config()).unwrap();
        let result = predictor.update_and_predict(1e200);
        assert!(matches!(result, Err(ComputeError::DataShapeError(_))));
        assert_eq!(predictor.standardized_series().len(), CALIBRATION.len());
        assert!(predictor.consensus().errors().is_empty());

        let tick = predictor.update_and_predict(5.0).unwrap();
        assert_eq!(tick.standardized_observation, 0.0);
        assert_eq!(predictor.standardized_series().len(), CALIBRATION.len() + 1);
    }

    #[test]
    fn test_series_is_bounded() {
        let config = ForecastConfig {
            history_used_in_forecasting: 12,
            observations_to_plot: 15,
            ..make_config()
        };
        let mut predictor = Predictor::new(&CALIBRATION, &config).unwrap();
        for i in 0..20 {
            predictor.update_and_predict(CALIBRATION[i % CALIBRATION.len()]).unwrap();
        }

        assert_eq!(predictor.standardized_series().len(), 15);
        assert_eq!(predictor.consensus().average_forecasts().len(), 15);
        assert_eq!(predictor.consensus().errors().len(), 15);
        assert_eq!(predictor.observation_window().len(), 15);
    }

    #[test]
    fn test_non_finite_observation_rejected() {
        let mut predictor = Predictor::new(&CALIBRATION, &make_config()).unwrap();
        assert!(predictor.update_and_predict(f64::NAN).is_err());
        assert_eq!(predictor.standardized_series().len(), 10);
    }
}
