//! Consensus forecasting and backtesting
//!
//! The forecast matrix is `L × L`: row `i` holds the forecast vector issued
//! `i + 1` ticks ago, so its component `i` targets the current tick. The
//! diagonal therefore collects every stored forecast of "now", and its mean is
//! the consensus forecast the new observation is scored against.
//!
//! Every tick shifts the matrix by one row. A tick without a forecast (failed
//! fit) inserts an empty row, which the consensus skips.

use crate::error::ComputeError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Consensus and error for one observed tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backtest {
    pub consensus: f64,
    pub absolute_error: f64,
}

/// Rolling forecast matrix with error tracking
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    matrix: DMatrix<f64>,
    /// Which rows hold a forecast, in row order
    filled: Vec<bool>,
    average_forecasts: Vec<f64>,
    errors: Vec<f64>,
    /// Entries kept in `average_forecasts` and `errors`
    retention: usize,
    error_sum: f64,
    error_count: u64,
}

impl ConsensusEngine {
    /// Engine for horizon `forecast_length`; the consensus series starts with `history`
    pub fn new(forecast_length: usize, history: &[f64]) -> Result<Self, ComputeError> {
        if forecast_length == 0 {
            return Err(ComputeError::ConfigurationError(
                "forecast length must be positive".to_string(),
            ));
        }
        Ok(Self {
            matrix: DMatrix::zeros(forecast_length, forecast_length),
            filled: vec![false; forecast_length],
            average_forecasts: history.to_vec(),
            errors: Vec::new(),
            retention: usize::MAX,
            error_sum: 0.0,
            error_count: 0,
        })
    }

    /// Keep only the most recent `retention` consensus forecasts and errors
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        trim_front(&mut self.average_forecasts, self.retention);
        self
    }

    pub fn forecast_length(&self) -> usize {
        self.matrix.nrows()
    }

    /// Mean of the matrix diagonal over the rows holding a forecast; 0 when
    /// no row does
    pub fn consensus(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, filled) in self.filled.iter().enumerate() {
            if *filled {
                sum += self.matrix[(i, i)];
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        sum / count as f64
    }

    /// Score `observation` against the current consensus, then store `forecast`
    pub fn observe(&mut self, observation: f64, forecast: &[f64]) -> Result<Backtest, ComputeError> {
        self.check_length(forecast)?;
        let backtest = self.score(observation);
        self.insert(Some(forecast));
        Ok(backtest)
    }

    /// Score `observation` for a tick that issued no forecast.
    ///
    /// The matrix still shifts, with an empty top row.
    pub fn observe_without_forecast(&mut self, observation: f64) -> Backtest {
        let backtest = self.score(observation);
        self.insert(None);
        backtest
    }

    /// Store a forecast without scoring an observation (the first forecast)
    pub fn push_forecast(&mut self, forecast: &[f64]) -> Result<(), ComputeError> {
        self.check_length(forecast)?;
        self.insert(Some(forecast));
        Ok(())
    }

    fn score(&mut self, observation: f64) -> Backtest {
        let consensus = self.consensus();
        let absolute_error = (observation - consensus).abs();

        self.average_forecasts.push(consensus);
        self.errors.push(absolute_error);
        trim_front(&mut self.average_forecasts, self.retention);
        trim_front(&mut self.errors, self.retention);
        self.error_sum += absolute_error;
        self.error_count += 1;

        debug!(
            consensus,
            absolute_error,
            forecasts = self.forecasts_stored(),
            "consensus backtest"
        );
        Backtest {
            consensus,
            absolute_error,
        }
    }

    fn check_length(&self, forecast: &[f64]) -> Result<(), ComputeError> {
        if forecast.len() != self.forecast_length() {
            return Err(ComputeError::DataShapeError(format!(
                "forecast has {} steps, expected {}",
                forecast.len(),
                self.forecast_length()
            )));
        }
        Ok(())
    }

    /// Shift every row down one place (dropping the oldest) and put `forecast`,
    /// or an empty row, on top
    fn insert(&mut self, forecast: Option<&[f64]>) {
        let size = self.forecast_length();
        for row in (1..size).rev() {
            let previous = self.matrix.row(row - 1).clone_owned();
            self.matrix.set_row(row, &previous);
        }
        self.filled.rotate_right(1);

        match forecast {
            Some(forecast) => {
                self.matrix
                    .set_row(0, &DVector::from_column_slice(forecast).transpose());
                self.filled[0] = true;
            }
            None => {
                self.matrix.row_mut(0).fill(0.0);
                self.filled[0] = false;
            }
        }
    }

    /// Rows currently holding a forecast (at most L)
    pub fn forecasts_stored(&self) -> usize {
        self.filled.iter().filter(|filled| **filled).count()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Seed history followed by one consensus forecast per observed tick,
    /// most recent `retention` entries
    pub fn average_forecasts(&self) -> &[f64] {
        &self.average_forecasts
    }

    /// Absolute error per observed tick, most recent `retention` entries
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Mean absolute error over every observed tick
    pub fn mean_absolute_error(&self) -> Option<f64> {
        if self.error_count == 0 {
            return None;
        }
        Some(self.error_sum / self.error_count as f64)
    }
}

fn trim_front(values: &mut Vec<f64>, retention: usize) {
    if values.len() > retention {
        values.drain(..values.len() - retention);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Forecast issued at `tick` whose component h predicts tick + 1 + h
    fn make_labelled_forecast(tick: usize, length: usize) -> Vec<f64> {
        (0..length).map(|h| (tick + 1 + h) as f64).collect()
    }

    #[test]
    fn test_divisor_ramps_up_with_stored_forecasts() {
        let mut engine = ConsensusEngine::new(10, &[]).unwrap();
        for tick in 1..=15 {
            engine.push_forecast(&[1.0; 10]).unwrap();
            assert_eq!(engine.forecasts_stored(), tick.min(10));
            assert_eq!(engine.consensus(), 1.0, "tick {}", tick);
        }
    }

    #[test]
    fn test_diagonal_targets_current_tick() {
        let mut engine = ConsensusEngine::new(4, &[]).unwrap();
        engine.push_forecast(&make_labelled_forecast(0, 4)).unwrap();

        for tick in 1..12 {
            let backtest = engine
                .observe(tick as f64, &make_labelled_forecast(tick, 4))
                .unwrap();
            assert_eq!(backtest.consensus, tick as f64);
            assert_eq!(backtest.absolute_error, 0.0);
        }
    }

    #[test]
    fn test_error_and_series_bookkeeping() {
        let mut engine = ConsensusEngine::new(3, &[0.5, -0.5]).unwrap();
        engine.push_forecast(&[1.0, 2.0, 3.0]).unwrap();

        let backtest = engine.observe(0.25, &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(backtest.consensus, 1.0);
        assert_eq!(backtest.absolute_error, 0.75);

        // (4 + 2) / 2
        let backtest = engine.observe(3.0, &[7.0, 8.0, 9.0]).unwrap();
        assert_eq!(backtest.consensus, 3.0);

        assert_eq!(engine.average_forecasts(), &[0.5, -0.5, 1.0, 3.0]);
        assert_eq!(engine.errors(), &[0.75, 0.0]);
        assert_eq!(engine.mean_absolute_error(), Some(0.375));
    }

    #[test]
    fn test_tick_without_forecast_shifts_matrix() {
        let mut engine = ConsensusEngine::new(3, &[]).unwrap();
        engine.push_forecast(&make_labelled_forecast(0, 3)).unwrap();

        // Tick 1 issues nothing; its row stays empty while it moves down
        let backtest = engine.observe_without_forecast(1.0);
        assert_eq!(backtest.consensus, 1.0);
        assert_eq!(engine.forecasts_stored(), 1);

        let backtest = engine.observe(2.0, &make_labelled_forecast(2, 3)).unwrap();
        assert_eq!(backtest.consensus, 2.0);
        assert_eq!(engine.forecasts_stored(), 2);

        // Tick 3 sees the forecasts from ticks 0 and 2 only
        let backtest = engine.observe_without_forecast(3.0);
        assert_eq!(backtest.consensus, 3.0);
        assert_eq!(engine.forecasts_stored(), 1);

        engine.observe_without_forecast(4.0);
        engine.observe_without_forecast(5.0);
        assert_eq!(engine.forecasts_stored(), 0);
        assert_eq!(engine.consensus(), 0.0);
        assert_eq!(engine.errors().len(), 5);
        assert_eq!(engine.average_forecasts().len(), 5);
    }

    #[test]
    fn test_retention_bounds_history() {
        let mut engine = ConsensusEngine::new(2, &[9.0; 6]).unwrap().with_retention(4);
        assert_eq!(engine.average_forecasts().len(), 4);

        for tick in 0..10 {
            engine.observe(tick as f64, &[0.0, 0.0]).unwrap();
        }
        assert_eq!(engine.average_forecasts(), &[0.0; 4]);
        assert_eq!(engine.errors(), &[6.0, 7.0, 8.0, 9.0]);
        // The first tick scores against the empty matrix, error 0
        assert_eq!(engine.mean_absolute_error(), Some(4.5));
    }

    #[test]
    fn test_empty_engine() {
        let engine = ConsensusEngine::new(5, &[]).unwrap();
        assert_eq!(engine.consensus(), 0.0);
        assert_eq!(engine.mean_absolute_error(), None);
    }

    #[test]
    fn test_wrong_forecast_length_rejected() {
        let mut engine = ConsensusEngine::new(3, &[]).unwrap();
        assert!(matches!(
            engine.observe(0.0, &[1.0, 2.0]),
            Err(ComputeError::DataShapeError(_))
        ));
        assert!(engine.errors().is_empty());
        assert!(ConsensusEngine::new(0, &[]).is_err());
    }
}
