//! Windowed measurement handler
//!
//! A handler subscribes to one or more named channels, keeps a lockstep window
//! per channel, and applies its measurement function every `window_step`
//! samples once all windows are full. Measurements first feed the baseline;
//! after `baseline_length` of them the baseline is fixed and every later
//! measurement is normalized against it and emitted.
//!
//! ```text
//! Uninitialized ──(first full window)──▶ BaselinePhase ──(B measurements)──▶ SteadyState
//!        └───────────(baseline calculation disabled)──────────────────────────────▲
//! ```

use crate::baseline::{Baseline, BaselineAccumulator};
use crate::config::HandlerConfig;
use crate::error::ComputeError;
use crate::measurement_log::MeasurementSink;
use crate::normalizer::Normalizer;
use crate::types::{Measurement, MeasurementRow, Phase, Sample};
use crate::window::ChannelWindows;
use tracing::{debug, info};

/// A function computing one measurement from a ready set of windows
pub trait MeasurementFn {
    fn measure(&self, windows: &ChannelWindows) -> Result<Measurement, ComputeError>;
}

impl<F> MeasurementFn for F
where
    F: Fn(&ChannelWindows) -> Result<Measurement, ComputeError>,
{
    fn measure(&self, windows: &ChannelWindows) -> Result<Measurement, ComputeError> {
        self(windows)
    }
}

/// Windowed measurement handler with a two-phase baseline lifecycle
pub struct WindowedHandler {
    name: String,
    measure: Box<dyn MeasurementFn + Send>,
    windows: ChannelWindows,
    window_step: usize,
    calculate_baseline: bool,
    /// Samples received (monotonic)
    counter: u64,
    phase: Phase,
    accumulator: BaselineAccumulator,
    baseline: Option<Baseline>,
    sink: Option<Box<dyn MeasurementSink + Send>>,
    emitted: u64,
}

impl std::fmt::Debug for WindowedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedHandler")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("counter", &self.counter)
            .field("baseline", &self.baseline)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl WindowedHandler {
    /// Create a handler over `channels`, measured with `measure`
    pub fn new<I, S, M>(
        name: impl Into<String>,
        channels: I,
        measure: M,
        config: &HandlerConfig,
    ) -> Result<Self, ComputeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        M: MeasurementFn + Send + 'static,
    {
        config.validate()?;
        let windows = ChannelWindows::new(channels, config.window_length)?;

        Ok(Self {
            name: name.into(),
            measure: Box::new(measure),
            windows,
            window_step: config.window_step,
            calculate_baseline: config.calculate_baseline,
            counter: 0,
            phase: Phase::Uninitialized,
            accumulator: BaselineAccumulator::new(config.baseline_length),
            baseline: None,
            sink: None,
            emitted: 0,
        })
    }

    /// Emit steady-state measurements to `sink` as well as returning them
    pub fn with_sink(mut self, sink: impl MeasurementSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Feed one sample.
    ///
    /// Returns the emitted row when this sample completed a steady-state
    /// measurement. A failing measurement function is reported for this
    /// sample only; windows, counter and phase stay consistent.
    pub fn add_data_point(&mut self, sample: &Sample) -> Result<Option<MeasurementRow>, ComputeError> {
        self.windows.push(sample)?;
        self.counter += 1;

        if self.counter % self.window_step as u64 != 0 || !self.windows.is_ready() {
            return Ok(None);
        }

        if self.phase == Phase::Uninitialized {
            self.phase = if self.calculate_baseline {
                Phase::BaselinePhase
            } else {
                Phase::SteadyState
            };
        }

        let measurement = self.measure.measure(&self.windows)?;

        match self.phase {
            Phase::BaselinePhase => {
                self.collect_baseline(measurement)?;
                Ok(None)
            }
            _ => self.emit(measurement, sample).map(Some),
        }
    }

    fn collect_baseline(&mut self, measurement: Measurement) -> Result<(), ComputeError> {
        if let Some(baseline) = self.accumulator.push(measurement)? {
            info!(
                handler = %self.name,
                baseline = ?baseline.values(),
                measurements = baseline.measurements_used(),
                "baseline computed, entering steady state"
            );
            self.baseline = Some(baseline);
            self.phase = Phase::SteadyState;
        }
        Ok(())
    }

    fn emit(&mut self, measurement: Measurement, sample: &Sample) -> Result<MeasurementRow, ComputeError> {
        let value = match &self.baseline {
            Some(baseline) => Normalizer::normalize(&measurement, baseline)?,
            None => Normalizer::raw(&measurement),
        };

        let features = match measurement {
            Measurement::Scalar(_) => Vec::new(),
            Measurement::Vector(values) => values,
        };

        let row = MeasurementRow {
            timestamp: sample.timestamp,
            value,
            features,
        };

        if let Some(sink) = self.sink.as_mut() {
            sink.record(&row)?;
        }
        self.emitted += 1;
        debug!(handler = %self.name, value, emitted = self.emitted, "measurement emitted");

        Ok(row)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The fixed baseline, once the baseline phase has completed
    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Measurements collected towards the baseline so far
    pub fn baseline_measurements(&self) -> usize {
        self.accumulator.len()
    }

    /// Samples received so far
    pub fn samples_seen(&self) -> u64 {
        self.counter
    }

    /// Steady-state measurements emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn windows(&self) -> &ChannelWindows {
        &self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement_log::MemorySink;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn config(window: usize, step: usize, baseline: usize) -> HandlerConfig {
        HandlerConfig {
            window_length: window,
            window_step: step,
            baseline_length: baseline,
            ..Default::default()
        }
    }

    fn window_mean(windows: &ChannelWindows) -> Result<Measurement, ComputeError> {
        let values = windows.primary();
        Ok(Measurement::Scalar(values.iter().sum::<f64>() / values.len() as f64))
    }

    fn feed(handler: &mut WindowedHandler, values: &[f64]) -> Vec<MeasurementRow> {
        values
            .iter()
            .filter_map(|v| {
                handler
                    .add_data_point(&Sample::scalar("x", *v, Utc::now()))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_baseline_then_normalized_output() {
        let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &config(3, 3, 2)).unwrap();

        let rows = feed(&mut handler, &[1.0, 1.0, 1.0, 2.0, 2.0]);
        assert!(rows.is_empty());
        assert_eq!(handler.phase(), Phase::BaselinePhase);

        let rows = feed(&mut handler, &[2.0]);
        assert!(rows.is_empty());
        assert_eq!(handler.phase(), Phase::SteadyState);
        assert_eq!(handler.baseline().unwrap().values(), &[1.5]);

        let rows = feed(&mut handler, &[3.0, 3.0, 3.0]);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_uninitialized_until_first_full_window() {
        let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &config(4, 2, 1)).unwrap();
        feed(&mut handler, &[1.0, 1.0]);
        assert_eq!(handler.phase(), Phase::Uninitialized);
        feed(&mut handler, &[1.0, 1.0]);
        assert_eq!(handler.phase(), Phase::SteadyState);
    }

    #[test]
    fn test_disabled_baseline_emits_raw() {
        let handler_config = HandlerConfig {
            calculate_baseline: false,
            ..config(2, 2, 0)
        };
        let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &handler_config).unwrap();

        let rows = feed(&mut handler, &[4.0, 6.0]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 5.0);
        assert!(handler.baseline().is_none());
        assert_eq!(handler.phase(), Phase::SteadyState);
    }

    #[test]
    fn test_sliding_window_step() {
        let handler_config = HandlerConfig {
            calculate_baseline: false,
            ..config(4, 2, 0)
        };
        let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &handler_config).unwrap();
        let rows = feed(&mut handler, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.5, 4.5, 6.5]);
    }

    #[test]
    fn test_vector_measurement_rows() {
        let spread = |windows: &ChannelWindows| -> Result<Measurement, ComputeError> {
            let values = windows.primary();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            Ok(Measurement::Vector(vec![min, max]))
        };
        let mut handler = WindowedHandler::new("spread", ["x"], spread, &config(2, 2, 1)).unwrap();

        feed(&mut handler, &[1.0, 2.0]);
        assert_eq!(handler.baseline().unwrap().values(), &[1.0, 2.0]);

        let rows = feed(&mut handler, &[2.0, 4.0]);
        // (2/1 + 4/2) / 2 = 2
        assert_eq!(rows[0].value, 2.0);
        assert_eq!(rows[0].features, vec![2.0, 4.0]);
    }

    #[test]
    fn test_failing_measurement_does_not_corrupt_state() {
        let fail_on_negative = |windows: &ChannelWindows| -> Result<Measurement, ComputeError> {
            let values = windows.primary();
            if values.iter().any(|v| *v < 0.0) {
                return Err(ComputeError::DataShapeError("negative".to_string()));
            }
            Ok(Measurement::Scalar(values.iter().sum()))
        };
        let mut handler =
            WindowedHandler::new("sum", ["x"], fail_on_negative, &config(2, 2, 1)).unwrap();

        handler.add_data_point(&Sample::scalar("x", -1.0, Utc::now())).unwrap();
        let result = handler.add_data_point(&Sample::scalar("x", 1.0, Utc::now()));
        assert!(result.is_err());
        assert_eq!(handler.samples_seen(), 2);
        assert_eq!(handler.baseline_measurements(), 0);

        feed(&mut handler, &[1.0, 1.0]);
        assert_eq!(handler.phase(), Phase::SteadyState);
        assert_eq!(handler.baseline().unwrap().values(), &[2.0]);
    }

    #[test]
    fn test_multi_channel_handler() {
        let ratio = |windows: &ChannelWindows| -> Result<Measurement, ComputeError> {
            let left: f64 = windows.require("lpup")?.iter().sum();
            let right: f64 = windows.require("rpup")?.iter().sum();
            Ok(Measurement::Scalar(left / right))
        };
        let mut handler =
            WindowedHandler::new("ratio", ["lpup", "rpup"], ratio, &config(2, 1, 1)).unwrap();

        let sample = |l: f64, r: f64| Sample::new(Utc::now()).with("lpup", l).with("rpup", r);
        handler.add_data_point(&sample(2.0, 1.0)).unwrap();
        handler.add_data_point(&sample(2.0, 1.0)).unwrap();
        assert_eq!(handler.baseline().unwrap().values(), &[2.0]);

        let row = handler.add_data_point(&sample(4.0, 1.0)).unwrap().unwrap();
        // (2 + 4) / (1 + 1) = 3, relative to 2
        assert_eq!(row.value, 1.5);
    }

    #[test]
    fn test_rows_reach_sink() {
        let shared = Arc::new(Mutex::new(MemorySink::default()));
        let mut handler = WindowedHandler::new("mean", ["x"], window_mean, &config(1, 1, 1))
            .unwrap()
            .with_sink(Arc::clone(&shared));

        feed(&mut handler, &[2.0, 4.0, 6.0]);
        let rows = &shared.lock().unwrap().rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, 3.0);
        assert_eq!(handler.emitted(), 2);
    }

    #[test]
    fn test_zero_window_length_rejected() {
        let result = WindowedHandler::new("mean", ["x"], window_mean, &config(0, 1, 1));
        assert!(matches!(result, Err(ComputeError::ConfigurationError(_))));
    }
}
