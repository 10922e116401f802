//! Pipeline orchestration
//!
//! This module wires the load pipeline together: paired pupil readings are
//! fused, windowed into load measurements, normalized against the session
//! baseline, and fed to the online forecaster. Every forecast tick is
//! published as a [`ForecastRecord`].

use crate::config::{CoreConfig, ForecastConfig};
use crate::error::ComputeError;
use crate::forecasting::{Predictor, PredictorTick};
use crate::handler::WindowedHandler;
use crate::measurement_log::MeasurementSink;
use crate::measurements::LoadEstimator;
use crate::preprocess::PairedChannelFuser;
use crate::types::{channels, ForecastRecord, MeasurementRow, Phase};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Handler name of the load measurement
pub const LOAD_HANDLER: &str = "cognitive_load";

/// Receiver of published forecast records (the transport layer)
pub trait ForecastSink {
    fn publish(&mut self, record: &ForecastRecord) -> Result<(), ComputeError>;
}

/// Keeps published records in memory
#[derive(Debug, Default)]
pub struct MemoryForecastSink {
    pub records: Vec<ForecastRecord>,
}

impl ForecastSink for MemoryForecastSink {
    fn publish(&mut self, record: &ForecastRecord) -> Result<(), ComputeError> {
        self.records.push(record.clone());
        Ok(())
    }
}

impl<S: ForecastSink> ForecastSink for Arc<Mutex<S>> {
    fn publish(&mut self, record: &ForecastRecord) -> Result<(), ComputeError> {
        match self.lock() {
            Ok(mut sink) => sink.publish(record),
            Err(poisoned) => poisoned.into_inner().publish(record),
        }
    }
}

/// Run the forecaster over a prepared series of measurements.
///
/// The first `calibration_length` values calibrate the predictor; every
/// later value produces one record.
///
/// # Arguments
/// * `values` - Measurement series, oldest first
/// * `config` - Forecasting settings
///
/// # Returns
/// One forecast record per value after the calibration window
///
/// # Example
/// ```ignore
/// let records = forecast_series(&load_values, &ForecastConfig::default())?;
/// ```
pub fn forecast_series(values: &[f64], config: &ForecastConfig) -> Result<Vec<ForecastRecord>, ComputeError> {
    config.validate()?;
    if values.len() < config.calibration_length {
        return Err(ComputeError::DataShapeError(format!(
            "series has {} values, calibration needs {}",
            values.len(),
            config.calibration_length
        )));
    }

    let (calibration, rest) = values.split_at(config.calibration_length);
    let mut predictor = Predictor::new(calibration, config)?;
    let session_id = Uuid::new_v4();

    rest.iter()
        .enumerate()
        .map(|(i, &observation)| -> Result<ForecastRecord, ComputeError> {
            let tick = predictor.update_and_predict(observation)?;
            Ok(make_record(session_id, i as u64 + 1, Utc::now(), observation, tick))
        })
        .collect()
}

fn make_record(
    session_id: Uuid,
    tick: u64,
    timestamp: DateTime<Utc>,
    observation: f64,
    outcome: PredictorTick,
) -> ForecastRecord {
    ForecastRecord {
        session_id,
        tick,
        timestamp,
        observation,
        standardized_observation: outcome.standardized_observation,
        forecast: outcome.forecast,
        consensus_forecast: outcome.consensus_forecast,
        absolute_error: outcome.absolute_error,
        is_outlier: outcome.is_outlier,
    }
}

/// Stateful load pipeline for one session.
///
/// Owns every stage from paired pupil readings to forecast records. The
/// predictor is created once `calibration_length` load measurements exist.
pub struct LoadPipeline {
    session_id: Uuid,
    config: CoreConfig,
    fuser: PairedChannelFuser,
    handler: WindowedHandler,
    load_series: Vec<f64>,
    measurements: u64,
    predictor: Option<Predictor>,
    sink: Option<Box<dyn ForecastSink + Send>>,
    ticks: u64,
    skipped_ticks: u64,
}

impl std::fmt::Debug for LoadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPipeline")
            .field("session_id", &self.session_id)
            .field("handler", &self.handler)
            .field("measurements", &self.measurements)
            .field("calibrated", &self.predictor.is_some())
            .field("ticks", &self.ticks)
            .field("skipped_ticks", &self.skipped_ticks)
            .finish()
    }
}

impl LoadPipeline {
    /// Create a pipeline with a fresh session id
    pub fn new(config: &CoreConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let estimator = LoadEstimator::new(config.handler.sampling_rate_hz);
        let handler = WindowedHandler::new(
            LOAD_HANDLER,
            LoadEstimator::channels(),
            estimator,
            &config.handler,
        )?;

        Ok(Self {
            session_id: Uuid::new_v4(),
            config: config.clone(),
            fuser: PairedChannelFuser::new(channels::LEFT_PUPIL, channels::RIGHT_PUPIL),
            handler,
            load_series: Vec::new(),
            measurements: 0,
            predictor: None,
            sink: None,
            ticks: 0,
            skipped_ticks: 0,
        })
    }

    /// Also append every emitted load measurement to `sink`
    pub fn with_measurement_sink(mut self, sink: impl MeasurementSink + Send + 'static) -> Self {
        self.handler = self.handler.with_sink(sink);
        self
    }

    /// Publish every forecast record to `sink`
    pub fn with_forecast_sink(mut self, sink: impl ForecastSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Feed one raw left/right pupil reading (NaN marks a dropout).
    ///
    /// Returns a record when the reading completed a load measurement that
    /// produced a forecast tick.
    pub fn push_gaze(
        &mut self,
        left: f64,
        right: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ForecastRecord>, ComputeError> {
        let sample = self.fuser.fuse_sample(left, right, timestamp);
        match self.handler.add_data_point(&sample)? {
            Some(row) => self.push_measurement(&row),
            None => Ok(None),
        }
    }

    /// Feed one normalized load measurement.
    ///
    /// Until the calibration window is full this only extends the load
    /// series. A failed fit is counted and returned; the tick is skipped.
    pub fn push_measurement(&mut self, row: &MeasurementRow) -> Result<Option<ForecastRecord>, ComputeError> {
        self.load_series.push(row.value);
        self.measurements += 1;
        let retained = self
            .config
            .forecasting
            .calibration_length
            .max(self.config.forecasting.observations_to_plot);
        if self.load_series.len() > retained {
            self.load_series.drain(..self.load_series.len() - retained);
        }

        if self.predictor.is_none() {
            self.start_forecasting()?;
            return Ok(None);
        }
        let result = match self.predictor.as_mut() {
            Some(predictor) => predictor.update_and_predict(row.value),
            None => return Ok(None),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.skipped_ticks += 1;
                warn!(
                    session = %self.session_id,
                    error = %err,
                    skipped = self.skipped_ticks,
                    "forecast tick skipped"
                );
                return Err(err);
            }
        };

        self.ticks += 1;
        let record = make_record(self.session_id, self.ticks, row.timestamp, row.value, outcome);
        if let Some(sink) = self.sink.as_mut() {
            sink.publish(&record)?;
        }
        Ok(Some(record))
    }

    /// Calibrate the predictor on the latest `calibration_length` measurements
    fn start_forecasting(&mut self) -> Result<(), ComputeError> {
        let calibration_length = self.config.forecasting.calibration_length;
        if self.load_series.len() < calibration_length {
            return Ok(());
        }
        let calibration = &self.load_series[self.load_series.len() - calibration_length..];
        let predictor = Predictor::new(calibration, &self.config.forecasting)?;
        info!(
            session = %self.session_id,
            measurements = self.measurements,
            "forecasting started"
        );
        self.predictor = Some(predictor);
        Ok(())
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.handler.phase()
    }

    pub fn handler(&self) -> &WindowedHandler {
        &self.handler
    }

    /// Most recent load measurements (normalized), at most
    /// `max(calibration_length, observations_to_plot)` of them
    pub fn load_series(&self) -> &[f64] {
        &self.load_series
    }

    /// Load measurements emitted so far
    pub fn measurements(&self) -> u64 {
        self.measurements
    }

    pub fn predictor(&self) -> Option<&Predictor> {
        self.predictor.as_ref()
    }

    /// Forecast records produced
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks lost to failed model fits
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks
    }

    /// Samples where both pupils dropped out
    pub fn degraded_samples(&self) -> u64 {
        self.fuser.degraded_count()
    }
}
