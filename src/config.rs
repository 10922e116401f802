//! Core configuration
//!
//! The core never loads configuration itself; callers hand it a `CoreConfig`
//! (usually deserialized from JSON). Every field has a default, and
//! [`CoreConfig::validate`] rejects values the pipeline cannot run with.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};

/// Default eye-tracker sampling rate (Hz)
pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 120.0;

/// Default cadence for structural order re-estimation (ticks)
pub const DEFAULT_REESTIMATE_EVERY: u64 = 41;

/// Default outlier threshold, in standard deviations of the standardized series
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 2.0;

/// Default limit on |z| for observations the predictor accepts
pub const DEFAULT_MAX_STANDARDIZED_MAGNITUDE: f64 = 1e6;

/// Windowed measurement handler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Samples per window
    #[serde(default = "default_window_length")]
    pub window_length: usize,
    /// A measurement is taken every `window_step` samples
    #[serde(default = "default_window_step")]
    pub window_step: usize,
    /// Measurements collected before the baseline is fixed
    #[serde(default = "default_baseline_length")]
    pub baseline_length: usize,
    /// Skip the baseline phase and emit raw measurements when false
    #[serde(default = "default_calculate_baseline")]
    pub calculate_baseline: bool,
    /// Sampling rate of the windowed channels (Hz)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate_hz: f64,
}

fn default_window_length() -> usize {
    3000
}

fn default_window_step() -> usize {
    1500
}

fn default_baseline_length() -> usize {
    20
}

fn default_calculate_baseline() -> bool {
    true
}

fn default_sampling_rate() -> f64 {
    DEFAULT_SAMPLING_RATE_HZ
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            window_length: default_window_length(),
            window_step: default_window_step(),
            baseline_length: default_baseline_length(),
            calculate_baseline: default_calculate_baseline(),
            sampling_rate_hz: default_sampling_rate(),
        }
    }
}

impl HandlerConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.window_length == 0 {
            return Err(config_error("handler.window_length must be positive"));
        }
        if self.window_step == 0 {
            return Err(config_error("handler.window_step must be positive"));
        }
        if self.calculate_baseline && self.baseline_length == 0 {
            return Err(config_error(
                "handler.baseline_length must be positive when baseline calculation is enabled",
            ));
        }
        if !(self.sampling_rate_hz.is_finite() && self.sampling_rate_hz > 0.0) {
            return Err(config_error("handler.sampling_rate_hz must be positive"));
        }
        Ok(())
    }
}

/// Forecasting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Most recent standardized points the ARMA model is fitted on
    #[serde(default = "default_history")]
    pub history_used_in_forecasting: usize,
    /// Forecast horizon (and side of the forecast matrix)
    #[serde(default = "default_forecast_length")]
    pub forecast_length: usize,
    /// Observations retained in the display windows
    #[serde(default = "default_observations_to_plot")]
    pub observations_to_plot: usize,
    /// Measurements used to calibrate the predictor's mean/std
    #[serde(default = "default_calibration_length")]
    pub calibration_length: usize,
    /// Re-estimate the structural (p, q) order every N ticks
    #[serde(default = "default_reestimate_every")]
    pub reestimate_every: u64,
    /// Smallest p and q tried during order search
    #[serde(default = "default_order_min")]
    pub order_min: usize,
    /// Largest p and q tried during order search
    #[serde(default = "default_order_max")]
    pub order_max: usize,
    /// |z| at or above which a tick is flagged
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    /// Observations with a larger |z| are rejected before they reach the models
    #[serde(default = "default_max_standardized_magnitude")]
    pub max_standardized_magnitude: f64,
}

fn default_history() -> usize {
    100
}

fn default_forecast_length() -> usize {
    10
}

fn default_observations_to_plot() -> usize {
    50
}

fn default_calibration_length() -> usize {
    10
}

fn default_reestimate_every() -> u64 {
    DEFAULT_REESTIMATE_EVERY
}

fn default_order_min() -> usize {
    2
}

fn default_order_max() -> usize {
    5
}

fn default_outlier_threshold() -> f64 {
    DEFAULT_OUTLIER_THRESHOLD
}

fn default_max_standardized_magnitude() -> f64 {
    DEFAULT_MAX_STANDARDIZED_MAGNITUDE
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            history_used_in_forecasting: default_history(),
            forecast_length: default_forecast_length(),
            observations_to_plot: default_observations_to_plot(),
            calibration_length: default_calibration_length(),
            reestimate_every: default_reestimate_every(),
            order_min: default_order_min(),
            order_max: default_order_max(),
            outlier_threshold: default_outlier_threshold(),
            max_standardized_magnitude: default_max_standardized_magnitude(),
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.history_used_in_forecasting == 0 {
            return Err(config_error(
                "forecasting.history_used_in_forecasting must be positive",
            ));
        }
        if self.forecast_length == 0 {
            return Err(config_error("forecasting.forecast_length must be positive"));
        }
        if self.observations_to_plot == 0 {
            return Err(config_error(
                "forecasting.observations_to_plot must be positive",
            ));
        }
        if self.calibration_length < 2 {
            return Err(config_error(
                "forecasting.calibration_length must be at least 2",
            ));
        }
        if self.reestimate_every == 0 {
            return Err(config_error("forecasting.reestimate_every must be positive"));
        }
        if self.order_min == 0 || self.order_min > self.order_max {
            return Err(config_error(format!(
                "forecasting order range [{}, {}] is invalid",
                self.order_min, self.order_max
            )));
        }
        if !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0) {
            return Err(config_error(
                "forecasting.outlier_threshold must be positive",
            ));
        }
        if !(self.max_standardized_magnitude.is_finite()
            && self.max_standardized_magnitude > self.outlier_threshold)
        {
            return Err(config_error(
                "forecasting.max_standardized_magnitude must be finite and above the outlier threshold",
            ));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Logging settings (consumed by the CLI's subscriber)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Complete configuration consumed by the core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub forecasting: ForecastConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.handler.validate()?;
        self.forecasting.validate()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn config_error(message: impl Into<String>) -> ComputeError {
    ComputeError::ConfigurationError(message.into())
}
