//! Cogload Flux - Streaming cognitive-load estimation and forecasting
//!
//! Flux turns raw physiological sample streams into a forecast cognitive-load
//! signal through a deterministic pipeline: paired-channel fusion → windowed
//! measurement → baseline normalization → ARMA+GARCH forecasting → consensus
//! backtesting.
//!
//! ## Modules
//!
//! - **Load Pipeline**: Eye-tracker pupil diameters to a wavelet load index and
//!   per-tick forecast records
//! - **Fixations**: Velocity-threshold fixation detection over gaze positions
//! - **Wristband Measurements**: EDA, heart rate, IBI and skin temperature
//!   window functions usable with the same handler

pub mod baseline;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fixation;
pub mod forecasting;
pub mod handler;
pub mod measurement_log;
pub mod measurements;
pub mod normalizer;
pub mod pipeline;
pub mod preprocess;
pub mod types;
pub mod window;

pub use config::{CoreConfig, ForecastConfig, HandlerConfig, LogConfig, LogFormat};
pub use error::ComputeError;
pub use fixation::{Fixation, FixationDetector};
pub use handler::{MeasurementFn, WindowedHandler};
pub use pipeline::{forecast_series, ForecastSink, LoadPipeline, MemoryForecastSink};

// Forecasting exports
pub use forecasting::{ConsensusEngine, Predictor, PredictorTick};

// Measurement exports
pub use measurements::{compute_cognitive_load, LoadEstimator, WristbandMeasure};

pub use types::{channels, ForecastRecord, Measurement, MeasurementRow, Phase, Sample};

/// Flux version embedded in published records' producer metadata
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "cogload-flux";
