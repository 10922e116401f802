//! Error types for cogload-flux

use thiserror::Error;

/// Errors that can occur while windowing, measuring or forecasting
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Model fit error: {0}")]
    ModelFitError(String),

    #[error("No usable model order: {0}")]
    NoUsableOrder(String),

    #[error("Data shape error: {0}")]
    DataShapeError(String),

    #[error("Normalization error: {0}")]
    NormalizationError(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ComputeError {
    /// True for errors raised by a statistical fit (as opposed to bad input or config)
    pub fn is_model_fit(&self) -> bool {
        matches!(
            self,
            ComputeError::ModelFitError(_) | ComputeError::NoUsableOrder(_)
        )
    }
}
