//! Online forecasting
//!
//! The level of the standardized load series is forecast with an ARMA model,
//! the ARMA residuals with a constant-mean GARCH model, and the staggered
//! multi-step forecasts are reconciled into one consensus value per tick.

pub mod arma;
pub mod consensus;
pub mod garch;
pub mod optimize;
pub mod order;
pub mod predictor;

pub use arma::{fit_arma, ArmaFit, ArmaModel};
pub use consensus::{Backtest, ConsensusEngine};
pub use garch::{fit_garch, GarchFit, GarchModel};
pub use order::{select_order, InformationCriterion, Order, OrderRange, ReestimationSchedule};
pub use predictor::{Predictor, PredictorTick};

/// Smallest variance a likelihood is evaluated at
pub const VAR_FLOOR: f64 = f64::EPSILON * 1e6;

/// Gaussian log-likelihood of `n` observations with squared-error sum `sse`
/// and constant variance `sigma2`
pub(crate) fn gaussian_log_likelihood(n: f64, sse: f64, sigma2: f64) -> f64 {
    -0.5 * (n * (2.0 * std::f64::consts::PI * sigma2).ln() + sse / sigma2)
}
