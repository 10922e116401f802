//! GARCH volatility model
//!
//! Constant-mean GARCH(p, q) on the ARMA residual series:
//!
//! ```text
//! r_t = μ + ε_t,    ε_t ~ N(0, σ²_t)
//! σ²_t = ω + Σ α_i ε²_{t-i} + Σ β_j σ²_{t-j}
//! ```
//!
//! Presample squared errors and variances are backcast with the sample
//! variance. Parameters must satisfy `ω > 0`, `α, β ≥ 0` and
//! `Σα + Σβ < 1`; anything else is infeasible for the optimizer.

use super::optimize::{minimize, NelderMeadConfig};
use super::order::{select_order, InformationCriterion, Order, OrderRange, ReestimationSchedule};
use super::VAR_FLOOR;
use crate::config::ForecastConfig;
use crate::error::ComputeError;
use nalgebra::DVector;
use tracing::{debug, info};

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// A fitted GARCH model. `order.p` counts ARCH terms, `order.q` GARCH terms.
#[derive(Debug, Clone)]
pub struct GarchFit {
    pub order: Order,
    pub mu: f64,
    pub omega: f64,
    pub alpha: Vec<f64>,
    pub beta: Vec<f64>,
    pub log_likelihood: f64,
    pub aic: f64,
    /// In-sample conditional variances, one per observation
    pub conditional_variance: Vec<f64>,
    squared_errors: Vec<f64>,
    backcast: f64,
}

impl InformationCriterion for GarchFit {
    fn aic(&self) -> f64 {
        self.aic
    }
}

impl GarchFit {
    pub fn persistence(&self) -> f64 {
        self.alpha.iter().sum::<f64>() + self.beta.iter().sum::<f64>()
    }

    /// Mean forecast; constant at `mu` for every horizon
    pub fn forecast_mean(&self, steps: usize) -> Vec<f64> {
        vec![self.mu; steps]
    }

    /// Conditional variance forecast for the next `steps` periods.
    ///
    /// Future squared errors are replaced by their expectation, the variance
    /// forecast itself.
    pub fn forecast_variance(&self, steps: usize) -> Vec<f64> {
        let mut squared = self.squared_errors.clone();
        let mut variances = self.conditional_variance.clone();
        let mut forecast = Vec::with_capacity(steps);

        for _ in 0..steps {
            let next = next_variance(
                &squared,
                &variances,
                self.omega,
                &self.alpha,
                &self.beta,
                self.backcast,
            );
            squared.push(next);
            variances.push(next);
            forecast.push(next);
        }
        forecast
    }
}

fn next_variance(
    squared: &[f64],
    variances: &[f64],
    omega: f64,
    alpha: &[f64],
    beta: &[f64],
    backcast: f64,
) -> f64 {
    let t = squared.len();
    let lagged = |values: &[f64], lag: usize| if t > lag { values[t - 1 - lag] } else { backcast };

    let arch: f64 = alpha.iter().enumerate().map(|(i, a)| a * lagged(squared, i)).sum();
    let garch: f64 = beta.iter().enumerate().map(|(j, b)| b * lagged(variances, j)).sum();
    (omega + arch + garch).max(VAR_FLOOR)
}

/// In-sample conditional variances of `errors`
pub(crate) fn conditional_variances(
    errors: &[f64],
    omega: f64,
    alpha: &[f64],
    beta: &[f64],
    backcast: f64,
) -> Vec<f64> {
    let mut squared = Vec::with_capacity(errors.len());
    let mut variances = Vec::with_capacity(errors.len());
    for e in errors {
        variances.push(next_variance(&squared, &variances, omega, alpha, beta, backcast));
        squared.push(e * e);
    }
    variances
}

fn log_likelihood(errors: &[f64], variances: &[f64]) -> f64 {
    -0.5 * errors
        .iter()
        .zip(variances)
        .map(|(e, v)| LN_2PI + v.ln() + e * e / v)
        .sum::<f64>()
}

fn parameter_count(order: Order) -> usize {
    order.p + order.q + 2
}

fn split_params(params: &[f64], order: Order) -> (f64, f64, &[f64], &[f64]) {
    let (alpha, beta) = params[2..].split_at(order.p);
    (params[0], params[1], alpha, beta)
}

fn is_feasible(omega: f64, alpha: &[f64], beta: &[f64]) -> bool {
    let persistence: f64 = alpha.iter().sum::<f64>() + beta.iter().sum::<f64>();
    omega > 0.0
        && alpha.iter().chain(beta).all(|c| *c >= 0.0)
        && persistence < 1.0
}

/// Fit GARCH(p, q) to a residual series
pub fn fit_garch(series: &[f64], order: Order, optimizer: &NelderMeadConfig) -> Result<GarchFit, ComputeError> {
    let n = series.len();
    let k = parameter_count(order);
    if n <= k {
        return Err(ComputeError::ModelFitError(format!(
            "GARCH{} needs more than {} observations, got {}",
            order, k, n
        )));
    }
    if series.iter().any(|r| !r.is_finite()) {
        return Err(ComputeError::ModelFitError(
            "residual series contains non-finite values".to_string(),
        ));
    }

    let mean = series.iter().sum::<f64>() / n as f64;
    let backcast = (series.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64).max(VAR_FLOOR);

    let mut start = vec![mean, (0.1 * backcast).max(VAR_FLOOR)];
    start.extend(std::iter::repeat(0.1 / order.p.max(1) as f64).take(order.p));
    start.extend(std::iter::repeat(0.8 / order.q.max(1) as f64).take(order.q));

    let objective = |params: &DVector<f64>| {
        let (mu, omega, alpha, beta) = split_params(params.as_slice(), order);
        if !is_feasible(omega, alpha, beta) {
            return f64::INFINITY;
        }
        let errors: Vec<f64> = series.iter().map(|r| r - mu).collect();
        let variances = conditional_variances(&errors, omega, alpha, beta, backcast);
        -log_likelihood(&errors, &variances)
    };

    let minimum = minimize(objective, &DVector::from_vec(start), optimizer);
    if !minimum.value.is_finite() {
        return Err(ComputeError::ModelFitError(format!(
            "GARCH{} likelihood did not reach a finite value",
            order
        )));
    }

    let (mu, omega, alpha, beta) = split_params(minimum.point.as_slice(), order);
    let errors: Vec<f64> = series.iter().map(|r| r - mu).collect();
    let conditional_variance = conditional_variances(&errors, omega, alpha, beta, backcast);
    let log_likelihood = log_likelihood(&errors, &conditional_variance);

    debug!(
        %order,
        log_likelihood,
        iterations = minimum.iterations,
        converged = minimum.converged,
        "GARCH fit"
    );

    Ok(GarchFit {
        order,
        mu,
        omega,
        alpha: alpha.to_vec(),
        beta: beta.to_vec(),
        log_likelihood,
        aic: 2.0 * k as f64 - 2.0 * log_likelihood,
        conditional_variance,
        squared_errors: errors.iter().map(|e| e * e).collect(),
        backcast,
    })
}

/// Online GARCH forecaster with periodic order re-estimation
#[derive(Debug, Clone)]
pub struct GarchModel {
    range: OrderRange,
    forecast_length: usize,
    schedule: ReestimationSchedule,
    optimizer: NelderMeadConfig,
    fit: GarchFit,
    volatility: Vec<f64>,
    reestimations: u64,
}

impl GarchModel {
    /// Select the order on `residuals` and fit it
    pub fn new(residuals: &[f64], config: &ForecastConfig) -> Result<Self, ComputeError> {
        let range = OrderRange::new(config.order_min, config.order_max)?;
        let optimizer = NelderMeadConfig::default();
        let (order, fit) = Self::search(residuals, &range, &optimizer)?;
        info!(%order, aic = fit.aic, observations = residuals.len(), "GARCH order selected");

        Ok(Self {
            range,
            forecast_length: config.forecast_length,
            schedule: ReestimationSchedule::new(config.reestimate_every)?,
            optimizer,
            fit,
            volatility: Vec::new(),
            reestimations: 0,
        })
    }

    fn search(
        residuals: &[f64],
        range: &OrderRange,
        optimizer: &NelderMeadConfig,
    ) -> Result<(Order, GarchFit), ComputeError> {
        select_order(range, |order| fit_garch(residuals, order, optimizer))
    }

    pub fn estimate_order(&self, residuals: &[f64]) -> Result<Order, ComputeError> {
        Self::search(residuals, &self.range, &self.optimizer).map(|(order, _)| order)
    }

    /// Refit on `residuals` and return the first-step mean forecast.
    ///
    /// The full `forecast_length` horizon is computed and kept as the
    /// volatility forecast.
    pub fn update_and_predict(&mut self, residuals: &[f64]) -> Result<f64, ComputeError> {
        let fit = if self.schedule.tick() {
            let (order, fit) = Self::search(residuals, &self.range, &self.optimizer)?;
            self.reestimations += 1;
            info!(
                previous = %self.fit.order,
                %order,
                call = self.schedule.calls(),
                "GARCH order re-estimated"
            );
            fit
        } else {
            fit_garch(residuals, self.fit.order, &self.optimizer)?
        };

        self.fit = fit;
        self.volatility = self
            .fit
            .forecast_variance(self.forecast_length)
            .into_iter()
            .map(f64::sqrt)
            .collect();

        let mean = self.fit.forecast_mean(self.forecast_length);
        Ok(mean.first().copied().unwrap_or(self.fit.mu))
    }

    /// Conditional standard deviation forecast of the latest call
    pub fn volatility_forecast(&self) -> &[f64] {
        &self.volatility
    }

    pub fn order(&self) -> Order {
        self.fit.order
    }

    pub fn fit(&self) -> &GarchFit {
        &self.fit
    }

    pub fn calls(&self) -> u64 {
        self.schedule.calls()
    }

    pub fn reestimations(&self) -> u64 {
        self.reestimations
    }
}
