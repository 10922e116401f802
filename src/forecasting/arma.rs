//! ARMA level model
//!
//! Mean-parameterized ARMA(p, q) on an already stationary series:
//!
//! ```text
//! y_t - μ = Σ φ_i (y_{t-i} - μ) + e_t + Σ θ_j e_{t-j}
//! ```
//!
//! Fitted by conditional Gaussian likelihood (presample deviations and errors
//! are zero) with the innovation variance concentrated out, minimized with
//! Nelder–Mead from an OLS autoregressive start. Candidates outside the
//! stationary/invertible region are infeasible.

use super::optimize::{minimize, NelderMeadConfig};
use super::order::{select_order, InformationCriterion, Order, OrderRange, ReestimationSchedule};
use super::{gaussian_log_likelihood, VAR_FLOOR};
use crate::config::ForecastConfig;
use crate::error::ComputeError;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

/// A fitted ARMA model
#[derive(Debug, Clone)]
pub struct ArmaFit {
    pub order: Order,
    pub mean: f64,
    /// φ_1..φ_p
    pub ar: Vec<f64>,
    /// θ_1..θ_q
    pub ma: Vec<f64>,
    /// Innovation variance
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    /// In-sample one-step errors, one per observation
    pub residuals: Vec<f64>,
    series: Vec<f64>,
}

impl InformationCriterion for ArmaFit {
    fn aic(&self) -> f64 {
        self.aic
    }
}

impl ArmaFit {
    /// Free parameters: mean, φ, θ and the innovation variance
    pub fn parameter_count(&self) -> usize {
        parameter_count(self.order)
    }

    /// `steps` values past the end of the fitted series; future errors are zero
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut deviations: Vec<f64> = self.series.iter().map(|y| y - self.mean).collect();
        let mut errors = self.residuals.clone();
        let mut forecast = Vec::with_capacity(steps);

        for _ in 0..steps {
            let predicted = predict_deviation(&deviations, &errors, &self.ar, &self.ma);
            deviations.push(predicted);
            errors.push(0.0);
            forecast.push(self.mean + predicted);
        }
        forecast
    }
}

fn parameter_count(order: Order) -> usize {
    order.p + order.q + 2
}

/// Fit ARMA(p, q) to `series`
pub fn fit_arma(series: &[f64], order: Order, optimizer: &NelderMeadConfig) -> Result<ArmaFit, ComputeError> {
    let n = series.len();
    let k = parameter_count(order);
    if n <= k {
        return Err(ComputeError::ModelFitError(format!(
            "ARMA{} needs more than {} observations, got {}",
            order, k, n
        )));
    }
    if series.iter().any(|y| !y.is_finite()) {
        return Err(ComputeError::ModelFitError(
            "series contains non-finite values".to_string(),
        ));
    }

    let mean = series.iter().sum::<f64>() / n as f64;
    let mut start = vec![mean];
    start.extend(ols_ar_start(series, mean, order.p));
    start.extend(std::iter::repeat(0.0).take(order.q));

    let objective = |params: &DVector<f64>| {
        let (mean, ar, ma) = split_params(params.as_slice(), order);
        if !is_stationary(ar) || !is_invertible(ma) {
            return f64::INFINITY;
        }
        let residuals = arma_residuals(series, mean, ar, ma);
        -concentrated_log_likelihood(&residuals).0
    };

    let minimum = minimize(objective, &DVector::from_vec(start), optimizer);
    if !minimum.value.is_finite() {
        return Err(ComputeError::ModelFitError(format!(
            "ARMA{} likelihood did not reach a finite value",
            order
        )));
    }

    let (mean, ar, ma) = split_params(minimum.point.as_slice(), order);
    let residuals = arma_residuals(series, mean, ar, ma);
    let (log_likelihood, sigma2) = concentrated_log_likelihood(&residuals);

    debug!(
        %order,
        log_likelihood,
        iterations = minimum.iterations,
        converged = minimum.converged,
        "ARMA fit"
    );

    Ok(ArmaFit {
        order,
        mean,
        ar: ar.to_vec(),
        ma: ma.to_vec(),
        sigma2,
        log_likelihood,
        aic: 2.0 * k as f64 - 2.0 * log_likelihood,
        residuals,
        series: series.to_vec(),
    })
}

fn split_params(params: &[f64], order: Order) -> (f64, &[f64], &[f64]) {
    let (ar, ma) = params[1..].split_at(order.p);
    (params[0], ar, ma)
}

fn predict_deviation(deviations: &[f64], errors: &[f64], ar: &[f64], ma: &[f64]) -> f64 {
    let t = deviations.len();
    let autoregressive: f64 = ar
        .iter()
        .enumerate()
        .filter(|(i, _)| t > *i)
        .map(|(i, phi)| phi * deviations[t - 1 - i])
        .sum();
    let moving_average: f64 = ma
        .iter()
        .enumerate()
        .filter(|(j, _)| t > *j)
        .map(|(j, theta)| theta * errors[t - 1 - j])
        .sum();
    autoregressive + moving_average
}

/// One-step in-sample errors with zero presample values
pub(crate) fn arma_residuals(series: &[f64], mean: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut deviations = Vec::with_capacity(series.len());
    let mut errors = Vec::with_capacity(series.len());
    for y in series {
        let predicted = predict_deviation(&deviations, &errors, ar, ma);
        let deviation = y - mean;
        errors.push(deviation - predicted);
        deviations.push(deviation);
    }
    errors
}

/// (log-likelihood, variance) with the variance at its maximum-likelihood value
fn concentrated_log_likelihood(residuals: &[f64]) -> (f64, f64) {
    let n = residuals.len() as f64;
    let sse: f64 = residuals.iter().map(|e| e * e).sum();
    let sigma2 = (sse / n).max(VAR_FLOOR);
    (gaussian_log_likelihood(n, sse, sigma2), sigma2)
}

/// Least-squares AR(p) coefficients of the demeaned series, zeros when the
/// system is singular or the solution is not stationary
fn ols_ar_start(series: &[f64], mean: f64, p: usize) -> Vec<f64> {
    let zeros = vec![0.0; p];
    let rows = series.len().saturating_sub(p);
    if p == 0 || rows <= p {
        return zeros;
    }

    let x = DMatrix::from_fn(rows, p, |r, c| series[r + p - 1 - c] - mean);
    let y = DVector::from_fn(rows, |r, _| series[r + p] - mean);
    let xt = x.transpose();

    match (&xt * &x).lu().solve(&(&xt * &y)) {
        Some(coefficients) if coefficients.iter().all(|c| c.is_finite()) => {
            let coefficients: Vec<f64> = coefficients.iter().copied().collect();
            if is_stationary(&coefficients) {
                coefficients
            } else {
                zeros
            }
        }
        _ => zeros,
    }
}

/// True when `1 - φ_1 z - ... - φ_p z^p` has every root outside the unit circle.
///
/// Steps the coefficients down to partial autocorrelations; the polynomial
/// is stable iff each has magnitude below one.
pub(crate) fn is_stationary(coefficients: &[f64]) -> bool {
    let mut current = coefficients.to_vec();
    while let Some(&last) = current.last() {
        if !last.is_finite() || last.abs() >= 1.0 {
            return false;
        }
        let k = current.len();
        let scale = 1.0 - last * last;
        current = (0..k - 1)
            .map(|j| (current[j] + last * current[k - 2 - j]) / scale)
            .collect();
    }
    true
}

/// True when `1 + θ_1 z + ... + θ_q z^q` has every root outside the unit circle
pub(crate) fn is_invertible(coefficients: &[f64]) -> bool {
    let negated: Vec<f64> = coefficients.iter().map(|c| -c).collect();
    is_stationary(&negated)
}

/// Online ARMA forecaster with periodic order re-estimation
#[derive(Debug, Clone)]
pub struct ArmaModel {
    range: OrderRange,
    forecast_length: usize,
    schedule: ReestimationSchedule,
    optimizer: NelderMeadConfig,
    fit: ArmaFit,
    reestimations: u64,
}

impl ArmaModel {
    /// Select the order on `history` and fit it
    pub fn new(history: &[f64], config: &ForecastConfig) -> Result<Self, ComputeError> {
        let range = OrderRange::new(config.order_min, config.order_max)?;
        let optimizer = NelderMeadConfig::default();
        let (order, fit) = Self::search(history, &range, &optimizer)?;
        info!(%order, aic = fit.aic, observations = history.len(), "ARMA order selected");

        Ok(Self {
            range,
            forecast_length: config.forecast_length,
            schedule: ReestimationSchedule::new(config.reestimate_every)?,
            optimizer,
            fit,
            reestimations: 0,
        })
    }

    fn search(
        history: &[f64],
        range: &OrderRange,
        optimizer: &NelderMeadConfig,
    ) -> Result<(Order, ArmaFit), ComputeError> {
        select_order(range, |order| fit_arma(history, order, optimizer))
    }

    /// Order minimizing AIC over the configured range
    pub fn estimate_order(&self, history: &[f64]) -> Result<Order, ComputeError> {
        Self::search(history, &self.range, &self.optimizer).map(|(order, _)| order)
    }

    /// Refit on `history` and forecast `forecast_length` values.
    ///
    /// Every `reestimate_every`-th call selects the order again first. A
    /// failed fit leaves the previous fit in place and is returned.
    pub fn update_and_predict(&mut self, history: &[f64]) -> Result<Vec<f64>, ComputeError> {
        let fit = if self.schedule.tick() {
            let (order, fit) = Self::search(history, &self.range, &self.optimizer)?;
            self.reestimations += 1;
            info!(
                previous = %self.fit.order,
                %order,
                call = self.schedule.calls(),
                "ARMA order re-estimated"
            );
            fit
        } else {
            fit_arma(history, self.fit.order, &self.optimizer)?
        };

        self.fit = fit;
        Ok(self.fit.forecast(self.forecast_length))
    }

    /// Residuals of the most recent fit
    pub fn residuals(&self) -> &[f64] {
        &self.fit.residuals
    }

    pub fn order(&self) -> Order {
        self.fit.order
    }

    pub fn fit(&self) -> &ArmaFit {
        &self.fit
    }

    /// Calls to `update_and_predict` so far
    pub fn calls(&self) -> u64 {
        self.schedule.calls()
    }

    pub fn reestimations(&self) -> u64 {
        self.reestimations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn standard_normal(rng: &mut StdRng) -> f64 {
        // Box-Muller
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn make_ar1(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut value = 0.0;
        (0..n)
            .map(|_| {
                value = phi * value + standard_normal(&mut rng);
                value
            })
            .collect()
    }

    fn make_uniform(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen::<f64>()).collect()
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let series = make_ar1(0.6, 500, 7);
        let fit = fit_arma(&series, Order::new(1, 0), &NelderMeadConfig::default()).unwrap();
        assert!((fit.ar[0] - 0.6).abs() < 0.15, "phi = {}", fit.ar[0]);
        assert!((fit.sigma2 - 1.0).abs() < 0.25, "sigma2 = {}", fit.sigma2);
        assert_eq!(fit.residuals.len(), series.len());
    }

    #[test]
    fn test_ar1_forecast_reverts_to_mean() {
        let series = make_ar1(0.6, 300, 11);
        let fit = fit_arma(&series, Order::new(1, 0), &NelderMeadConfig::default()).unwrap();
        let forecast = fit.forecast(10);
        assert_eq!(forecast.len(), 10);
        assert!((forecast[9] - fit.mean).abs() <= (forecast[0] - fit.mean).abs() + 1e-12);
    }

    #[test]
    fn test_residuals_of_white_noise_model() {
        let residuals = arma_residuals(&[1.0, 2.0, 3.0], 2.0, &[], &[]);
        assert_eq!(residuals, vec![-1.0, 0.0, 1.0]);

        // AR(1) with phi 0.5: e_1 = 0 - 0.5 * (-1)
        let residuals = arma_residuals(&[1.0, 2.0], 2.0, &[0.5], &[]);
        assert_eq!(residuals, vec![-1.0, 0.5]);
    }

    #[test]
    fn test_stationarity_region() {
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(is_stationary(&[1.5, -0.6]));
        assert!(!is_stationary(&[0.5, 0.6]));
        assert!(is_stationary(&[]));
        assert!(is_invertible(&[0.9]));
        assert!(!is_invertible(&[-1.2]));
    }

    #[test]
    fn test_short_series_rejected() {
        let result = fit_arma(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], Order::new(2, 2), &NelderMeadConfig::default());
        assert!(matches!(result, Err(ComputeError::ModelFitError(_))));
    }

    #[test]
    fn test_non_finite_series_rejected() {
        let mut series = make_uniform(50, 1);
        series[10] = f64::NAN;
        assert!(fit_arma(&series, Order::new(1, 1), &NelderMeadConfig::default()).is_err());
    }

    #[test]
    fn test_order_within_range() {
        let series = make_uniform(100, 3);
        let model = ArmaModel::new(&series, &ForecastConfig::default()).unwrap();
        let order = model.estimate_order(&series).unwrap();
        assert!((2..=5).contains(&order.p));
        assert!((2..=5).contains(&order.q));
        assert_eq!(model.residuals().len(), 100);
    }

    #[test]
    fn test_update_and_predict_horizon_and_schedule() {
        let config = ForecastConfig {
            reestimate_every: 2,
            order_max: 3,
            ..Default::default()
        };
        let series = make_uniform(120, 5);
        let mut model = ArmaModel::new(&series[..100], &config).unwrap();

        let forecast = model.update_and_predict(&series[..80]).unwrap();
        assert_eq!(forecast.len(), 10);
        assert!(forecast.iter().all(|f| f.is_finite()));
        assert_eq!(model.residuals().len(), 80);
        assert_eq!(model.reestimations(), 0);

        model.update_and_predict(&series[20..]).unwrap();
        assert_eq!(model.reestimations(), 1);
        assert_eq!(model.calls(), 2);
    }
}
