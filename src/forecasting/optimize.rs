//! Nelder–Mead simplex minimizer.
//!
//! Derivative-free minimization used by the ARMA and GARCH likelihood fits.
//! Objectives signal infeasible parameters by returning a non-finite value;
//! such points are ranked last and the simplex moves away from them.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NelderMeadConfig
// ---------------------------------------------------------------------------

/// Stopping rules and initial simplex size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NelderMeadConfig {
    /// Iteration cap per dimension
    pub iterations_per_dimension: usize,
    /// Converged when every vertex lies within this distance of the best (per coordinate)
    pub x_tolerance: f64,
    /// ... and every vertex value lies within this distance of the best value
    pub f_tolerance: f64,
    /// Relative perturbation of nonzero start coordinates
    pub relative_step: f64,
    /// Absolute perturbation of zero start coordinates
    pub zero_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            iterations_per_dimension: 200,
            x_tolerance: 1e-6,
            f_tolerance: 1e-8,
            relative_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

// ---------------------------------------------------------------------------
// Minimum
// ---------------------------------------------------------------------------

/// Best point found
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

// Standard coefficients: reflection, expansion, contraction, shrink
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Minimize `objective` starting from `start`.
///
/// NaN objective values are treated as `+inf`.
pub fn minimize<F>(objective: F, start: &DVector<f64>, config: &NelderMeadConfig) -> Minimum
where
    F: Fn(&DVector<f64>) -> f64,
{
    let n = start.len();
    let evaluate = |x: &DVector<f64>| {
        let value = objective(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };

    if n == 0 {
        return Minimum {
            point: start.clone(),
            value: evaluate(start),
            iterations: 0,
            converged: true,
        };
    }

    // Initial simplex: start plus one perturbed vertex per coordinate
    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((start.clone(), evaluate(start)));
    for i in 0..n {
        let mut vertex = start.clone();
        vertex[i] = if vertex[i] != 0.0 {
            vertex[i] * (1.0 + config.relative_step)
        } else {
            config.zero_step
        };
        let value = evaluate(&vertex);
        simplex.push((vertex, value));
    }

    let max_iterations = config.iterations_per_dimension * n;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        if has_converged(&simplex, config) {
            converged = true;
            break;
        }
        iterations += 1;

        // Centroid of every vertex but the worst
        let centroid = simplex[..n]
            .iter()
            .fold(DVector::zeros(n), |acc, (x, _)| acc + x)
            / n as f64;

        let worst = simplex[n].clone();
        let best_value = simplex[0].1;
        let second_worst_value = simplex[n - 1].1;

        let reflected = &centroid + (&centroid - &worst.0) * ALPHA;
        let reflected_value = evaluate(&reflected);

        if reflected_value < best_value {
            let expanded = &centroid + (&reflected - &centroid) * GAMMA;
            let expanded_value = evaluate(&expanded);
            simplex[n] = if expanded_value < reflected_value {
                (expanded, expanded_value)
            } else {
                (reflected, reflected_value)
            };
            continue;
        }

        if reflected_value < second_worst_value {
            simplex[n] = (reflected, reflected_value);
            continue;
        }

        // Contract towards the better of the worst and reflected points
        let (toward, toward_value) = if reflected_value < worst.1 {
            (reflected, reflected_value)
        } else {
            (worst.0.clone(), worst.1)
        };
        let contracted = &centroid + (&toward - &centroid) * RHO;
        let contracted_value = evaluate(&contracted);
        if contracted_value < toward_value {
            simplex[n] = (contracted, contracted_value);
            continue;
        }

        // Shrink everything towards the best vertex
        let best = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let shrunk = &best + (&vertex.0 - &best) * SIGMA;
            let value = evaluate(&shrunk);
            *vertex = (shrunk, value);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (point, value) = simplex.swap_remove(0);
    Minimum {
        point,
        value,
        iterations,
        converged,
    }
}

fn has_converged(simplex: &[(DVector<f64>, f64)], config: &NelderMeadConfig) -> bool {
    let (best, best_value) = &simplex[0];
    if !best_value.is_finite() {
        return false;
    }
    simplex[1..].iter().all(|(x, value)| {
        (value - best_value).abs() <= config.f_tolerance
            && (x - best).amax() <= config.x_tolerance
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let objective = |x: &DVector<f64>| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let result = minimize(objective, &DVector::from_vec(vec![0.0, 0.0]), &NelderMeadConfig::default());
        assert!(result.converged);
        assert!((result.point[0] - 3.0).abs() < 1e-4);
        assert!((result.point[1] + 1.0).abs() < 1e-4);
        assert!(result.value < 1e-8);
    }

    #[test]
    fn test_rosenbrock() {
        let objective =
            |x: &DVector<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let config = NelderMeadConfig {
            iterations_per_dimension: 2000,
            ..Default::default()
        };
        let result = minimize(objective, &DVector::from_vec(vec![-1.2, 1.0]), &config);
        assert!((result.point[0] - 1.0).abs() < 1e-3);
        assert!((result.point[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_infeasible_region_avoided() {
        // Minimum of x^2 restricted to x >= 0.5
        let objective = |x: &DVector<f64>| if x[0] < 0.5 { f64::INFINITY } else { x[0] * x[0] };
        let result = minimize(objective, &DVector::from_vec(vec![2.0]), &NelderMeadConfig::default());
        assert!(result.value.is_finite());
        assert!(result.point[0] >= 0.5);
        assert!(result.point[0] < 0.51);
    }

    #[test]
    fn test_nan_treated_as_infinite() {
        let objective = |x: &DVector<f64>| if x[0] > 1.0 { f64::NAN } else { (x[0] - 0.2).powi(2) };
        let result = minimize(objective, &DVector::from_vec(vec![0.9]), &NelderMeadConfig::default());
        assert!((result.point[0] - 0.2).abs() < 1e-4);
    }
}
