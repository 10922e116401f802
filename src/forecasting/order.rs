//! Structural order selection
//!
//! Both forecast models pick their lag depths `(p, q)` by fitting every
//! candidate in a square grid and keeping the lowest information criterion.
//! Order search is expensive, so models only repeat it on a fixed cadence.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lag depths of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub p: usize,
    pub q: usize,
}

impl Order {
    pub fn new(p: usize, q: usize) -> Self {
        Self { p, q }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.p, self.q)
    }
}

/// Inclusive range searched for both `p` and `q`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRange {
    pub min: usize,
    pub max: usize,
}

impl OrderRange {
    pub fn new(min: usize, max: usize) -> Result<Self, ComputeError> {
        if min == 0 || min > max {
            return Err(ComputeError::ConfigurationError(format!(
                "order range [{}, {}] is invalid",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, order: Order) -> bool {
        (self.min..=self.max).contains(&order.p) && (self.min..=self.max).contains(&order.q)
    }

    /// Candidates in search order: ascending p, then ascending q
    pub fn candidates(&self) -> impl Iterator<Item = Order> + '_ {
        (self.min..=self.max).flat_map(move |p| (self.min..=self.max).map(move |q| Order::new(p, q)))
    }
}

/// A fitted model that can be ranked by information criterion (lower is better)
pub trait InformationCriterion {
    fn aic(&self) -> f64;
}

/// Fit every candidate order and keep the one with the lowest criterion.
///
/// Candidates whose fit fails, or whose criterion is not finite, are skipped.
/// Ties keep the first candidate found.
pub fn select_order<M, F>(range: &OrderRange, mut fit: F) -> Result<(Order, M), ComputeError>
where
    M: InformationCriterion,
    F: FnMut(Order) -> Result<M, ComputeError>,
{
    let mut best: Option<(Order, M)> = None;
    let mut failures = 0usize;

    for order in range.candidates() {
        let model = match fit(order) {
            Ok(model) if model.aic().is_finite() => model,
            Ok(model) => {
                failures += 1;
                debug!(%order, aic = model.aic(), "order candidate skipped: criterion not finite");
                continue;
            }
            Err(err) => {
                failures += 1;
                debug!(%order, error = %err, "order candidate skipped: fit failed");
                continue;
            }
        };

        let improves = best
            .as_ref()
            .map_or(true, |(_, current)| model.aic() < current.aic());
        if improves {
            best = Some((order, model));
        }
    }

    best.ok_or_else(|| {
        ComputeError::NoUsableOrder(format!(
            "all {} candidates in [{}, {}] failed to fit",
            failures, range.min, range.max
        ))
    })
}

/// Counts calls and reports which ones must re-estimate the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReestimationSchedule {
    every: u64,
    calls: u64,
}

impl ReestimationSchedule {
    pub fn new(every: u64) -> Result<Self, ComputeError> {
        if every == 0 {
            return Err(ComputeError::ConfigurationError(
                "re-estimation cadence must be positive".to_string(),
            ));
        }
        Ok(Self { every, calls: 0 })
    }

    /// Register one call; true on every `every`-th call
    pub fn tick(&mut self) -> bool {
        self.calls += 1;
        self.calls % self.every == 0
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn every(&self) -> u64 {
        self.every
    }
}
