// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small numeric helpers shared by the analysis, insight, and prediction
//! modules.
//!
//! Every function here is total: degenerate inputs (empty slices, zero
//! variance) produce a well-defined value rather than an error, matching the
//! engine's rule that too little data is a structured result, not a failure.

/// The arithmetic mean, 0.0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// The population variance, 0.0 for fewer than two values.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// The population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// A least-squares line through a set of points.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LinearFit {
    pub(crate) slope: f64,
    pub(crate) intercept: f64,
}

impl LinearFit {
    /// The fitted value at `x`.
    pub(crate) fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits a least-squares line to `(x, y)` points.
///
/// Returns `None` with fewer than two points or when every `x` is the same
/// (a vertical line has no usable slope).
pub(crate) fn linear_fit(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let x_sum: f64 = points.iter().map(|(x, _)| x).sum();
    let y_sum: f64 = points.iter().map(|(_, y)| y).sum();
    let xy_sum: f64 = points.iter().map(|(x, y)| x * y).sum();
    let x_squared_sum: f64 = points.iter().map(|(x, _)| x.powi(2)).sum();

    let denominator = n * x_squared_sum - x_sum.powi(2);
    if denominator.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * xy_sum - x_sum * y_sum) / denominator;
    let intercept = (y_sum - slope * x_sum) / n;
    Some(LinearFit { slope, intercept })
}

/// The phi coefficient between two binary vectors of equal length.
///
/// Phi measures association between two yes/no variables: +1 for perfect
/// agreement, -1 for perfect disagreement, 0 for independence. Returns 0.0
/// when either variable is constant (a zero marginal makes phi undefined).
pub(crate) fn phi_coefficient(a: &[bool], b: &[bool]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut n11 = 0.0_f64;
    let mut n10 = 0.0_f64;
    let mut n01 = 0.0_f64;
    let mut n00 = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        match (x, y) {
            (true, true) => n11 += 1.0,
            (true, false) => n10 += 1.0,
            (false, true) => n01 += 1.0,
            (false, false) => n00 += 1.0,
        }
    }

    let denominator = ((n11 + n10) * (n01 + n00) * (n11 + n01) * (n10 + n00)).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    (n11 * n00 - n10 * n01) / denominator
}

/// The nearest-rank percentile of an already-sorted slice.
///
/// `p` is a fraction in `[0, 1]`. Returns 0.0 for an empty slice.
pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
