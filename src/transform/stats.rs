//! Summary statistics over finite values.

use rayon::prelude::*;

/// Count, mean, spread and bounds of the finite values of a sample.
///
/// Accumulated with Welford's update and merged pairwise, so partial
/// results from parallel chunks combine exactly like a single pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    /// Sum of squared deviations from the mean
    pub m2: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Stats {
    /// Statistics of the finite entries of `values`. NaN and infinities are
    /// skipped.
    pub fn from_values(values: &[f64]) -> Self {
        values
            .par_iter()
            .fold(Stats::default, |acc, &x| acc.push(x))
            .reduce(Stats::default, Stats::merge)
    }

    /// Add one value.
    pub fn push(mut self, x: f64) -> Self {
        if !x.is_finite() {
            return self;
        }
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self
    }

    /// Combine two disjoint partial results.
    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let (n_a, n_b) = (self.count as f64, other.count as f64);
        Self {
            count,
            mean: self.mean + delta * n_b / count as f64,
            m2: self.m2 + other.m2 + delta * delta * n_a * n_b / count as f64,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Value at percentile `p` (0 to 100) of `sorted`, using the nearest rank
/// `round((n - 1) * p / 100)`.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = (last as f64 * p / 100.0).round() as usize;
    sorted.get(rank.min(last)).copied()
}

/// Finite entries of `values`, sorted ascending.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.par_iter().copied().filter(|x| x.is_finite()).collect();
    sorted.par_sort_unstable_by(f64::total_cmp);
    sorted
}
