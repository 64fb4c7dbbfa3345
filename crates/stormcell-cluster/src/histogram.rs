//! Equidistant histograms and rank correlation.

use serde::{Deserialize, Serialize};

/// An equidistant histogram over one value variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    bins: Vec<usize>,
    min: f64,
    max: f64,
}

impl Histogram {
    /// Bin `values` into `bins` equidistant buckets spanning their own
    /// range.
    ///
    /// A degenerate sample (all values equal, or empty) collapses to a
    /// single bin holding everything.
    pub fn from_values(values: &[f64], bins: usize) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        if min > max {
            (min, max) = (0.0, 0.0);
        }
        Self::from_values_in_range(values, bins, min, max)
    }

    /// Bin `values` into `bins` equidistant buckets over a caller-supplied
    /// range.
    ///
    /// Histograms meant to be correlated against each other must share a
    /// range, or their bins describe different value intervals. Values
    /// outside the range land in the edge bins. A degenerate range
    /// collapses to a single bin.
    pub fn from_values_in_range(values: &[f64], bins: usize, min: f64, max: f64) -> Self {
        if values.is_empty() || bins == 0 {
            return Self {
                bins: vec![0],
                min,
                max,
            };
        }
        if min >= max {
            return Self {
                bins: vec![values.len()],
                min,
                max,
            };
        }
        let mut counts = vec![0usize; bins];
        let width = (max - min) / bins as f64;
        for &v in values {
            let i = (((v - min) / width) as usize).min(bins - 1);
            counts[i] += 1;
        }
        Self {
            bins: counts,
            min,
            max,
        }
    }

    /// Bin counts.
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Total number of samples.
    pub fn total(&self) -> usize {
        self.bins.iter().sum()
    }

    /// Value range covered.
    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Kendall rank correlation (tau-b) of the bin counts of two
    /// histograms.
    ///
    /// Returns a value in `[-1, 1]`. Mismatched bin counts or a degenerate
    /// denominator (all ties in either sequence) yield `-1.0`, the worst
    /// possible correlation, so degenerate pairs never win a match on the
    /// histogram term.
    pub fn correlate_kendall(&self, other: &Histogram) -> f64 {
        let x = &self.bins;
        let y = &other.bins;
        if x.len() != y.len() || x.len() < 2 {
            return -1.0;
        }
        let n = x.len();
        let mut concordant = 0i64;
        let mut discordant = 0i64;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = (x[j] as i64 - x[i] as i64).signum();
                let dy = (y[j] as i64 - y[i] as i64).signum();
                if dx == 0 || dy == 0 {
                    continue;
                }
                if dx == dy {
                    concordant += 1;
                } else {
                    discordant += 1;
                }
            }
        }
        let n0 = (n * (n - 1) / 2) as i64;
        let denom = (((n0 - tied_pairs(x)) as f64) * ((n0 - tied_pairs(y)) as f64)).sqrt();
        if denom == 0.0 || !denom.is_finite() {
            return -1.0;
        }
        (concordant - discordant) as f64 / denom
    }
}

/// Number of tied pairs within one sequence: sum over groups of t*(t-1)/2.
fn tied_pairs(seq: &[usize]) -> i64 {
    let mut sorted = seq.to_vec();
    sorted.sort_unstable();
    let mut total = 0i64;
    let mut run = 1i64;
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            run += 1;
        } else {
            total += run * (run - 1) / 2;
            run = 1;
        }
    }
    total + run * (run - 1) / 2
}
