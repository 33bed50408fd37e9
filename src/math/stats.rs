// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust location/scale estimators (§4.8). Used by the source finder to set
//! noise-referenced thresholds and by the guesser's PA search.

use crate::constants::MADFM_TO_SIGMA;

/// A robust summary of an array of samples, with an optional threshold
/// flagging which values count as "detected".
#[derive(Clone, Copy, Debug, Default)]
pub struct Statistics {
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
    /// Median absolute deviation from the median.
    pub madfm: f64,
}

impl Statistics {
    /// Compute mean, stddev, median and MADFM over `values`, skipping
    /// `NaN`s. A scratch buffer is used so the input is never reordered.
    pub fn compute(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self::default();
        }

        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        let median = median_of(&finite);
        let abs_dev: Vec<f64> = finite.iter().map(|v| (v - median).abs()).collect();
        let madfm = median_of(&abs_dev);

        Self {
            mean,
            stddev,
            median,
            madfm,
        }
    }

    /// Robust noise estimate `sigma ~= MADFM / 0.6745`, valid for
    /// approximately Gaussian data.
    pub fn robust_sigma(&self) -> f64 {
        self.madfm / MADFM_TO_SIGMA
    }
}

/// Median of a scratch copy of `values` via a partition-based selection
/// (equivalent to `nth_element`); does not mutate the caller's slice.
fn median_of(values: &[f64]) -> f64 {
    let mut scratch = values.to_vec();
    let n = scratch.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    let (_, mid_val, _) = scratch.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap());
    let mid_val = *mid_val;
    if n % 2 == 1 {
        mid_val
    } else {
        let (_, lower_val, _) =
            scratch.select_nth_unstable_by(mid - 1, |a, b| a.partial_cmp(b).unwrap());
        0.5 * (mid_val + *lower_val)
    }
}

/// A flux threshold, either an absolute value or a signal-to-noise cut
/// referenced to a robust noise estimate.
#[derive(Clone, Copy, Debug)]
pub enum Threshold {
    Absolute(f64),
    SnrCut(f64),
}

impl Threshold {
    /// Resolve this threshold to an absolute flux value given the cube's
    /// robust noise estimate.
    pub fn resolve(&self, robust_sigma: f64) -> f64 {
        match self {
            Threshold::Absolute(v) => *v,
            Threshold::SnrCut(snr) => snr * robust_sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_length() {
        assert_eq!(median_of(&[3.0, 1.0, 2.0]), 2.0);
    }

    #[test]
    fn median_of_even_length() {
        assert_eq!(median_of(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn stats_on_constant_array() {
        let s = Statistics::compute(&[5.0; 10]);
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.stddev, 0.0);
        assert_eq!(s.median, 5.0);
        assert_eq!(s.madfm, 0.0);
    }

    #[test]
    fn stats_ignore_nan() {
        let s = Statistics::compute(&[1.0, 2.0, 3.0, f64::NAN]);
        assert!((s.mean - 2.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_resolves_snr_against_sigma() {
        let t = Threshold::SnrCut(4.0);
        assert_eq!(t.resolve(2.0), 8.0);
    }
}
