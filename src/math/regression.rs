// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Small regression helpers used by the fitter's regularisation pass
//! (§4.5): a least-squares polynomial fit and a Bezier-smoothed
//! interpolation, either of which can replace a ring parameter's radial
//! profile with a smoothed version.

/// Fit a degree-`degree` polynomial to `(xs, ys)` by least squares (normal
/// equations, solved by Gaussian elimination with partial pivoting).
/// Returns coefficients lowest-order first; `None` if the system is
/// singular (fewer than `degree + 1` distinct points).
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    let n = degree + 1;
    if xs.len() < n {
        return None;
    }

    // Normal equations: A^T A c = A^T y, A[i][j] = xs[i]^j.
    let mut ata = vec![vec![0.0; n]; n];
    let mut aty = vec![0.0; n];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0; n];
        for k in 1..n {
            powers[k] = powers[k - 1] * x;
        }
        for i in 0..n {
            aty[i] += powers[i] * y;
            for j in 0..n {
                ata[i][j] += powers[i] * powers[j];
            }
        }
    }

    solve_linear_system(ata, aty)
}

/// Evaluate a polynomial with `coeffs` (lowest-order first) at `x`.
pub fn eval_polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting. Returns
/// `None` if `A` is (numerically) singular.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().partial_cmp(&a[j][col].abs()).unwrap())?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// Smooth `values` (assumed ordered by an independent variable, e.g. ring
/// radius) by treating them as Bezier control points and re-sampling the
/// curve at the same number of evenly-spaced parameter values. This is the
/// `POLYN = -1` regularisation mode.
pub fn bezier_smooth(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 3 {
        return values.to_vec();
    }
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            de_casteljau(values, t)
        })
        .collect()
}

fn de_casteljau(points: &[f64], t: f64) -> f64 {
    let mut scratch = points.to_vec();
    let n = scratch.len();
    for k in 1..n {
        for i in 0..(n - k) {
            scratch[i] = scratch[i] * (1.0 - t) + scratch[i + 1] * t;
        }
    }
    scratch[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let coeffs = fit_polynomial(&xs, &ys, 1).unwrap();
        assert!((coeffs[0] - 1.0).abs() < 1e-9);
        assert!((coeffs[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn eval_matches_fit_at_sample_points() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 0.0, 1.0, 4.0, 9.0];
        let coeffs = fit_polynomial(&xs, &ys, 2).unwrap();
        for (&x, &y) in xs.iter().zip(&ys) {
            let got = eval_polynomial(&coeffs, x);
            assert!((got - y).abs() < 1e-6, "x={x} got={got} want={y}");
        }
    }

    #[test]
    fn bezier_smooth_preserves_endpoints() {
        let values = [1.0, 5.0, 2.0, 8.0, 3.0];
        let smoothed = bezier_smooth(&values);
        assert!((smoothed[0] - values[0]).abs() < 1e-9);
        assert!((smoothed[4] - values[4]).abs() < 1e-9);
    }

    #[test]
    fn too_few_points_returns_none() {
        assert!(fit_polynomial(&[0.0, 1.0], &[0.0, 1.0], 3).is_none());
    }
}
