// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A generic Nelder-Mead downhill-simplex minimiser, used by the ring fitter
//! (§4.5) and the inclination refinement in the parameter guesser (§4.7).

use crate::constants::EPSILON;

#[derive(Clone, Copy, Debug)]
pub struct SimplexOptions {
    /// Stop when `2*|f_high - f_low| / (|f_high| + |f_low| + eps) < tol`.
    pub tol: f64,
    /// Stop after this many objective evaluations regardless of
    /// convergence.
    pub max_evaluations: usize,
    pub alpha: f64,
    pub gamma: f64,
    pub rho: f64,
    pub sigma: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            tol: crate::constants::DEFAULT_TOL,
            max_evaluations: crate::constants::DEFAULT_MAX_EVALUATIONS,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimplexResult {
    pub best: Vec<f64>,
    pub best_value: f64,
    pub converged: bool,
    pub evaluations: usize,
    /// Standard deviation of each parameter across the final simplex's
    /// vertices, usable as a rough per-parameter uncertainty.
    pub stddev: Vec<f64>,
}

/// Minimise `objective` starting from `initial`, building the initial
/// simplex by perturbing each coordinate by `perturbations[i]` (absolute
/// units, same convention as §4.5: a fraction of the parameter's value,
/// already multiplied in by the caller).
///
/// `objective` must return `f64::INFINITY` (or any large finite sentinel)
/// for invalid points rather than panicking; the simplex naturally reflects
/// away from such points.
pub fn simplex_minimise<F>(
    initial: &[f64],
    perturbations: &[f64],
    options: &SimplexOptions,
    mut objective: F,
) -> SimplexResult
where
    F: FnMut(&[f64]) -> f64,
{
    let n = initial.len();
    assert_eq!(perturbations.len(), n);
    assert!(n >= 1);

    let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    vertices.push(initial.to_vec());
    for i in 0..n {
        let mut v = initial.to_vec();
        let step = if perturbations[i].abs() > EPSILON {
            perturbations[i]
        } else {
            0.01
        };
        v[i] += step;
        vertices.push(v);
    }

    let mut values: Vec<f64> = vertices.iter().map(|v| objective(v)).collect();
    let mut evaluations = n + 1;
    let mut converged = false;

    while evaluations < options.max_evaluations {
        // Order vertices by objective value.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        let best_idx = order[0];
        let worst_idx = order[n];
        let second_worst_idx = order[n - 1];

        let f_low = values[best_idx];
        let f_high = values[worst_idx];
        let denom = f_low.abs() + f_high.abs() + EPSILON;
        if 2.0 * (f_high - f_low).abs() / denom < options.tol {
            converged = true;
            break;
        }

        // Centroid of all points except the worst.
        let mut centroid = vec![0.0; n];
        for &idx in &order[..n] {
            for (c, v) in centroid.iter_mut().zip(&vertices[idx]) {
                *c += v / n as f64;
            }
        }

        let reflect = |centroid: &[f64], worst: &[f64], coeff: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(worst)
                .map(|(c, w)| c + coeff * (c - w))
                .collect()
        };

        let xr = reflect(&centroid, &vertices[worst_idx], options.alpha);
        let fr = objective(&xr);
        evaluations += 1;

        if fr < values[best_idx] {
            // Expansion.
            let xe = reflect(&centroid, &vertices[worst_idx], options.alpha * options.gamma);
            let fe = objective(&xe);
            evaluations += 1;
            if fe < fr {
                vertices[worst_idx] = xe;
                values[worst_idx] = fe;
            } else {
                vertices[worst_idx] = xr;
                values[worst_idx] = fr;
            }
        } else if fr < values[second_worst_idx] {
            vertices[worst_idx] = xr;
            values[worst_idx] = fr;
        } else {
            // Contraction.
            let xc = if fr < f_high {
                reflect(&centroid, &vertices[worst_idx], options.alpha * options.rho)
            } else {
                reflect(&centroid, &vertices[worst_idx], -options.rho)
            };
            let fc = objective(&xc);
            evaluations += 1;
            if fc < f_high.min(fr) {
                vertices[worst_idx] = xc;
                values[worst_idx] = fc;
            } else {
                // Shrink toward the best vertex.
                let best_vertex = vertices[best_idx].clone();
                for &idx in &order[1..] {
                    for (v, b) in vertices[idx].iter_mut().zip(&best_vertex) {
                        *v = b + options.sigma * (*v - b);
                    }
                    values[idx] = objective(&vertices[idx]);
                    evaluations += 1;
                }
            }
        }

        if evaluations >= options.max_evaluations {
            break;
        }
    }

    let best_order = {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        order
    };
    let best_idx = best_order[0];

    let stddev = (0..n)
        .map(|i| {
            let mean = vertices.iter().map(|v| v[i]).sum::<f64>() / (n + 1) as f64;
            let var = vertices
                .iter()
                .map(|v| (v[i] - mean).powi(2))
                .sum::<f64>()
                / (n + 1) as f64;
            var.sqrt()
        })
        .collect();

    SimplexResult {
        best: vertices[best_idx].clone(),
        best_value: values[best_idx],
        converged,
        evaluations,
        stddev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_minimum_of_quadratic_1d() {
        let target = 42.0;
        let result = simplex_minimise(
            &[0.0],
            &[1.0],
            &SimplexOptions::default(),
            |p| (p[0] - target).powi(2),
        );
        assert!(
            (result.best[0] - target).abs() < 1e-2,
            "got {:?}",
            result.best
        );
    }

    #[test]
    fn recovers_minimum_of_quadratic_2d() {
        let targets = [3.0, -7.0];
        let result = simplex_minimise(
            &[0.0, 0.0],
            &[1.0, 1.0],
            &SimplexOptions::default(),
            |p| (p[0] - targets[0]).powi(2) + (p[1] - targets[1]).powi(2),
        );
        assert!((result.best[0] - targets[0]).abs() < 1e-2);
        assert!((result.best[1] - targets[1]).abs() < 1e-2);
    }

    #[test]
    fn infinite_objective_is_reflected_away() {
        let result = simplex_minimise(
            &[5.0],
            &[0.5],
            &SimplexOptions {
                max_evaluations: 200,
                ..Default::default()
            },
            |p| if p[0] < 0.0 { f64::INFINITY } else { p[0].powi(2) },
        );
        assert!(result.best[0] >= 0.0);
        assert!(result.best[0] < 1.0);
    }
}
