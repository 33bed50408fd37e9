// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The tilted-ring fitter ("Galfit", §4.5): per-ring downhill-simplex
//! minimisation of the residual evaluator, with an optional second
//! regularisation pass.

mod error;
pub use error::GalfitError;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use rayon::prelude::*;

use crate::cube::{Cube, Header};
use crate::galmod::{Galmod, GalmodOptions};
use crate::math::regression::{bezier_smooth, fit_polynomial, eval_polynomial};
use crate::math::simplex::{simplex_minimise, SimplexOptions};
use crate::progress::ProgressReporter;
use crate::residual::{self, ResidualContext, ResidualOptions};
use crate::ring::{FreeParam, Ring, RingSet};

/// A second-pass regularisation of one or more ring parameters' radial
/// profiles, after which the remaining free parameters are refit per ring
/// with the regularised ones held fixed (§4.5, "second pass").
#[derive(Clone, Debug)]
pub struct Regularisation {
    pub params: Vec<FreeParam>,
    /// Polynomial degree, or `-1` for a Bezier-smoothed interpolation.
    pub polyn: i32,
}

#[derive(Clone, Debug)]
pub struct GalfitOptions {
    pub free: Vec<FreeParam>,
    pub residual: ResidualOptions,
    pub simplex: SimplexOptions,
    /// Options used for the disposable full-ring-set cube synthesis
    /// performed at every objective evaluation.
    pub synth: GalmodOptions,
    pub regularise: Option<Regularisation>,
    pub compute_errors: bool,
}

/// Outcome of fitting a single ring.
#[derive(Clone, Debug)]
struct FitOutcome {
    ring: Ring,
    not_converged: bool,
    no_data: bool,
    errors: Option<HashMap<FreeParam, f64>>,
}

#[derive(Clone, Debug)]
pub struct GalfitResult {
    pub rings: RingSet,
    pub not_converged: Vec<bool>,
    pub no_data: Vec<bool>,
    pub errors: Option<Vec<HashMap<FreeParam, f64>>>,
    pub cancelled: bool,
}

#[derive(Clone, Debug)]
pub struct Galfit {
    pub options: GalfitOptions,
}

impl Galfit {
    pub fn new(options: GalfitOptions) -> Self {
        Self { options }
    }

    /// Fit `initial` against `observed`. `cancel` is polled at every
    /// objective evaluation; once set, outstanding rings stop early and the
    /// best ring set found so far is returned with `cancelled = true`.
    pub fn fit(
        &self,
        header: &Header,
        observed: &Cube,
        ctx: &ResidualContext,
        initial: RingSet,
        cancel: &AtomicBool,
        progress: Option<&ProgressReporter>,
    ) -> Result<GalfitResult, GalfitError> {
        if self.options.free.is_empty() {
            return Err(GalfitError::NoFreeParameters);
        }

        let (rings, not_converged, no_data, errors) = self.fit_all_rings(
            header,
            observed,
            &initial,
            &self.options.free,
            ctx,
            cancel,
            progress,
        )?;

        let mut result = GalfitResult {
            rings,
            not_converged,
            no_data,
            errors,
            cancelled: cancel.load(Ordering::Relaxed),
        };

        if result.cancelled {
            return Ok(result);
        }

        interpolate_no_data(&mut result.rings, &result.no_data, &self.options.free);

        if let Some(regularise) = &self.options.regularise {
            self.regularise_and_refit(header, observed, ctx, &mut result, regularise, cancel, progress)?;
        }

        if result.not_converged.iter().any(|&b| b) {
            warn!(
                "{} ring(s) failed to converge",
                result.not_converged.iter().filter(|&&b| b).count()
            );
        }

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn fit_all_rings(
        &self,
        header: &Header,
        observed: &Cube,
        rings: &RingSet,
        free: &[FreeParam],
        ctx: &ResidualContext,
        cancel: &AtomicBool,
        progress: Option<&ProgressReporter>,
    ) -> Result<(RingSet, Vec<bool>, Vec<bool>, Option<Vec<HashMap<FreeParam, f64>>>), GalfitError> {
        let galmod = Galmod::new(self.options.synth.clone());
        let n = rings.len();

        let outcomes: Vec<FitOutcome> = (0..n)
            .into_par_iter()
            .map(|i| {
                let outcome = self.fit_one_ring(header, observed, rings, i, free, &galmod, ctx, cancel);
                if let Some(p) = progress {
                    p.inc(1);
                }
                outcome
            })
            .collect();

        let not_converged: Vec<bool> = outcomes.iter().map(|o| o.not_converged).collect();
        let no_data: Vec<bool> = outcomes.iter().map(|o| o.no_data).collect();
        let errors = if self.options.compute_errors {
            Some(outcomes.iter().map(|o| o.errors.clone().unwrap_or_default()).collect())
        } else {
            None
        };
        // The fitter never touches radius/width, so the ring set's ordering
        // invariants can't be violated here.
        let fitted = RingSet::new(outcomes.into_iter().map(|o| o.ring).collect())
            .expect("fitted rings preserve radius/width invariants");

        Ok((fitted, not_converged, no_data, errors))
    }

    #[allow(clippy::too_many_arguments)]
    fn fit_one_ring(
        &self,
        header: &Header,
        observed: &Cube,
        rings: &RingSet,
        index: usize,
        free: &[FreeParam],
        galmod: &Galmod,
        ctx: &ResidualContext,
        cancel: &AtomicBool,
    ) -> FitOutcome {
        let base = rings.as_slice().to_vec();
        let ring0 = base[index];

        let objective = |params: &[f64]| -> f64 {
            if cancel.load(Ordering::Relaxed) {
                return f64::INFINITY;
            }
            let mut trial_rings = base.clone();
            let mut trial_ring = ring0;
            for (p, &v) in free.iter().zip(params) {
                p.set(&mut trial_ring, v);
            }
            trial_rings[index] = trial_ring;
            let ring_set = match RingSet::new(trial_rings) {
                Ok(rs) => rs,
                Err(_) => return f64::INFINITY,
            };
            match galmod.synthesise(header, &ring_set) {
                Ok(model) => residual::evaluate(&model, observed, header, &trial_ring, &self.options.residual, ctx),
                Err(_) => f64::INFINITY,
            }
        };

        let initial: Vec<f64> = free.iter().map(|p| p.get(&ring0)).collect();
        let initial_value = objective(&initial);

        if !initial_value.is_finite() {
            return FitOutcome {
                ring: ring0,
                not_converged: false,
                no_data: true,
                errors: None,
            };
        }

        let perturbations: Vec<f64> = free
            .iter()
            .map(|p| p.get(&ring0) * p.perturbation_fraction())
            .collect();

        let result = simplex_minimise(&initial, &perturbations, &self.options.simplex, objective);

        let mut fitted = ring0;
        for (p, &v) in free.iter().zip(&result.best) {
            p.set(&mut fitted, v);
        }

        let errors = if self.options.compute_errors {
            Some(
                free.iter()
                    .zip(&result.stddev)
                    .map(|(&p, &s)| (p, s))
                    .collect(),
            )
        } else {
            None
        };

        FitOutcome {
            ring: fitted,
            not_converged: !result.converged,
            no_data: false,
            errors,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn regularise_and_refit(
        &self,
        header: &Header,
        observed: &Cube,
        ctx: &ResidualContext,
        result: &mut GalfitResult,
        regularise: &Regularisation,
        cancel: &AtomicBool,
        progress: Option<&ProgressReporter>,
    ) -> Result<(), GalfitError> {
        let radii: Vec<f64> = result.rings.iter().map(|r| r.radius).collect();

        for &param in &regularise.params {
            let values: Vec<f64> = result.rings.iter().map(|r| param.get(r)).collect();
            let smoothed = if regularise.polyn < 0 {
                bezier_smooth(&values)
            } else {
                match fit_polynomial(&radii, &values, regularise.polyn as usize) {
                    Some(coeffs) => radii.iter().map(|&r| eval_polynomial(&coeffs, r)).collect(),
                    None => values.clone(),
                }
            };
            for (i, &v) in smoothed.iter().enumerate() {
                param.set(result.rings.get_mut(i), v);
            }
        }

        let remaining: Vec<FreeParam> = self
            .options
            .free
            .iter()
            .copied()
            .filter(|p| !regularise.params.contains(p))
            .collect();

        if remaining.is_empty() {
            return Ok(());
        }

        let (rings, not_converged, _no_data, errors) = self.fit_all_rings(
            header,
            observed,
            &result.rings,
            &remaining,
            ctx,
            cancel,
            progress,
        )?;

        result.rings = rings;
        result.not_converged = not_converged;
        if let (Some(existing), Some(new)) = (&mut result.errors, errors) {
            for (e, n) in existing.iter_mut().zip(new) {
                e.extend(n);
            }
        }
        Ok(())
    }
}

/// Replace no-data rings' free parameters with a linear interpolation
/// between their nearest fitted neighbours, by radius (§4.5, "second pass
/// interpolates from neighbours").
fn interpolate_no_data(rings: &mut RingSet, no_data: &[bool], free: &[FreeParam]) {
    let radii: Vec<f64> = rings.iter().map(|r| r.radius).collect();
    for &param in free {
        let values: Vec<f64> = rings.iter().map(|r| param.get(r)).collect();
        for i in 0..rings.len() {
            if !no_data[i] {
                continue;
            }
            let prev = (0..i).rev().find(|&j| !no_data[j]);
            let next = (i + 1..rings.len()).find(|&j| !no_data[j]);
            let interpolated = match (prev, next) {
                (Some(a), Some(b)) => {
                    let t = (radii[i] - radii[a]) / (radii[b] - radii[a]);
                    values[a] + t * (values[b] - values[a])
                }
                (Some(a), None) => values[a],
                (None, Some(b)) => values[b],
                (None, None) => values[i],
            };
            param.set(rings.get_mut(i), interpolated);
        }
    }
}
