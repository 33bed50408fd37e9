// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. galkin should do as many
calculations as possible in double precision before converting to a lower
precision, if it is ever required.
 */

pub use std::f64::consts::PI;

/// Speed of light \[km/s\].
pub const VEL_C: f64 = 299_792.458;

/// Default cloud column density per unit ring area used by the synthesiser
/// (parameter file key `CDENS`, default 10).
pub const DEFAULT_CDENS: f64 = 10.0;

/// Default simplex convergence tolerance for the ring fitter (`TOL`).
pub const DEFAULT_TOL: f64 = 1e-3;

/// Default maximum number of objective evaluations per ring before a simplex
/// fit is declared non-convergent.
pub const DEFAULT_MAX_EVALUATIONS: usize = 5000;

/// Conversion factor from MADFM to an equivalent Gaussian standard deviation:
/// `sigma ~= madfm / MADFM_TO_SIGMA`.
pub const MADFM_TO_SIGMA: f64 = 0.6745;

/// Small number used to avoid division by zero in residual weighting and
/// MAD-based thresholds.
pub const EPSILON: f64 = 1e-12;

/// Number of standard deviations the beam kernel extends to on each axis.
pub const BEAM_KERNEL_NSIGMA: f64 = 5.0;

/// `FWHM = 2*sqrt(2*ln(2)) * sigma`.
pub const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949_3;
