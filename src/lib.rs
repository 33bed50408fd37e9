// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tilted-ring kinematic modelling of rotating disk galaxies from
//! three-dimensional spectroscopic data cubes.
//!
//! Given an observed cube (two spatial axes plus one spectral axis sampling
//! line-of-sight velocity), this crate recovers a tilted-ring model: a stack
//! of concentric, thin, inclined annuli, by fitting a forward-modelled
//! synthetic cube (blurred by the instrumental beam) to the observed one.

pub mod beam;
pub mod cli;
pub(crate) mod constants;
pub mod cube;
pub mod detection;
pub mod error;
pub mod finder;
pub mod galfit;
pub mod galmod;
pub mod geometry;
pub mod guesser;
pub mod math;
pub mod paramfile;
pub mod progress;
pub mod residual;
pub(crate) mod rng;
pub mod ring;
pub mod ringio;

// Re-exports.
pub use cube::{Beam as HeaderBeam, Cube, Header, SpectralAxis, VelocityDefinition};
pub use error::GalkinError;
pub use galfit::{Galfit, GalfitOptions};
pub use galmod::{Galmod, GalmodOptions, LType, Normalisation};
pub use ring::{FreeParam, Ring, RingSet};
