// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Numerical building blocks shared by the fitter, finder and guesser.

pub mod regression;
pub mod simplex;
pub mod stats;

pub use simplex::{simplex_minimise, SimplexOptions, SimplexResult};
pub use stats::Statistics;
