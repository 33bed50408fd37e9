// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::beam::BeamError;

#[derive(Error, Debug)]
pub enum GalmodError {
    #[error("cannot synthesise a cube from an empty ring set")]
    EmptyRingSet,

    #[error("{0}")]
    Beam(#[from] BeamError),

    #[error("LOCAL normalisation requires a reference surface-brightness map matching the cube's spatial shape")]
    MissingReferenceMap,

    #[error("AZIMUTHAL normalisation requires a reference radial profile with one entry per ring")]
    MissingReferenceProfile,
}
