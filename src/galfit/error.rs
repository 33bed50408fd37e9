// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::galmod::GalmodError;

#[derive(Error, Debug)]
pub enum GalfitError {
    #[error("no free parameters selected for fitting")]
    NoFreeParameters,

    #[error("{0}")]
    Galmod(#[from] GalmodError),

    #[error("run cancelled by user")]
    Cancelled,
}
