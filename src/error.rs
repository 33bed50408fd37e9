// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all galkin-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use crate::{
    beam::BeamError, finder::FinderError, galfit::GalfitError, galmod::GalmodError,
    guesser::GuesserError, paramfile::ParamFileError, ringio::RingIoError,
};

/// The *only* publicly visible error from galkin. Each variant maps to one of
/// the exit codes documented for the CLI.
#[derive(Error, Debug)]
pub enum GalkinError {
    /// Bad user input: a missing file, a malformed parameter, an invalid
    /// combination of CLI flags. Exit code 1.
    #[error("{0}")]
    User(String),

    /// The observation itself can't be used: blank-only cube, no beam, no
    /// detection found and no geometry supplied by hand. Exit code 3.
    #[error("{0}")]
    Data(String),

    /// The fit did not converge for one or more rings. Exit code 2.
    #[error("fit did not converge for {0} ring(s)")]
    NotConverged(usize),

    /// The user sent a cancellation signal mid-run. Exit code 130.
    #[error("run cancelled by user")]
    Cancelled,

    /// An invariant was violated (e.g. non-monotonic ring radii). This
    /// should never happen; it indicates a bug. Exit code 3.
    #[error("internal error: {0}")]
    Internal(String),

    /// A generic IO error.
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl GalkinError {
    /// The process exit code mapped from spec: 0 success, 1 user error, 2
    /// fit non-convergence, 3 I/O/data error, 130 cancellation.
    pub fn exit_code(&self) -> i32 {
        match self {
            GalkinError::User(_) => 1,
            GalkinError::NotConverged(_) => 2,
            GalkinError::Data(_) | GalkinError::Internal(_) | GalkinError::IO(_) => 3,
            GalkinError::Cancelled => 130,
        }
    }
}

impl From<BeamError> for GalkinError {
    fn from(e: BeamError) -> Self {
        Self::Data(e.to_string())
    }
}

impl From<GalmodError> for GalkinError {
    fn from(e: GalmodError) -> Self {
        Self::Data(e.to_string())
    }
}

impl From<GalfitError> for GalkinError {
    fn from(e: GalfitError) -> Self {
        match e {
            GalfitError::Cancelled => Self::Cancelled,
            GalfitError::Galmod(_) | GalfitError::NoFreeParameters => {
                Self::User(e.to_string())
            }
        }
    }
}

impl From<FinderError> for GalkinError {
    fn from(e: FinderError) -> Self {
        Self::Data(e.to_string())
    }
}

impl From<GuesserError> for GalkinError {
    fn from(e: GuesserError) -> Self {
        Self::Data(e.to_string())
    }
}

impl From<ParamFileError> for GalkinError {
    fn from(e: ParamFileError) -> Self {
        Self::User(e.to_string())
    }
}

impl From<RingIoError> for GalkinError {
    fn from(e: RingIoError) -> Self {
        match e {
            RingIoError::IO(e) => Self::IO(e),
            other => Self::User(other.to_string()),
        }
    }
}
