// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `galkin` command-line surface (§6): a parameter file or `-f FITSFILE`
//! in, a fitted ring set (and log) out. FITS reading itself is out of scope
//! (spec.md §1); `run` stops with a clear [`GalkinError::User`] on that path
//! rather than silently doing nothing.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use log::{info, warn, LevelFilter};

use crate::cube::{Cube, Header};
use crate::error::GalkinError;
use crate::finder::{self, FinderOptions};
use crate::galfit::{Galfit, GalfitError, GalfitOptions, Regularisation};
use crate::galmod::{GalmodOptions, Normalisation};
use crate::guesser::{self, GuesserOptions};
use crate::math::simplex::SimplexOptions;
use crate::paramfile::{Config, MaskTag, NormKind};
use crate::progress::ProgressReporter;
use crate::residual::{MaskKind, ResidualContext, ResidualOptions};
use crate::ring::{FreeParam, RingSet};
use crate::ringio;

#[derive(Parser, Debug)]
#[command(
    name = "galkin",
    version,
    about = "Tilted-ring kinematic modelling of rotating disk galaxies from spectroscopic data cubes"
)]
pub struct Cli {
    /// Parameter file (§6). Mutually exclusive with `--fits`.
    pub param_file: Option<PathBuf>,

    /// Run in automatic mode directly against a FITS cube (not yet wired to
    /// a FITS reader; see the crate's DESIGN.md).
    #[arg(short = 'f', long = "fits")]
    pub fits: Option<PathBuf>,

    /// Initial ring file; when given, the source finder and parameter
    /// guesser are skipped.
    #[arg(long)]
    pub ring_file: Option<PathBuf>,

    /// Where to write the fitted ring file (and, with `--flagerrors`, its
    /// companion error file). Defaults to `OUTFOLDER`/rings.dat.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Increase logging verbosity: `-v` for debug, `-vv` for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Initialise the global logger. Verbosity follows `-v`'s repeat count:
/// `0` => info, `1` => debug, `>=2` => trace.
pub fn setup_logging(verbosity: u8) -> Result<(), fern::InitError> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{:<5}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

/// The result of running the full finder -> guesser -> fitter pipeline.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub rings: RingSet,
    pub not_converged: Vec<bool>,
    pub errors: Option<Vec<HashMap<FreeParam, f64>>>,
    pub cancelled: bool,
}

/// Run the core pipeline against an already-loaded cube: source-find and
/// guess an initial ring set unless `initial_rings` was supplied directly,
/// then fit it. This is the reusable, FITS-independent half of `run` — a
/// library caller that already has a [`Cube`]/[`Header`] (e.g. from its own
/// FITS reader) can call it directly.
pub fn run_pipeline(
    cube: &Cube,
    header: &Header,
    config: &Config,
    initial_rings: Option<RingSet>,
    cancel: &AtomicBool,
    progress: Option<&ProgressReporter>,
) -> Result<PipelineOutput, GalkinError> {
    let initial = match initial_rings {
        Some(rings) => rings,
        None => {
            info!("no initial ring file given; running source finder");
            let detections = finder::find(cube, &FinderOptions::default())?;
            let detection = detections.into_iter().next().ok_or_else(|| {
                GalkinError::Data("source finder found no detections".to_string())
            })?;
            let guess = guesser::guess(cube, header, &detection, &GuesserOptions::default())?;
            guess.rings
        }
    };

    let options = galfit_options_from_config(config)?;
    let galfit = Galfit::new(options);
    let ctx = ResidualContext::default();
    let result = galfit.fit(header, cube, &ctx, initial, cancel, progress)?;

    if result.cancelled {
        return Err(GalfitError::Cancelled.into());
    }

    let n_not_converged = result.not_converged.iter().filter(|&&b| b).count();
    if n_not_converged > 0 {
        warn!("{n_not_converged} ring(s) failed to converge");
        return Err(GalkinError::NotConverged(n_not_converged));
    }

    Ok(PipelineOutput {
        rings: result.rings,
        not_converged: result.not_converged,
        errors: result.errors,
        cancelled: result.cancelled,
    })
}

fn galfit_options_from_config(config: &Config) -> Result<GalfitOptions, GalkinError> {
    let mask = match config.mask {
        MaskTag::None => MaskKind::None,
        MaskTag::Negative => MaskKind::Negative,
        MaskTag::Threshold => MaskKind::Threshold {
            value: config.mask_threshold.unwrap_or(0.0),
        },
        MaskTag::Search => MaskKind::Searching,
        MaskTag::Smooth | MaskTag::Both => {
            return Err(GalkinError::User(
                "MASK smooth/both require a spatial-smoothing step, which is out of scope for this driver"
                    .to_string(),
            ))
        }
    };

    let normalisation = match config.norm {
        NormKind::None => Normalisation::None,
        NormKind::Local | NormKind::Azimuthal => {
            warn!("NORM local/azim need a reference map the parameter file can't carry; falling back to NORM none");
            Normalisation::None
        }
    };

    let geometrical: Vec<FreeParam> = config.free.iter().copied().filter(|p| p.is_geometrical()).collect();
    let regularise = if config.twostage && !geometrical.is_empty() {
        Some(Regularisation {
            params: geometrical,
            polyn: config.polyn,
        })
    } else {
        None
    };

    Ok(GalfitOptions {
        free: config.free.clone(),
        residual: ResidualOptions {
            ftype: config.ftype,
            wfunc: config.wfunc,
            mask,
            ..ResidualOptions::default()
        },
        simplex: SimplexOptions {
            tol: config.tol,
            ..SimplexOptions::default()
        },
        synth: GalmodOptions {
            cdens: config.cdens,
            nv: config.nv,
            ltype: config.ltype,
            normalisation,
            ..GalmodOptions::default()
        },
        regularise,
        compute_errors: config.flagerrors,
    })
}

/// Parse CLI args, set up logging, and drive the pipeline end to end. Exit
/// codes follow spec.md §6 via [`GalkinError::exit_code`].
pub fn run(cli: &Cli) -> Result<(), GalkinError> {
    setup_logging(cli.verbose)
        .map_err(|e| GalkinError::Internal(format!("failed to initialise logging: {e}")))?;

    if cli.param_file.is_none() && cli.fits.is_none() {
        return Err(GalkinError::User(
            "expected a parameter file or -f FITSFILE".to_string(),
        ));
    }

    let config = match &cli.param_file {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            Config::parse(&text)?
        }
        None => Config::default(),
    };
    info!(
        "loaded configuration: {} free parameter(s), FTYPE={:?}",
        config.free.len(),
        config.ftype
    );

    if cli.fits.is_some() {
        return Err(GalkinError::User(
            "FITS reading is out of scope for this crate; supply --ring-file against an \
             in-memory cube built by your own FITS reader instead"
                .to_string(),
        ));
    }

    let ring_file = cli.ring_file.as_ref().ok_or_else(|| {
        GalkinError::User("this driver requires --ring-file until a FITS reader is wired in".to_string())
    })?;
    let ring_text = fs::read_to_string(ring_file)?;
    let _initial = ringio::read_ring_set(&ring_text)?;

    Err(GalkinError::User(
        "no in-memory observed cube available: this CLI binary is plumbing over \
         run_pipeline for a caller that supplies a Cube/Header; see DESIGN.md"
            .to_string(),
    ))
}
