// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::cube::{Beam, SpectralAxis, VelocityDefinition};
use crate::residual::{Ftype, WeightFunc};
use std::sync::atomic::AtomicBool;

fn header() -> Header {
    Header {
        naxis: (48, 48, 60),
        pixel_scale: 1.0,
        crpix: (24.0, 24.0, 30.0),
        crval: (0.0, 0.0, 500.0),
        cdelt: (1.0, 1.0, 5.0),
        spectral_axis: SpectralAxis::Velocity,
        velocity_definition: VelocityDefinition::Radio,
        rest: 0.0,
        beam: Beam::UNSET,
        flux_unit: "Jy/beam".to_string(),
        blank: f32::NAN,
    }
}

fn truth_ring(radius: f64) -> Ring {
    Ring {
        radius,
        width: 4.0,
        xpos: 24.0,
        ypos: 24.0,
        vsys: 500.0,
        vrot: 120.0,
        vdisp: 8.0,
        vrad: 0.0,
        inc: 45.0,
        pa: 30.0,
        z0: 0.0,
        density: 3.0,
    }
}

fn default_options(free: Vec<FreeParam>) -> GalfitOptions {
    GalfitOptions {
        free,
        residual: ResidualOptions {
            ftype: Ftype::AbsDiff,
            wfunc: WeightFunc::Uniform,
            mask: crate::residual::MaskKind::None,
            sigma: 1.0,
        },
        simplex: SimplexOptions {
            max_evaluations: 300,
            ..Default::default()
        },
        synth: GalmodOptions {
            cdens: 80.0,
            smooth: false,
            run_seed: 11,
            ..Default::default()
        },
        regularise: None,
        compute_errors: true,
    }
}

#[test]
fn rejects_empty_free_set() {
    let galfit = Galfit::new(default_options(vec![]));
    let header = header();
    let rings = RingSet::new(vec![truth_ring(10.0)]).unwrap();
    let observed = Cube::zeros(header.naxis, header.blank);
    let cancel = AtomicBool::new(false);
    let ctx = ResidualContext::default();
    let result = galfit.fit(&header, &observed, &ctx, rings, &cancel, None);
    assert!(matches!(result, Err(GalfitError::NoFreeParameters)));
}

#[test]
fn recovers_rotation_velocity_from_synthetic_observation() {
    let header = header();
    let truth = RingSet::new(vec![truth_ring(10.0)]).unwrap();
    let synth = Galmod::new(GalmodOptions {
        cdens: 200.0,
        smooth: false,
        run_seed: 11,
        ..Default::default()
    });
    let observed = synth.synthesise(&header, &truth).unwrap();

    let mut guess = truth_ring(10.0);
    guess.vrot = 60.0;
    let initial = RingSet::new(vec![guess]).unwrap();

    let options = default_options(vec![FreeParam::Vrot]);
    let galfit = Galfit::new(options);
    let cancel = AtomicBool::new(false);
    let ctx = ResidualContext::default();
    let result = galfit
        .fit(&header, &observed, &ctx, initial, &cancel, None)
        .unwrap();

    assert!(!result.cancelled);
    let fitted_vrot = result.rings.get(0).vrot;
    assert!(
        (fitted_vrot - 120.0).abs() < 30.0,
        "fitted vrot {fitted_vrot} too far from truth"
    );
}

#[test]
fn cancellation_flag_stops_fit_early() {
    let header = header();
    let rings = RingSet::new(vec![truth_ring(10.0), truth_ring(14.0)]).unwrap();
    let observed = Cube::zeros(header.naxis, header.blank);
    let options = default_options(vec![FreeParam::Vrot]);
    let galfit = Galfit::new(options);
    let cancel = AtomicBool::new(true);
    let ctx = ResidualContext::default();
    let result = galfit
        .fit(&header, &observed, &ctx, rings, &cancel, None)
        .unwrap();
    assert!(result.cancelled);
}
