// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::cube::{Beam, SpectralAxis, VelocityDefinition};

fn test_header() -> Header {
    Header {
        naxis: (48, 48, 80),
        pixel_scale: 1.0,
        crpix: (24.0, 24.0, 40.0),
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

fn static_ring(radius: f64, width: f64, density: f64) -> Ring {
    Ring {
        radius,
        width,
        xpos: 24.0,
        ypos: 24.0,
        vsys: 500.0,
        vrot: 0.0,
        vdisp: 8.0,
        vrad: 0.0,
        inc: 0.0,
        pa: 0.0,
        z0: 0.0,
        density,
    }
}

#[test]
fn empty_ring_set_is_rejected() {
    let galmod = Galmod::new(GalmodOptions {
        smooth: false,
        ..Default::default()
    });
    let rings = RingSet::new(vec![]).unwrap();
    let result = galmod.synthesise(&test_header(), &rings);
    assert!(matches!(result, Err(GalmodError::EmptyRingSet)));
}

#[test]
fn static_disk_conserves_flux_per_ring() {
    let rings = RingSet::new(vec![static_ring(10.0, 4.0, 2.0), static_ring(14.0, 4.0, 1.0)]).unwrap();
    let galmod = Galmod::new(GalmodOptions {
        cdens: 50.0,
        smooth: false,
        run_seed: 7,
        ..Default::default()
    });
    let cube = galmod.synthesise(&test_header(), &rings).unwrap();

    let expected: f64 = rings.iter().map(|r| r.density * r.area()).sum();
    let got = cube.total_flux();
    assert!(
        (got - expected).abs() / expected < 0.1,
        "expected {expected}, got {got}"
    );
}

#[test]
fn higher_cloud_density_reduces_poisson_scatter() {
    let rings = RingSet::new(vec![static_ring(10.0, 4.0, 3.0)]).unwrap();
    let expected: f64 = rings.iter().map(|r| r.density * r.area()).sum();

    let lo = Galmod::new(GalmodOptions {
        cdens: 5.0,
        smooth: false,
        run_seed: 1,
        ..Default::default()
    })
    .synthesise(&test_header(), &rings)
    .unwrap()
    .total_flux();

    let hi = Galmod::new(GalmodOptions {
        cdens: 500.0,
        smooth: false,
        run_seed: 1,
        ..Default::default()
    })
    .synthesise(&test_header(), &rings)
    .unwrap()
    .total_flux();

    assert!((lo - expected).abs() / expected < 0.3);
    assert!((hi - expected).abs() / expected < 0.05);
}

#[test]
fn same_seed_reproduces_identical_cube() {
    let rings = RingSet::new(vec![static_ring(10.0, 4.0, 2.0)]).unwrap();
    let galmod = Galmod::new(GalmodOptions {
        cdens: 20.0,
        smooth: false,
        run_seed: 99,
        ..Default::default()
    });
    let header = test_header();
    let a = galmod.synthesise(&header, &rings).unwrap();
    let b = galmod.synthesise(&header, &rings).unwrap();
    assert_eq!(a.data(), b.data());
}

#[test]
fn z0_and_ltype_change_synthesised_cube() {
    let mut thin = static_ring(10.0, 4.0, 5.0);
    thin.inc = 60.0;
    thin.z0 = 0.0;
    let mut thick = thin;
    thick.z0 = 5.0;

    let galmod = Galmod::new(GalmodOptions {
        cdens: 300.0,
        smooth: false,
        run_seed: 11,
        ..Default::default()
    });
    let header = test_header();
    let thin_cube = galmod
        .synthesise(&header, &RingSet::new(vec![thin]).unwrap())
        .unwrap();
    let thick_cube = galmod
        .synthesise(&header, &RingSet::new(vec![thick]).unwrap())
        .unwrap();
    assert_ne!(thin_cube.data(), thick_cube.data());

    let box_type = Galmod::new(GalmodOptions {
        cdens: 300.0,
        smooth: false,
        run_seed: 11,
        ltype: LType::Box,
        ..Default::default()
    });
    let box_cube = box_type
        .synthesise(&header, &RingSet::new(vec![thick]).unwrap())
        .unwrap();
    assert_ne!(box_cube.data(), thick_cube.data());
}

#[test]
fn rotating_ring_offsets_flux_from_systemic_channel() {
    let mut ring = static_ring(10.0, 2.0, 5.0);
    ring.inc = 90.0;
    ring.vrot = 200.0;
    let rings = RingSet::new(vec![ring]).unwrap();
    let galmod = Galmod::new(GalmodOptions {
        cdens: 200.0,
        smooth: false,
        run_seed: 3,
        ..Default::default()
    });
    let cube = galmod.synthesise(&test_header(), &rings).unwrap();

    let systemic_channel = channel_of(&test_header(), 500.0).round() as usize;
    let systemic_flux: f64 = (0..48)
        .flat_map(|x| (0..48).map(move |y| (x, y)))
        .map(|(x, y)| cube.get(x, y, systemic_channel) as f64)
        .sum();
    assert!(
        systemic_flux < cube.total_flux() * 0.1,
        "edge-on rotation should empty the systemic channel"
    );
}
