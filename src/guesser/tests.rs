// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::cube::{Beam, SpectralAxis, VelocityDefinition};
use crate::detection::{Object2D, Scan};
use ndarray::Array3;

fn header() -> Header {
    Header {
        naxis: (80, 80, 1),
        pixel_scale: 1.0,
        crpix: (40.0, 40.0, 1.0),
        crval: (0.0, 0.0, 0.0),
        cdelt: (1.0, 1.0, 10.0),
        spectral_axis: SpectralAxis::Velocity,
        velocity_definition: VelocityDefinition::Radio,
        rest: 0.0,
        beam: Beam {
            bmaj: 3.0,
            bmin: 3.0,
            bpa: 0.0,
        },
        flux_unit: "Jy/beam".to_string(),
        blank: f32::NAN,
    }
}

fn circular_detection(cx: f64, cy: f64, radius: f64, nx: usize, ny: usize) -> (Detection, Array3<f32>) {
    let mut data = Array3::<f32>::from_elem((nx, ny, 1), f32::NAN);
    let mut obj = Object2D::default();
    for y in 0..ny {
        let mut run_start: Option<usize> = None;
        for x in 0..nx {
            let inside = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt() <= radius;
            if inside {
                data[[x, y, 0]] = 1.0;
                if run_start.is_none() {
                    run_start = Some(x);
                }
            } else if let Some(s) = run_start.take() {
                obj.scans.push(Scan { y, x_start: s, x_end: x });
            }
        }
        if let Some(s) = run_start {
            obj.scans.push(Scan { y, x_start: s, x_end: nx });
        }
    }
    let mut det = Detection::default();
    det.planes.insert(0, obj);
    (det, data)
}

#[test]
fn guessed_centre_matches_circular_detection() {
    let header = header();
    let (nx, ny, _) = header.naxis;
    let (detection, data) = circular_detection(40.5, 25.5, 10.0, nx, ny);
    let cube = Cube::from_array(data, header.blank);

    let options = GuesserOptions {
        refine_inclination: false,
        ..Default::default()
    };
    let guess = guess(&cube, &header, &detection, &options).unwrap();
    assert!((guess.centre.0 - 40.5).abs() < 1.0, "x centre {}", guess.centre.0);
    assert!((guess.centre.1 - 25.5).abs() < 1.0, "y centre {}", guess.centre.1);
}

#[test]
fn empty_detection_is_rejected() {
    let header = header();
    let cube = Cube::zeros(header.naxis, header.blank);
    let detection = Detection::default();
    let result = guess(&cube, &header, &detection, &GuesserOptions::default());
    assert!(matches!(result, Err(GuesserError::EmptyDetection)));
}

#[test]
fn kinematic_pa_aligns_with_velocity_gradient_direction() {
    // A velocity field that varies along -x (this crate's major-axis
    // convention at pa=0): receding (v > vsys) on the +x side.
    let mut header = header();
    header.naxis = (80, 80, 41);
    header.crpix.2 = 21.0;
    header.cdelt.2 = 5.0;
    header.crval.2 = 0.0;

    let (nx, ny, nz) = header.naxis;
    let mut data = Array3::<f32>::from_elem((nx, ny, nz), f32::NAN);
    let cx = 40.0;
    let mut obj_low = Object2D::default();
    let mut obj_high = Object2D::default();
    for y in 20..60 {
        obj_low.scans.push(Scan { y, x_start: 20, x_end: 40 });
        obj_high.scans.push(Scan { y, x_start: 40, x_end: 60 });
        for x in 20..40 {
            data[[x, y, 10]] = 5.0;
        }
        for x in 40..60 {
            data[[x, y, 30]] = 5.0;
        }
    }
    let _ = cx;
    let mut detection = Detection::default();
    detection.planes.insert(10, obj_low);
    detection.planes.insert(30, obj_high);
    let _ = nz;
    let cube = Cube::from_array(data, header.blank);

    let options = GuesserOptions {
        refine_inclination: false,
        ..Default::default()
    };
    let guess = guess(&cube, &header, &detection, &options).unwrap();
    assert!(
        (0.0..=10.0).contains(&guess.pa) || (170.0..360.0).contains(&guess.pa),
        "expected pa near 0/180, got {}",
        guess.pa
    );
}
