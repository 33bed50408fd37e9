// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pixel↔sky, frequency/wavelength↔velocity, and ring-point↔pixel
//! transforms. Everything here is a pure function over a [`Header`]; all
//! trigonometry uses `f64` regardless of the cube's storage precision, and
//! inclination/position-angle arguments are always degrees, converted once
//! with `to_radians()` (see the corrected-behaviour note in the crate's
//! design notes).

use crate::constants::VEL_C;
use crate::cube::{Header, SpectralAxis, VelocityDefinition};

/// Convert a (possibly fractional) channel index to a line-of-sight velocity
/// \[km/s\].
pub fn velocity_of(header: &Header, z: f64) -> f64 {
    let native = header.crval.2 + (z + 1.0 - header.crpix.2) * header.cdelt.2;
    match header.spectral_axis {
        SpectralAxis::Velocity => native,
        SpectralAxis::Frequency => {
            let nu0 = header.rest;
            let nu = native;
            match header.velocity_definition {
                VelocityDefinition::Radio => VEL_C * (nu0 - nu) / nu0,
                VelocityDefinition::Optical => VEL_C * (nu0 - nu) / nu,
                VelocityDefinition::Relativistic => {
                    let ratio = (nu0 * nu0 - nu * nu) / (nu0 * nu0 + nu * nu);
                    VEL_C * ratio
                }
            }
        }
        SpectralAxis::Wavelength => {
            let lam0 = header.rest;
            let lam = native;
            match header.velocity_definition {
                VelocityDefinition::Radio => VEL_C * (lam - lam0) / lam,
                VelocityDefinition::Optical => VEL_C * (lam - lam0) / lam0,
                VelocityDefinition::Relativistic => {
                    let ratio = (lam * lam - lam0 * lam0) / (lam * lam + lam0 * lam0);
                    VEL_C * ratio
                }
            }
        }
    }
}

/// Inverse of [`velocity_of`]: convert a line-of-sight velocity \[km/s\] to a
/// fractional channel index.
pub fn channel_of(header: &Header, v: f64) -> f64 {
    let native = match header.spectral_axis {
        SpectralAxis::Velocity => v,
        SpectralAxis::Frequency => {
            let nu0 = header.rest;
            match header.velocity_definition {
                VelocityDefinition::Radio => nu0 * (1.0 - v / VEL_C),
                VelocityDefinition::Optical => nu0 / (1.0 + v / VEL_C),
                VelocityDefinition::Relativistic => {
                    let ratio = v / VEL_C;
                    nu0 * ((1.0 - ratio) / (1.0 + ratio)).sqrt()
                }
            }
        }
        SpectralAxis::Wavelength => {
            let lam0 = header.rest;
            match header.velocity_definition {
                VelocityDefinition::Radio => lam0 / (1.0 - v / VEL_C),
                VelocityDefinition::Optical => lam0 * (1.0 + v / VEL_C),
                VelocityDefinition::Relativistic => {
                    let ratio = v / VEL_C;
                    lam0 * ((1.0 + ratio) / (1.0 - ratio)).sqrt()
                }
            }
        }
    };
    (native - header.crval.2) / header.cdelt.2 + header.crpix.2 - 1.0
}

/// Project a point `(r, theta)` in the disk plane (radius \[arcsec\], azimuth
/// \[rad\] measured from the major axis), plus a `height` \[arcsec\] above the
/// disk midplane along its normal, to sky pixel coordinates, given the
/// ring's inclination and position angle \[deg\] and centre \[pixels\].
///
/// Composition: deproject by `inc` (the midplane position foreshortens by
/// `cos(inc)`, the height offset projects by `sin(inc)`), rotate by `pa`,
/// translate by `(x0, y0)`. `pa` is measured east of north: 0° at +y,
/// increasing through -x.
pub fn ring_point_to_pixel(
    header: &Header,
    r: f64,
    theta: f64,
    inc_deg: f64,
    pa_deg: f64,
    x0: f64,
    y0: f64,
    height: f64,
) -> (f64, f64) {
    let inc = inc_deg.to_radians();
    let pa = pa_deg.to_radians();

    // In-plane Cartesian coordinates, then deproject along the minor axis.
    let xd = r * theta.cos();
    let yd = r * theta.sin() * inc.cos() + height * inc.sin();

    // Rotate by the position angle (galactic convention: 0 at +y, increasing
    // toward -x) and convert arcsec to pixels.
    let (s_pa, c_pa) = pa.sin_cos();
    let x_sky = -xd * c_pa - yd * s_pa;
    let y_sky = -xd * s_pa + yd * c_pa;

    let x = x0 + x_sky / header.pixel_scale;
    let y = y0 + y_sky / header.pixel_scale;
    (x, y)
}

/// Inverse of [`ring_point_to_pixel`]: recover `(r, theta)` in the disk plane
/// \[arcsec, rad\] from a sky pixel position.
pub fn pixel_to_ring(
    header: &Header,
    x: f64,
    y: f64,
    inc_deg: f64,
    pa_deg: f64,
    x0: f64,
    y0: f64,
) -> (f64, f64) {
    let inc = inc_deg.to_radians();
    let pa = pa_deg.to_radians();

    let x_sky = (x - x0) * header.pixel_scale;
    let y_sky = (y - y0) * header.pixel_scale;

    let (s_pa, c_pa) = pa.sin_cos();
    let xd = -(x_sky * c_pa + y_sky * s_pa);
    let yd = -(-x_sky * s_pa + y_sky * c_pa);

    let yd_deproj = if inc.cos().abs() > crate::constants::EPSILON {
        yd / inc.cos()
    } else {
        0.0
    };

    let r = (xd * xd + yd_deproj * yd_deproj).sqrt();
    let theta = yd_deproj.atan2(xd);
    (r, theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::Beam;

    fn test_header() -> Header {
        Header {
            naxis: (64, 64, 64),
            pixel_scale: 1.0,
            crpix: (32.0, 32.0, 32.0),
            crval: (0.0, 0.0, 500.0),
            cdelt: (1.0, 1.0, 10.0),
            spectral_axis: SpectralAxis::Velocity,
            velocity_definition: VelocityDefinition::Radio,
            rest: 0.0,
            beam: Beam::UNSET,
            flux_unit: "Jy/beam".to_string(),
            blank: f32::NAN,
        }
    }

    #[test]
    fn channel_velocity_round_trip() {
        let h = test_header();
        for z in 0..64 {
            let v = velocity_of(&h, z as f64);
            let z2 = channel_of(&h, v);
            assert!((z2 - z as f64).abs() < 1e-9, "z={z} z2={z2}");
        }
    }

    #[test]
    fn frequency_radio_round_trip() {
        let mut h = test_header();
        h.spectral_axis = SpectralAxis::Frequency;
        h.velocity_definition = VelocityDefinition::Radio;
        h.rest = 1.420405752e9;
        h.crval.2 = 1.420405752e9;
        h.cdelt.2 = -10_000.0;
        for z in 0..10 {
            let v = velocity_of(&h, z as f64);
            let z2 = channel_of(&h, v);
            assert!((z2 - z as f64).abs() < 1e-6, "z={z} z2={z2}");
        }
    }

    #[test]
    fn frequency_optical_round_trip() {
        let mut h = test_header();
        h.spectral_axis = SpectralAxis::Frequency;
        h.velocity_definition = VelocityDefinition::Optical;
        h.rest = 1.420405752e9;
        h.crval.2 = 1.420405752e9;
        h.cdelt.2 = -10_000.0;
        for z in 0..10 {
            let v = velocity_of(&h, z as f64);
            let z2 = channel_of(&h, v);
            assert!((z2 - z as f64).abs() < 1e-6, "z={z} z2={z2}");
        }
    }

    #[test]
    fn optical_and_relativistic_frequency_definitions_diverge() {
        let mut h = test_header();
        h.spectral_axis = SpectralAxis::Frequency;
        h.rest = 1.420405752e9;
        h.crval.2 = 1.420405752e9;
        h.cdelt.2 = -10_000.0;

        h.velocity_definition = VelocityDefinition::Optical;
        let v_optical = velocity_of(&h, 5.0);
        h.velocity_definition = VelocityDefinition::Relativistic;
        let v_relativistic = velocity_of(&h, 5.0);

        assert!(
            (v_optical - v_relativistic).abs() > 1e-6,
            "optical ({v_optical}) and relativistic ({v_relativistic}) should not coincide"
        );
    }

    #[test]
    fn ring_point_round_trips_through_pixel() {
        let h = test_header();
        let (inc, pa, x0, y0) = (45.0, 30.0, 32.0, 32.0);
        for &(r, theta) in &[(10.0, 0.3), (20.0, 2.1), (5.0, -1.0)] {
            let (x, y) = ring_point_to_pixel(&h, r, theta, inc, pa, x0, y0, 0.0);
            let (r2, theta2) = pixel_to_ring(&h, x, y, inc, pa, x0, y0);
            assert!((r2 - r).abs() < 1e-8, "r={r} r2={r2}");
            let dtheta = (theta2 - theta).sin().atan2((theta2 - theta).cos());
            assert!(dtheta.abs() < 1e-6, "theta={theta} theta2={theta2}");
        }
    }

    #[test]
    fn height_offset_shifts_projected_position_when_inclined() {
        let h = test_header();
        let (inc, pa, x0, y0) = (60.0, 0.0, 32.0, 32.0);
        let (x0_, y0_) = ring_point_to_pixel(&h, 10.0, 0.5, inc, pa, x0, y0, 0.0);
        let (x1, y1) = ring_point_to_pixel(&h, 10.0, 0.5, inc, pa, x0, y0, 5.0);
        assert!(
            (x0_ - x1).abs() > 1e-9 || (y0_ - y1).abs() > 1e-9,
            "height offset had no effect on an inclined ring's projected position"
        );
    }

    #[test]
    fn height_offset_has_no_effect_face_on() {
        let h = test_header();
        let (x0_, y0_) = ring_point_to_pixel(&h, 10.0, 0.5, 0.0, 0.0, 32.0, 32.0, 0.0);
        let (x1, y1) = ring_point_to_pixel(&h, 10.0, 0.5, 0.0, 0.0, 32.0, 32.0, 5.0);
        assert!((x0_ - x1).abs() < 1e-9 && (y0_ - y1).abs() < 1e-9);
    }

    #[test]
    fn face_on_centre_maps_to_itself() {
        let h = test_header();
        let (x, y) = ring_point_to_pixel(&h, 0.0, 0.0, 0.0, 0.0, 32.0, 32.0, 0.0);
        assert!((x - 32.0).abs() < 1e-9);
        assert!((y - 32.0).abs() < 1e-9);
    }
}
