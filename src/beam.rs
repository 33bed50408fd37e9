// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Analytic elliptical Gaussian point-spread function: kernel sampling and
//! direct spatial convolution.

use ndarray::{parallel::prelude::*, Array2, ArrayView2, ArrayViewMut2, Axis};
use thiserror::Error;

use crate::constants::{BEAM_KERNEL_NSIGMA, FWHM_TO_SIGMA, PI};
use crate::cube::Beam;

#[derive(Error, Debug)]
pub enum BeamError {
    #[error("the header beam is unset (bmaj/bmin < 0); set a beam before convolving")]
    Unset,
}

/// A centred, normalised (sums to 1) 2D Gaussian kernel sized to
/// `BEAM_KERNEL_NSIGMA` standard deviations on each axis.
pub struct Kernel2D {
    pub data: Array2<f64>,
    pub half_x: isize,
    pub half_y: isize,
}

/// Build the beam kernel for a given `(bmaj, bmin, bpa)` \[arcsec, arcsec,
/// deg\] and pixel scale \[arcsec/pixel\].
pub fn kernel_2d(beam: &Beam, pixel_scale: f64) -> Result<Kernel2D, BeamError> {
    if !beam.is_set() {
        return Err(BeamError::Unset);
    }

    let sigma_maj = beam.bmaj / FWHM_TO_SIGMA / pixel_scale;
    let sigma_min = beam.bmin / FWHM_TO_SIGMA / pixel_scale;
    let pa = beam.bpa.to_radians();

    let half_x = (BEAM_KERNEL_NSIGMA * sigma_maj.max(sigma_min)).ceil() as isize;
    let half_y = half_x;
    let size_x = (2 * half_x + 1) as usize;
    let size_y = (2 * half_y + 1) as usize;

    let (s_pa, c_pa) = pa.sin_cos();
    let mut data = Array2::zeros((size_x, size_y));
    let mut sum = 0.0;
    for i in 0..size_x {
        for j in 0..size_y {
            let dx = (i as isize - half_x) as f64;
            let dy = (j as isize - half_y) as f64;
            // Rotate into the beam's major/minor frame.
            let u = dx * c_pa + dy * s_pa;
            let v = -dx * s_pa + dy * c_pa;
            let e = 0.5 * ((u / sigma_maj).powi(2) + (v / sigma_min).powi(2));
            let val = (-e).exp();
            data[[i, j]] = val;
            sum += val;
        }
    }
    if sum > 0.0 {
        data.mapv_inplace(|v| v / sum);
    }

    Ok(Kernel2D {
        data,
        half_x,
        half_y,
    })
}

/// Convolve one spatial plane with the beam kernel. Boundary pixels use
/// zero-padding; blank (`NaN`) input pixels pass through as blanks.
pub fn convolve_plane(plane: ArrayView2<f32>, kernel: &Kernel2D) -> Array2<f32> {
    let (nx, ny) = plane.dim();
    let mut out = Array2::zeros((nx, ny));

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(x, mut row)| {
            for y in 0..ny {
                if plane[[x, y]].is_nan() {
                    row[y] = f32::NAN;
                    continue;
                }
                let mut acc = 0.0f64;
                for ki in -kernel.half_x..=kernel.half_x {
                    let xi = x as isize + ki;
                    if xi < 0 || xi >= nx as isize {
                        continue;
                    }
                    for kj in -kernel.half_y..=kernel.half_y {
                        let yj = y as isize + kj;
                        if yj < 0 || yj >= ny as isize {
                            continue;
                        }
                        let src = plane[[xi as usize, yj as usize]];
                        if src.is_nan() {
                            continue;
                        }
                        let w = kernel.data[[
                            (ki + kernel.half_x) as usize,
                            (kj + kernel.half_y) as usize,
                        ]];
                        acc += src as f64 * w;
                    }
                }
                row[y] = acc as f32;
            }
        });

    out
}

/// Convolve `plane` in place using `convolve_plane`.
pub fn convolve_plane_inplace(mut plane: ArrayViewMut2<f32>, kernel: &Kernel2D) {
    let convolved = convolve_plane(plane.view(), kernel);
    plane.assign(&convolved);
}

/// Fit a 2D Gaussian's `(bmaj, bmin, bpa)` to a plane by computing its
/// intensity-weighted second moments; used by the test suite (§8 invariant:
/// convolving a delta plane with the beam and re-fitting recovers the
/// original beam parameters).
pub fn moments_to_gaussian(plane: ArrayView2<f32>, pixel_scale: f64) -> (f64, f64, f64) {
    let (nx, ny) = plane.dim();
    let mut sum = 0.0f64;
    let mut sx = 0.0f64;
    let mut sy = 0.0f64;
    for x in 0..nx {
        for y in 0..ny {
            let v = plane[[x, y]] as f64;
            if v.is_nan() {
                continue;
            }
            sum += v;
            sx += v * x as f64;
            sy += v * y as f64;
        }
    }
    if sum <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let xc = sx / sum;
    let yc = sy / sum;

    let mut mxx = 0.0f64;
    let mut myy = 0.0f64;
    let mut mxy = 0.0f64;
    for x in 0..nx {
        for y in 0..ny {
            let v = plane[[x, y]] as f64;
            if v.is_nan() {
                continue;
            }
            let dx = x as f64 - xc;
            let dy = y as f64 - yc;
            mxx += v * dx * dx;
            myy += v * dy * dy;
            mxy += v * dx * dy;
        }
    }
    mxx /= sum;
    myy /= sum;
    mxy /= sum;

    // Eigenvalues of the covariance matrix -> principal axes.
    let trace = mxx + myy;
    let diff = mxx - myy;
    let disc = (diff * diff + 4.0 * mxy * mxy).sqrt();
    let lambda_maj = 0.5 * (trace + disc);
    let lambda_min = 0.5 * (trace - disc);

    let theta = 0.5 * (2.0 * mxy).atan2(diff);

    let sigma_maj = lambda_maj.max(0.0).sqrt();
    let sigma_min = lambda_min.max(0.0).sqrt();
    let bmaj = sigma_maj * FWHM_TO_SIGMA * pixel_scale;
    let bmin = sigma_min * FWHM_TO_SIGMA * pixel_scale;
    // Convert from image-plane angle to the east-of-north PA convention.
    let bpa = (theta.to_degrees() + 90.0).rem_euclid(180.0);
    (bmaj, bmin, bpa)
}

#[allow(dead_code)]
fn gaussian_2d_amplitude(sigma_maj: f64, sigma_min: f64) -> f64 {
    1.0 / (2.0 * PI * sigma_maj * sigma_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_sums_to_one() {
        let beam = Beam {
            bmaj: 10.0,
            bmin: 6.0,
            bpa: 20.0,
        };
        let k = kernel_2d(&beam, 1.0).unwrap();
        let sum: f64 = k.data.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unset_beam_errors() {
        assert!(kernel_2d(&Beam::UNSET, 1.0).is_err());
    }

    #[test]
    fn delta_convolution_recovers_beam_shape() {
        let beam = Beam {
            bmaj: 10.0,
            bmin: 10.0,
            bpa: 0.0,
        };
        let pixel_scale = 1.0;
        let k = kernel_2d(&beam, pixel_scale).unwrap();
        let n = 64;
        let mut plane = Array2::zeros((n, n));
        plane[[n / 2, n / 2]] = 1.0;
        let convolved = convolve_plane(plane.view(), &k);
        let (bmaj, bmin, _bpa) = moments_to_gaussian(convolved.view(), pixel_scale);
        assert!(
            (bmaj - beam.bmaj).abs() / beam.bmaj < 0.01,
            "bmaj={bmaj}"
        );
        assert!(
            (bmin - beam.bmin).abs() / beam.bmin < 0.01,
            "bmin={bmin}"
        );
    }

    #[test]
    fn blank_pixels_pass_through() {
        let beam = Beam {
            bmaj: 5.0,
            bmin: 5.0,
            bpa: 0.0,
        };
        let k = kernel_2d(&beam, 1.0).unwrap();
        let mut plane = Array2::zeros((16, 16));
        plane[[4, 4]] = f32::NAN;
        let out = convolve_plane(plane.view(), &k);
        assert!(out[[4, 4]].is_nan());
    }
}
