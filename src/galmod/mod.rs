// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The cube synthesiser ("Galmod", §4.3): builds a noise-free model cube
//! from a [`RingSet`] by Monte-Carlo cloud emission, optional PSF
//! convolution, and optional per-pixel/per-ring normalisation.

mod error;
pub use error::GalmodError;
#[cfg(test)]
mod tests;

use ndarray::{Array2, Array3};
use rand::Rng;
use rayon::prelude::*;

use crate::beam::{convolve_plane, kernel_2d};
use crate::cube::{Cube, Header};
use crate::geometry::{channel_of, pixel_to_ring, ring_point_to_pixel};
use crate::ring::{Ring, RingSet};
use crate::rng::ring_rng;

/// Vertical density law used to distribute cloudlets away from the disk
/// midplane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LType {
    Gaussian,
    Sech2,
    Exponential,
    Lorentzian,
    Box,
}

impl LType {
    /// Draw a height offset from the midplane \[arcsec\] with scale `z0`.
    fn sample(self, z0: f64, rng: &mut impl Rng) -> f64 {
        if z0 <= 0.0 {
            return 0.0;
        }
        let u: f64 = rng.gen_range(1e-9..1.0 - 1e-9);
        match self {
            LType::Gaussian => {
                // Box-Muller, discarding the paired sample.
                let u2: f64 = rng.gen_range(0.0..1.0);
                z0 * (-2.0 * u.ln()).sqrt() * (2.0 * crate::constants::PI * u2).cos()
            }
            LType::Sech2 => {
                // CDF of sech^2(z/z0)/2/z0 is (1 + tanh(z/z0))/2.
                z0 * (2.0 * u - 1.0).atanh()
            }
            LType::Exponential => {
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                sign * z0 * (-u.ln())
            }
            LType::Lorentzian => z0 * (crate::constants::PI * (u - 0.5)).tan(),
            LType::Box => rng.gen_range(-z0..z0),
        }
    }
}

/// How the synthesised cube's absolute flux scale is chosen.
#[derive(Clone, Debug)]
pub enum Normalisation {
    /// Rescale each spatial pixel so its synthetic integrated intensity
    /// matches `reference` (same spatial shape as the cube).
    Local { reference: Array2<f64> },
    /// Rescale each ring so its synthetic integrated intensity matches
    /// `reference[i]`.
    Azimuthal { reference: Vec<f64> },
    /// Leave the absolute fluxes produced by cloud emission as-is.
    None,
}

#[derive(Clone, Debug)]
pub struct GalmodOptions {
    /// Cloud column density per unit ring area (`CDENS`).
    pub cdens: f64,
    /// Number of velocity subclouds per cloudlet. `None` means "auto from
    /// channel width" (`NV = -1`).
    pub nv: Option<usize>,
    pub ltype: LType,
    /// Instrumental velocity dispersion, added in quadrature to ring
    /// `vdisp` \[km/s\].
    pub sigma_instrumental: f64,
    pub normalisation: Normalisation,
    /// Whether to convolve the accumulated cube with the beam.
    pub smooth: bool,
    /// Seed for the deterministic per-ring RNG (§5, §9).
    pub run_seed: u64,
}

impl Default for GalmodOptions {
    fn default() -> Self {
        Self {
            cdens: crate::constants::DEFAULT_CDENS,
            nv: None,
            ltype: LType::Gaussian,
            sigma_instrumental: 0.0,
            normalisation: Normalisation::None,
            smooth: true,
            run_seed: 0,
        }
    }
}

/// The cube synthesiser.
#[derive(Clone, Debug, Default)]
pub struct Galmod {
    pub options: GalmodOptions,
}

impl Galmod {
    pub fn new(options: GalmodOptions) -> Self {
        Self { options }
    }

    /// Number of velocity subclouds to use for a given channel width and
    /// velocity dispersion, when `nv` is `None` ("auto").
    fn resolve_nv(&self, chan_width_kms: f64, sigma: f64) -> usize {
        match self.options.nv {
            Some(nv) => nv.max(1),
            None => {
                if chan_width_kms <= 0.0 || sigma <= 0.0 {
                    1
                } else {
                    ((6.0 * sigma / chan_width_kms).ceil() as usize).clamp(1, 64)
                }
            }
        }
    }

    /// Synthesise a noise-free cube matching `header`'s grid from `rings`.
    pub fn synthesise(&self, header: &Header, rings: &RingSet) -> Result<Cube, GalmodError> {
        if rings.is_empty() {
            return Err(GalmodError::EmptyRingSet);
        }

        let chan_width_kms = {
            let nz = header.naxis.2 as f64;
            let mid = (nz / 2.0).max(1.0);
            (crate::geometry::velocity_of(header, mid)
                - crate::geometry::velocity_of(header, mid - 1.0))
            .abs()
        };

        let dims = header.naxis;
        let accum: Array3<f32> = rings
            .as_slice()
            .par_iter()
            .enumerate()
            .fold(
                || Array3::<f32>::zeros(dims),
                |mut acc, (i, ring)| {
                    self.emit_ring(header, ring, i, chan_width_kms, &mut acc);
                    acc
                },
            )
            .reduce(|| Array3::<f32>::zeros(dims), |a, b| a + b);

        let mut cube = Cube::from_array(accum, header.blank);

        if self.options.smooth {
            let kernel = kernel_2d(&header.beam, header.pixel_scale)?;
            for z in 0..dims.2 {
                let convolved = convolve_plane(cube.plane(z), &kernel);
                cube.plane_mut(z).assign(&convolved);
            }
        }

        self.normalise(header, rings, &mut cube)?;

        Ok(cube)
    }

    fn emit_ring(
        &self,
        header: &Header,
        ring: &Ring,
        ring_index: usize,
        chan_width_kms: f64,
        acc: &mut Array3<f32>,
    ) {
        let area = ring.area();
        let n_clouds = (area * self.options.cdens).ceil().max(1.0) as u64;
        let sigma = (ring.vdisp * ring.vdisp + self.options.sigma_instrumental.powi(2)).sqrt();
        let nv = self.resolve_nv(chan_width_kms, sigma);
        let flux_per_cloud = (ring.density * area) / n_clouds as f64;
        let flux_per_sub = (flux_per_cloud / nv as f64) as f32;

        let mut rng = ring_rng(self.options.run_seed, ring_index);
        let inc_rad = ring.inc.to_radians();

        for _ in 0..n_clouds {
            let theta = rng.gen_range(0.0..crate::constants::PI * 2.0);
            let r = ring.radius - ring.width / 2.0 + rng.gen_range(0.0..ring.width);
            let z_height = self.options.ltype.sample(ring.z0, &mut rng);

            let (x, y) =
                ring_point_to_pixel(header, r, theta, ring.inc, ring.pa, ring.xpos, ring.ypos, z_height);
            let v_los =
                ring.vsys + (ring.vrot * theta.cos() + ring.vrad * theta.sin()) * inc_rad.sin();

            for _ in 0..nv {
                let dv = if sigma > 0.0 {
                    let u1: f64 = rng.gen_range(1e-9..1.0);
                    let u2: f64 = rng.gen_range(0.0..1.0);
                    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * crate::constants::PI * u2).cos()
                } else {
                    0.0
                };
                let z = channel_of(header, v_los + dv);
                let xi = x.round();
                let yi = y.round();
                let zi = z.round();
                if xi >= 0.0
                    && yi >= 0.0
                    && zi >= 0.0
                    && (xi as usize) < header.naxis.0
                    && (yi as usize) < header.naxis.1
                    && (zi as usize) < header.naxis.2
                {
                    acc[[xi as usize, yi as usize, zi as usize]] += flux_per_sub;
                }
            }
        }
    }

    fn normalise(
        &self,
        header: &Header,
        rings: &RingSet,
        cube: &mut Cube,
    ) -> Result<(), GalmodError> {
        let (nx, ny, nz) = header.naxis;
        match &self.options.normalisation {
            Normalisation::None => Ok(()),
            Normalisation::Local { reference } => {
                if reference.dim() != (nx, ny) {
                    return Err(GalmodError::MissingReferenceMap);
                }
                for x in 0..nx {
                    for y in 0..ny {
                        let synth: f64 = (0..nz).map(|z| cube.get(x, y, z) as f64).sum();
                        if synth.abs() < crate::constants::EPSILON {
                            continue;
                        }
                        let scale = reference[[x, y]] / synth;
                        for z in 0..nz {
                            let v = cube.get(x, y, z);
                            *cube.data_mut().get_mut((x, y, z)).unwrap() = (v as f64 * scale) as f32;
                        }
                    }
                }
                Ok(())
            }
            Normalisation::Azimuthal { reference } => {
                if reference.len() != rings.len() {
                    return Err(GalmodError::MissingReferenceProfile);
                }
                // Assign each pixel to its nearest ring by deprojected
                // radius, using that ring's own geometry.
                let mut ring_sum = vec![0.0f64; rings.len()];
                let mut assignment = vec![usize::MAX; nx * ny];
                for x in 0..nx {
                    for y in 0..ny {
                        let mut best_ring = usize::MAX;
                        let mut best_dist = f64::INFINITY;
                        for (i, ring) in rings.iter().enumerate() {
                            let (r, _theta) = pixel_to_ring(
                                header, x as f64, y as f64, ring.inc, ring.pa, ring.xpos,
                                ring.ypos,
                            );
                            let dist = (r - ring.radius).abs();
                            if dist <= ring.width / 2.0 && dist < best_dist {
                                best_dist = dist;
                                best_ring = i;
                            }
                        }
                        assignment[x * ny + y] = best_ring;
                        if best_ring != usize::MAX {
                            let synth: f64 = (0..nz).map(|z| cube.get(x, y, z) as f64).sum();
                            ring_sum[best_ring] += synth;
                        }
                    }
                }

                for x in 0..nx {
                    for y in 0..ny {
                        let i = assignment[x * ny + y];
                        if i == usize::MAX || ring_sum[i].abs() < crate::constants::EPSILON {
                            continue;
                        }
                        let scale = reference[i] / ring_sum[i];
                        for z in 0..nz {
                            let v = cube.get(x, y, z);
                            *cube.data_mut().get_mut((x, y, z)).unwrap() = (v as f64 * scale) as f32;
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
