// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The residual evaluator (§4.4): the scalar objective the ring fitter
//! minimises. Compares a model cube against the observation over an
//! annulus-restricted, optionally weighted and masked, region.

use ndarray::ArrayView3;

use crate::constants::EPSILON;
use crate::cube::{Cube, Header};
use crate::geometry::pixel_to_ring;
use crate::ring::Ring;

/// The residual functional (`FTYPE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ftype {
    /// `Sum (m-o)^2 / sigma^2`.
    Chi2,
    /// `Sum |m-o|`.
    AbsDiff,
    /// `Sum |m-o| / (m+o+eps)`.
    NormAbsDiff,
}

/// The azimuthal weighting function (`WFUNC`), amplifying voxels near the
/// major axis where rotation dominates the line-of-sight velocity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightFunc {
    Uniform,
    AbsCos,
    Cos2,
}

impl WeightFunc {
    fn weight(self, theta: f64) -> f64 {
        match self {
            WeightFunc::Uniform => 1.0,
            WeightFunc::AbsCos => theta.cos().abs(),
            WeightFunc::Cos2 => theta.cos().powi(2),
        }
    }
}

/// Which voxels participate in the sum (`MASK`), mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaskKind {
    /// Voxels where a spatially-smoothed observation exceeds `threshold`.
    Smoothing { threshold: f64 },
    /// Voxels belonging to any detection.
    Searching,
    /// Smooth, then restrict to detections.
    SmoothAndSearch { threshold: f64 },
    /// Voxels above an absolute value.
    Threshold { value: f64 },
    /// Voxels below zero (for noise calibration).
    Negative,
    /// All finite voxels.
    None,
}

#[derive(Clone, Copy, Debug)]
pub struct ResidualOptions {
    pub ftype: Ftype,
    pub wfunc: WeightFunc,
    pub mask: MaskKind,
    /// Noise estimate used by `Ftype::Chi2`.
    pub sigma: f64,
}

impl Default for ResidualOptions {
    fn default() -> Self {
        Self {
            ftype: Ftype::Chi2,
            wfunc: WeightFunc::Uniform,
            mask: MaskKind::None,
            sigma: 1.0,
        }
    }
}

/// Auxiliary data the mask variants that aren't self-contained need: a
/// spatially-smoothed copy of the observation, and a dense detection-voxel
/// mask produced elsewhere (e.g. by flattening a [`crate::detection::Detection`]
/// set onto the cube grid).
#[derive(Clone, Copy, Default)]
pub struct ResidualContext<'a> {
    pub smoothed: Option<ArrayView3<'a, f32>>,
    pub detection_mask: Option<ArrayView3<'a, bool>>,
}

/// Evaluate the residual `F(ring, params)` between `model` and `observed`,
/// restricted to the voxels whose deprojected radius under `ring`'s geometry
/// falls within its annulus extended by one ring width on each side (the
/// "±1 Δr for safety" margin).
pub fn evaluate(
    model: &Cube,
    observed: &Cube,
    header: &Header,
    ring: &Ring,
    options: &ResidualOptions,
    ctx: &ResidualContext,
) -> f64 {
    let (nx, ny, nz) = header.naxis;
    let r_in = (ring.radius - 1.5 * ring.width).max(0.0);
    let r_out = ring.radius + 1.5 * ring.width;

    let mut total = 0.0f64;
    let mut any = false;

    for x in 0..nx {
        for y in 0..ny {
            let (r, theta) = pixel_to_ring(header, x as f64, y as f64, ring.inc, ring.pa, ring.xpos, ring.ypos);
            if r < r_in || r > r_out {
                continue;
            }
            let weight = options.wfunc.weight(theta);
            if weight <= 0.0 {
                continue;
            }

            for z in 0..nz {
                if observed.is_blank(x, y, z) {
                    continue;
                }
                if !passes_mask(options.mask, observed, ctx, x, y, z) {
                    continue;
                }

                let o = observed.get(x, y, z) as f64;
                let m = model.get(x, y, z) as f64;
                let term = match options.ftype {
                    Ftype::Chi2 => (m - o).powi(2) / (options.sigma * options.sigma).max(EPSILON),
                    Ftype::AbsDiff => (m - o).abs(),
                    Ftype::NormAbsDiff => (m - o).abs() / (m + o + EPSILON),
                };
                total += weight * term;
                any = true;
            }
        }
    }

    if !any {
        f64::INFINITY
    } else {
        total
    }
}

fn passes_mask(
    mask: MaskKind,
    observed: &Cube,
    ctx: &ResidualContext,
    x: usize,
    y: usize,
    z: usize,
) -> bool {
    match mask {
        MaskKind::None => true,
        MaskKind::Negative => (observed.get(x, y, z) as f64) < 0.0,
        MaskKind::Threshold { value } => (observed.get(x, y, z) as f64) > value,
        MaskKind::Smoothing { threshold } => ctx
            .smoothed
            .map(|s| s[[x, y, z]] as f64 > threshold)
            .unwrap_or(false),
        MaskKind::SmoothAndSearch { threshold } => {
            let smooth_ok = ctx
                .smoothed
                .map(|s| s[[x, y, z]] as f64 > threshold)
                .unwrap_or(false);
            let search_ok = ctx.detection_mask.map(|d| d[[x, y, z]]).unwrap_or(false);
            smooth_ok && search_ok
        }
        MaskKind::Searching => ctx.detection_mask.map(|d| d[[x, y, z]]).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{Beam, SpectralAxis, VelocityDefinition};
    use ndarray::Array3;

    fn header() -> Header {
        Header {
            naxis: (16, 16, 8),
            pixel_scale: 1.0,
            crpix: (8.0, 8.0, 4.0),
            crval: (0.0, 0.0, 0.0),
            cdelt: (1.0, 1.0, 10.0),
            spectral_axis: SpectralAxis::Velocity,
            velocity_definition: VelocityDefinition::Radio,
            rest: 0.0,
            beam: Beam::UNSET,
            flux_unit: "Jy/beam".to_string(),
            blank: f32::NAN,
        }
    }

    fn ring() -> Ring {
        Ring {
            radius: 4.0,
            width: 2.0,
            xpos: 8.0,
            ypos: 8.0,
            vsys: 0.0,
            vrot: 0.0,
            vdisp: 8.0,
            vrad: 0.0,
            inc: 0.0,
            pa: 0.0,
            z0: 0.0,
            density: 1.0,
        }
    }

    #[test]
    fn identical_cubes_have_zero_residual() {
        let h = header();
        let data = Array3::<f32>::from_elem(h.naxis, 2.0);
        let cube = Cube::from_array(data, h.blank);
        let opts = ResidualOptions::default();
        let ctx = ResidualContext::default();
        let f = evaluate(&cube, &cube, &h, &ring(), &opts, &ctx);
        assert!(f.abs() < 1e-9);
    }

    #[test]
    fn differing_cubes_give_positive_residual() {
        let h = header();
        let model = Cube::from_array(Array3::<f32>::from_elem(h.naxis, 1.0), h.blank);
        let observed = Cube::from_array(Array3::<f32>::from_elem(h.naxis, 3.0), h.blank);
        let opts = ResidualOptions {
            ftype: Ftype::AbsDiff,
            ..Default::default()
        };
        let ctx = ResidualContext::default();
        let f = evaluate(&model, &observed, &h, &ring(), &opts, &ctx);
        assert!(f > 0.0);
    }

    #[test]
    fn no_voxels_in_annulus_gives_infinite_residual() {
        let h = header();
        let model = Cube::from_array(Array3::<f32>::from_elem(h.naxis, 1.0), h.blank);
        let observed = model.clone();
        let mut r = ring();
        r.radius = 1000.0;
        let opts = ResidualOptions::default();
        let ctx = ResidualContext::default();
        let f = evaluate(&model, &observed, &h, &r, &opts, &ctx);
        assert!(f.is_infinite());
    }

    #[test]
    fn searching_mask_without_detections_excludes_everything() {
        let h = header();
        let model = Cube::from_array(Array3::<f32>::from_elem(h.naxis, 1.0), h.blank);
        let observed = Cube::from_array(Array3::<f32>::from_elem(h.naxis, 5.0), h.blank);
        let opts = ResidualOptions {
            mask: MaskKind::Searching,
            ..Default::default()
        };
        let ctx = ResidualContext::default();
        let f = evaluate(&model, &observed, &h, &ring(), &opts, &ctx);
        assert!(f.is_infinite());
    }
}
