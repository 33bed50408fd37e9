// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parameter guesser (§4.7): turns a [`Detection`] into an initial
//! [`RingSet`] by deriving centre, systemic velocity, position angle,
//! inclination and ring spacing from its intensity and velocity-field
//! moment maps.

mod error;
pub use error::GuesserError;
#[cfg(test)]
mod tests;

use log::warn;

use crate::cube::{Cube, Header};
use crate::detection::Detection;
use crate::galmod::{Galmod, GalmodOptions, Normalisation};
use crate::geometry::pixel_to_ring;
use crate::math::stats::Statistics;
use crate::math::simplex::{simplex_minimise, SimplexOptions};
use crate::ring::{Ring, RingSet};

/// Default velocity dispersion assigned to every guessed ring. The
/// guesser has no principled way to estimate this from moment maps alone;
/// a flat initial value is refined by the fitter's `vdisp` free parameter.
const DEFAULT_GUESS_VDISP: f64 = 8.0;

/// How finely the PA search steps through `[0, 180)` degrees.
const DEFAULT_PA_STEP_DEG: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct GuesserOptions {
    pub pa_step_deg: f64,
    /// §9 "Open question": whether the PA search's sampled line includes
    /// the centre pixel itself. Exposed as a flag rather than resolved
    /// silently, since the original's inclusion looked unintentional but
    /// its effect on asymmetric kinematics is uncharacterised.
    pub include_centre_in_pa_search: bool,
    pub refine_inclination: bool,
    pub simplex: SimplexOptions,
}

impl Default for GuesserOptions {
    fn default() -> Self {
        Self {
            pa_step_deg: DEFAULT_PA_STEP_DEG,
            include_centre_in_pa_search: false,
            refine_inclination: true,
            simplex: SimplexOptions::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Guess {
    pub centre: (f64, f64),
    pub vsys: f64,
    pub pa: f64,
    pub inc: f64,
    pub rmax: f64,
    pub delta_r: f64,
    pub rings: RingSet,
}

/// Dense per-pixel intensity and velocity moment maps over a detection's
/// footprint. `None` where the pixel is not part of the detection.
struct MomentMaps {
    intensity: Vec<Vec<Option<f64>>>,
    velocity: Vec<Vec<Option<f64>>>,
}

fn moment_maps(cube: &Cube, header: &Header, detection: &Detection) -> MomentMaps {
    let (nx, ny, _) = header.naxis;
    let mask = detection.to_dense_mask(header.naxis);
    let mut intensity = vec![vec![None; ny]; nx];
    let mut velocity = vec![vec![None; ny]; nx];

    for x in 0..nx {
        for y in 0..ny {
            let mut flux = 0.0f64;
            let mut weighted_v = 0.0f64;
            for z in 0..header.naxis.2 {
                if !mask[[x, y, z]] {
                    continue;
                }
                let v = cube.get(x, y, z) as f64;
                flux += v;
                weighted_v += v * crate::geometry::velocity_of(header, z as f64);
            }
            if flux.abs() > crate::constants::EPSILON {
                intensity[x][y] = Some(flux);
                velocity[x][y] = Some(weighted_v / flux);
            }
        }
    }

    MomentMaps { intensity, velocity }
}

/// Derive an initial [`RingSet`] and the intermediate guessed quantities
/// from `detection`.
pub fn guess(
    cube: &Cube,
    header: &Header,
    detection: &Detection,
    options: &GuesserOptions,
) -> Result<Guess, GuesserError> {
    if detection.voxel_count() == 0 {
        return Err(GuesserError::EmptyDetection);
    }

    let moments = moment_maps(cube, header, detection);

    let (flux, fx, fy, _fz) = detection.centroid(cube);
    if flux.abs() < crate::constants::EPSILON {
        return Err(GuesserError::EmptyDetection);
    }
    let (xmin, xmax, ymin, ymax, _zmin, _zmax) = detection.bbox().ok_or(GuesserError::EmptyDetection)?;
    let geometric = (
        (xmin + xmax) as f64 / 2.0,
        (ymin + ymax) as f64 / 2.0,
    );
    let centre = ((fx + geometric.0) / 2.0, (fy + geometric.1) / 2.0);

    let vsys = detection.systemic_velocity(cube, header);

    let pa = guess_position_angle(&moments, header, centre, vsys, options);
    let (inc, rmax) = guess_inclination_and_rmax(&moments, header, centre, pa)?;

    let (inc, rmax) = if options.refine_inclination {
        refine_inclination(&moments, header, centre, pa, inc, rmax, options)
    } else {
        (inc, rmax)
    };

    let mut delta_r = header.beam.bmaj.max(header.pixel_scale) * 1.0;
    let mut n_rings = (rmax / delta_r).round().max(1.0) as usize;
    let mut guard = 0;
    while n_rings < 5 && guard < 16 {
        delta_r /= 2.0;
        n_rings = (rmax / delta_r).round().max(1.0) as usize;
        guard += 1;
    }

    let w50 = detection.w50(cube, header);
    let inc_rad = inc.to_radians();
    let vrot = if inc_rad.sin().abs() > crate::constants::EPSILON {
        w50 / (2.0 * inc_rad.sin())
    } else {
        0.0
    };

    let mut rings = Vec::with_capacity(n_rings);
    for i in 0..n_rings {
        let radius = delta_r * (i as f64 + 0.5);
        let density = ring_density(&moments, header, centre, pa, inc, radius, delta_r);
        rings.push(Ring {
            radius,
            width: delta_r,
            xpos: centre.0,
            ypos: centre.1,
            vsys,
            vrot,
            vdisp: DEFAULT_GUESS_VDISP,
            vrad: 0.0,
            inc,
            pa,
            z0: 0.0,
            density,
        });
    }
    let rings = RingSet::new(rings).map_err(|e| GuesserError::Degenerate(e.to_string()))?;

    Ok(Guess {
        centre,
        vsys,
        pa,
        inc,
        rmax,
        delta_r,
        rings,
    })
}

fn guess_position_angle(
    moments: &MomentMaps,
    header: &Header,
    centre: (f64, f64),
    vsys: f64,
    options: &GuesserOptions,
) -> f64 {
    let (nx, ny, _) = header.naxis;
    let max_r = ((nx * nx + ny * ny) as f64).sqrt();

    let mut best_pa = 0.0;
    let mut best_score = -1.0;
    let mut best_sign_sum = 0.0;

    let mut p = 0.0;
    while p < 180.0 {
        let rad = p.to_radians();
        let dir = (-rad.cos(), -rad.sin());
        let mut deviations = Vec::new();
        let mut sign_sum = 0.0;
        let mut r = if options.include_centre_in_pa_search { 0.0 } else { 1.0 };
        while r < max_r {
            for sign in [1.0, -1.0] {
                let x = (centre.0 + sign * r * dir.0).round();
                let y = (centre.1 + sign * r * dir.1).round();
                if x < 0.0 || y < 0.0 || x as usize >= nx || y as usize >= ny {
                    continue;
                }
                if let Some(v) = moments.velocity[x as usize][y as usize] {
                    deviations.push((v - vsys).abs());
                    sign_sum += sign * (v - vsys);
                }
            }
            r += 1.0;
        }
        if !deviations.is_empty() {
            let score = Statistics::compute(&deviations).median;
            if score > best_score {
                best_score = score;
                best_pa = p;
                best_sign_sum = sign_sum;
            }
        }
        p += options.pa_step_deg;
    }

    if best_sign_sum < 0.0 {
        (best_pa + 180.0).rem_euclid(360.0)
    } else {
        best_pa
    }
}

/// Farthest non-blank pixel from `centre` along the direction `dir`
/// (unit-ish vector, any magnitude), in pixels.
fn farthest_along(moments: &MomentMaps, header: &Header, centre: (f64, f64), dir: (f64, f64)) -> f64 {
    let (nx, ny, _) = header.naxis;
    let max_r = ((nx * nx + ny * ny) as f64).sqrt();
    let mut best = 0.0;
    let mut r = 0.0;
    while r < max_r {
        let x = (centre.0 + r * dir.0).round();
        let y = (centre.1 + r * dir.1).round();
        if x < 0.0 || y < 0.0 || x as usize >= nx || y as usize >= ny {
            break;
        }
        if moments.intensity[x as usize][y as usize].is_some() {
            best = r;
        }
        r += 1.0;
    }
    best
}

fn guess_inclination_and_rmax(
    moments: &MomentMaps,
    header: &Header,
    centre: (f64, f64),
    pa: f64,
) -> Result<(f64, f64), GuesserError> {
    let rad = pa.to_radians();
    let major_dir = (-rad.cos(), -rad.sin());
    let minor_dir = (-(rad + std::f64::consts::FRAC_PI_2).cos(), -(rad + std::f64::consts::FRAC_PI_2).sin());

    let mut axmaj = farthest_along(moments, header, centre, major_dir)
        .max(farthest_along(moments, header, centre, (-major_dir.0, -major_dir.1)));
    let mut axmin = farthest_along(moments, header, centre, minor_dir)
        .max(farthest_along(moments, header, centre, (-minor_dir.0, -minor_dir.1)));

    if axmaj <= crate::constants::EPSILON {
        return Err(GuesserError::Degenerate("detection has zero extent".into()));
    }

    if axmin > axmaj {
        warn!("axmin ({axmin}) > axmaj ({axmaj}); swapping");
        std::mem::swap(&mut axmaj, &mut axmin);
    }

    let ratio = (axmin / axmaj).clamp(0.0, 1.0);
    let inc = ratio.acos().to_degrees();
    let rmax = axmaj * header.pixel_scale;
    Ok((inc, rmax))
}

/// Two-parameter `(Rmax, inc)` refinement (§4.7) minimising the mismatch
/// between the observed intensity map and a disposable flat-ring-profile
/// synthesis.
fn refine_inclination(
    moments: &MomentMaps,
    header: &Header,
    centre: (f64, f64),
    pa: f64,
    inc0: f64,
    rmax0: f64,
    options: &GuesserOptions,
) -> (f64, f64) {
    let (nx, ny, _) = header.naxis;
    let mut observed_i = vec![0.0f64; nx * ny];
    let mut peak = 0.0f64;
    for x in 0..nx {
        for y in 0..ny {
            let v = moments.intensity[x][y].unwrap_or(0.0);
            observed_i[x * ny + y] = v;
            peak = peak.max(v);
        }
    }
    if peak <= 0.0 {
        return (inc0, rmax0);
    }
    let scale = 1.0 / peak;

    let objective = |params: &[f64]| -> f64 {
        let rmax = params[0].max(1.0);
        let inc = params[1].clamp(1.0, 89.0);
        let n_rings = 6usize;
        let dr = rmax / n_rings as f64;
        let rings: Vec<Ring> = (0..n_rings)
            .map(|i| Ring {
                radius: dr * (i as f64 + 0.5),
                width: dr,
                xpos: centre.0,
                ypos: centre.1,
                vsys: 0.0,
                vrot: 0.0,
                vdisp: 1.0,
                vrad: 0.0,
                inc,
                pa,
                z0: 0.0,
                density: 1.0,
            })
            .collect();
        let ring_set = match RingSet::new(rings) {
            Ok(rs) => rs,
            Err(_) => return f64::INFINITY,
        };
        let galmod = Galmod::new(GalmodOptions {
            cdens: 20.0,
            smooth: false,
            normalisation: Normalisation::None,
            ..Default::default()
        });
        let model = match galmod.synthesise(header, &ring_set) {
            Ok(c) => c,
            Err(_) => return f64::INFINITY,
        };

        let mut total = 0.0f64;
        for x in 0..nx {
            for y in 0..ny {
                let model_i: f64 = (0..header.naxis.2).map(|z| model.get(x, y, z) as f64).sum();
                let model_i_norm = if model_i > 0.0 { 1.0 } else { 0.0 };
                let observed_norm = (observed_i[x * ny + y] * scale).min(1.0);
                total += (model_i_norm - observed_norm).abs();
            }
        }
        total
    };

    let result = simplex_minimise(
        &[rmax0, inc0],
        &[rmax0 * 0.1, inc0 * 0.1],
        &options.simplex,
        objective,
    );
    (result.best[1].clamp(1.0, 89.0), result.best[0].max(1.0))
}

fn ring_density(
    moments: &MomentMaps,
    header: &Header,
    centre: (f64, f64),
    pa: f64,
    inc: f64,
    radius: f64,
    width: f64,
) -> f64 {
    let (nx, ny, _) = header.naxis;
    let mut sum = 0.0f64;
    for x in 0..nx {
        for y in 0..ny {
            if let Some(v) = moments.intensity[x][y] {
                let (r, _theta) = pixel_to_ring(header, x as f64, y as f64, inc, pa, centre.0, centre.1);
                if (r - radius).abs() <= width / 2.0 {
                    sum += v;
                }
            }
        }
    }
    let area = std::f64::consts::PI * ((radius + width / 2.0).powi(2) - (radius - width / 2.0).max(0.0).powi(2));
    if area > 0.0 {
        (sum * header.pixel_scale.powi(2) / area).max(0.01)
    } else {
        0.01
    }
}
