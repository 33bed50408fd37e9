// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A 3D connected-component detection (§3) produced by the source finder
//! and consumed by the parameter guesser.

use std::collections::BTreeMap;

use ndarray::Array3;

use crate::geometry::velocity_of;
use crate::cube::{Cube, Header};

/// One contiguous horizontal run of voxels within a single row of a single
/// channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scan {
    pub y: usize,
    pub x_start: usize,
    /// Exclusive.
    pub x_end: usize,
}

impl Scan {
    pub fn len(&self) -> usize {
        self.x_end - self.x_start
    }

    pub fn touches(&self, other: &Scan, gap: usize) -> bool {
        if self.y.abs_diff(other.y) > gap {
            return false;
        }
        let a_start = self.x_start.saturating_sub(gap);
        let a_end = self.x_end + gap;
        a_start < other.x_end && other.x_start < a_end
    }
}

/// A 2D connected object within a single channel: a set of [`Scan`]s.
#[derive(Clone, Debug, Default)]
pub struct Object2D {
    pub scans: Vec<Scan>,
}

impl Object2D {
    pub fn voxel_count(&self) -> usize {
        self.scans.iter().map(Scan::len).sum()
    }

    pub fn bbox(&self) -> Option<(usize, usize, usize, usize)> {
        if self.scans.is_empty() {
            return None;
        }
        let xmin = self.scans.iter().map(|s| s.x_start).min().unwrap();
        let xmax = self.scans.iter().map(|s| s.x_end - 1).max().unwrap();
        let ymin = self.scans.iter().map(|s| s.y).min().unwrap();
        let ymax = self.scans.iter().map(|s| s.y).max().unwrap();
        Some((xmin, xmax, ymin, ymax))
    }

    pub fn overlaps(&self, other: &Object2D, gap: usize) -> bool {
        self.scans
            .iter()
            .any(|a| other.scans.iter().any(|b| a.touches(b, gap)))
    }

    pub fn merge(&mut self, other: Object2D) {
        self.scans.extend(other.scans);
    }

    pub fn iter_voxels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.scans
            .iter()
            .flat_map(|s| (s.x_start..s.x_end).map(move |x| (x, s.y)))
    }
}

/// A 3D connected-component object: a sorted channel -> [`Object2D`] map.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    pub planes: BTreeMap<usize, Object2D>,
}

impl Detection {
    pub fn voxel_count(&self) -> usize {
        self.planes.values().map(Object2D::voxel_count).sum()
    }

    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    /// Bounding box `(xmin, xmax, ymin, ymax, zmin, zmax)`, all inclusive.
    pub fn bbox(&self) -> Option<(usize, usize, usize, usize, usize, usize)> {
        if self.planes.is_empty() {
            return None;
        }
        let zmin = *self.planes.keys().next().unwrap();
        let zmax = *self.planes.keys().last().unwrap();
        let mut xmin = usize::MAX;
        let mut xmax = 0;
        let mut ymin = usize::MAX;
        let mut ymax = 0;
        for obj in self.planes.values() {
            if let Some((x0, x1, y0, y1)) = obj.bbox() {
                xmin = xmin.min(x0);
                xmax = xmax.max(x1);
                ymin = ymin.min(y0);
                ymax = ymax.max(y1);
            }
        }
        Some((xmin, xmax, ymin, ymax, zmin, zmax))
    }

    /// Integrated flux, flux-weighted centroid `(xCen, yCen, zCen)`.
    pub fn centroid(&self, cube: &Cube) -> (f64, f64, f64, f64) {
        let mut flux = 0.0f64;
        let mut sx = 0.0f64;
        let mut sy = 0.0f64;
        let mut sz = 0.0f64;
        for (&z, obj) in &self.planes {
            for (x, y) in obj.iter_voxels() {
                let v = cube.get(x, y, z) as f64;
                flux += v;
                sx += v * x as f64;
                sy += v * y as f64;
                sz += v * z as f64;
            }
        }
        if flux.abs() < crate::constants::EPSILON {
            return (0.0, 0.0, 0.0, 0.0);
        }
        (flux, sx / flux, sy / flux, sz / flux)
    }

    /// The integrated spectrum: total flux per channel over this
    /// detection's footprint.
    pub fn integrated_spectrum(&self, cube: &Cube) -> Vec<(usize, f64)> {
        self.planes
            .iter()
            .map(|(&z, obj)| {
                let flux: f64 = obj.iter_voxels().map(|(x, y)| cube.get(x, y, z) as f64).sum();
                (z, flux)
            })
            .collect()
    }

    /// Full width at half-maximum of the integrated spectrum, in km/s.
    pub fn w50(&self, cube: &Cube, header: &Header) -> f64 {
        let spectrum = self.integrated_spectrum(cube);
        if spectrum.is_empty() {
            return 0.0;
        }
        let peak = spectrum.iter().map(|&(_, f)| f).fold(f64::MIN, f64::max);
        if peak <= 0.0 {
            return 0.0;
        }
        let half = peak / 2.0;
        let above: Vec<usize> = spectrum
            .iter()
            .filter(|&&(_, f)| f >= half)
            .map(|&(z, _)| z)
            .collect();
        if above.is_empty() {
            return 0.0;
        }
        let zmin = *above.iter().min().unwrap();
        let zmax = *above.iter().max().unwrap();
        (velocity_of(header, zmax as f64) - velocity_of(header, zmin as f64)).abs()
    }

    /// Systemic velocity from the first moment of the integrated spectrum.
    pub fn systemic_velocity(&self, cube: &Cube, header: &Header) -> f64 {
        let spectrum = self.integrated_spectrum(cube);
        let total: f64 = spectrum.iter().map(|&(_, f)| f).sum();
        if total.abs() < crate::constants::EPSILON {
            return 0.0;
        }
        let weighted: f64 = spectrum
            .iter()
            .map(|&(z, f)| f * velocity_of(header, z as f64))
            .sum();
        weighted / total
    }

    /// Flatten this detection onto a dense boolean mask matching `dims`,
    /// for use as a residual-evaluator `SEARCHING` mask.
    pub fn to_dense_mask(&self, dims: (usize, usize, usize)) -> Array3<bool> {
        let mut mask = Array3::from_elem(dims, false);
        for (&z, obj) in &self.planes {
            for (x, y) in obj.iter_voxels() {
                mask[[x, y, z]] = true;
            }
        }
        mask
    }
}
