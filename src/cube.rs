// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The observed/synthesised data cube and the header describing its grid.

use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};

/// What physical quantity the cube's third (spectral) axis samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpectralAxis {
    Frequency,
    Wavelength,
    Velocity,
}

/// Convention used to convert a frequency or wavelength into a velocity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VelocityDefinition {
    Radio,
    Optical,
    Relativistic,
}

/// The instrument's elliptical Gaussian beam (point-spread function).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Beam {
    /// Major-axis FWHM \[arcsec\].
    pub bmaj: f64,
    /// Minor-axis FWHM \[arcsec\].
    pub bmin: f64,
    /// Position angle, east of north \[deg\].
    pub bpa: f64,
}

impl Beam {
    /// A sentinel meaning "no beam known yet". `bmaj < 0` is the convention
    /// §4.2 uses to signal an error at convolution time.
    pub const UNSET: Self = Self {
        bmaj: -1.0,
        bmin: -1.0,
        bpa: 0.0,
    };

    pub fn is_set(&self) -> bool {
        self.bmaj >= 0.0 && self.bmin >= 0.0
    }
}

/// Immutable descriptor of a cube's pixel/velocity grid and instrument beam.
/// Every other component reads this read-only; it never changes during a
/// run.
#[derive(Clone, Debug)]
pub struct Header {
    pub naxis: (usize, usize, usize),
    /// Pixel scale \[arcsec/pixel\]. Assumed equal on both spatial axes.
    pub pixel_scale: f64,
    /// Reference pixel per axis (1-indexed, FITS convention), `(x, y, z)`.
    pub crpix: (f64, f64, f64),
    /// Reference value per axis, in the axis's native unit.
    pub crval: (f64, f64, f64),
    /// Increment per pixel along each axis, in the axis's native unit.
    pub cdelt: (f64, f64, f64),
    pub spectral_axis: SpectralAxis,
    pub velocity_definition: VelocityDefinition,
    /// Rest frequency \[Hz\] or rest wavelength \[m\], matching
    /// `spectral_axis`.
    pub rest: f64,
    pub beam: Beam,
    pub flux_unit: String,
    /// Value used to mark invalid/missing samples.
    pub blank: f32,
}

impl Header {
    /// Channel width along the spectral axis, in the axis's native unit.
    pub fn chan_width(&self) -> f64 {
        self.cdelt.2
    }
}

/// A contiguous 3D array of samples indexed `(x, y, z)`, with `x, y` spanning
/// spatial pixels and `z` spanning spectral channels. Owns an optional
/// companion mask (`true` = include the voxel).
#[derive(Clone, Debug)]
pub struct Cube {
    data: Array3<f32>,
    mask: Option<Array3<bool>>,
    blank: f32,
}

impl Cube {
    pub fn zeros(dims: (usize, usize, usize), blank: f32) -> Self {
        Self {
            data: Array3::zeros(dims),
            mask: None,
            blank,
        }
    }

    pub fn from_array(data: Array3<f32>, blank: f32) -> Self {
        Self {
            data,
            mask: None,
            blank,
        }
    }

    pub fn with_mask(mut self, mask: Array3<bool>) -> Self {
        assert_eq!(mask.dim(), self.data.dim());
        self.mask = Some(mask);
        self
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn mask(&self) -> Option<&Array3<bool>> {
        self.mask.as_ref()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[[x, y, z]]
    }

    #[inline]
    pub fn is_blank(&self, x: usize, y: usize, z: usize) -> bool {
        if let Some(mask) = &self.mask {
            if !mask[[x, y, z]] {
                return true;
            }
        }
        let v = self.data[[x, y, z]];
        v.is_nan() || v == self.blank
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64, z: i64) -> bool {
        let (nx, ny, nz) = self.dims();
        x >= 0 && y >= 0 && z >= 0 && (x as usize) < nx && (y as usize) < ny && (z as usize) < nz
    }

    /// Add `flux` into the voxel nearest `(x, y, z)`, if it lies inside the
    /// cube. No bilinear interpolation: flux goes to a single voxel (§4.3).
    #[inline]
    pub fn deposit_nearest(&mut self, x: f64, y: f64, z: f64, flux: f32) -> bool {
        let xi = x.round() as i64;
        let yi = y.round() as i64;
        let zi = z.round() as i64;
        if !self.in_bounds(xi, yi, zi) {
            return false;
        }
        self.data[[xi as usize, yi as usize, zi as usize]] += flux;
        true
    }

    pub fn plane(&self, z: usize) -> ArrayView2<f32> {
        self.data.index_axis(Axis(2), z)
    }

    pub fn plane_mut(&mut self, z: usize) -> ArrayViewMut2<f32> {
        self.data.index_axis_mut(Axis(2), z)
    }

    /// Iterate over spectral planes `(z, view)`, immutably.
    pub fn iter_planes(&self) -> impl Iterator<Item = (usize, ArrayView2<f32>)> {
        (0..self.dims().2).map(move |z| (z, self.plane(z)))
    }

    pub fn total_flux(&self) -> f64 {
        let (nx, ny, nz) = self.dims();
        let mut total = 0.0;
        for x in 0..nx {
            for y in 0..ny {
                for z in 0..nz {
                    if !self.is_blank(x, y, z) {
                        total += self.data[[x, y, z]] as f64;
                    }
                }
            }
        }
        total
    }
}
