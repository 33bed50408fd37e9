// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The tilted-ring data model: a single [`Ring`] and an ordered [`RingSet`].

use thiserror::Error;

/// One annulus of the tilted-ring model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ring {
    /// Radius \[arcsec\].
    pub radius: f64,
    /// Ring width \[arcsec\]. Invariant: `width > 0`.
    pub width: f64,
    /// Centre x \[pixels\].
    pub xpos: f64,
    /// Centre y \[pixels\].
    pub ypos: f64,
    /// Systemic velocity \[km/s\].
    pub vsys: f64,
    /// Rotation velocity \[km/s\].
    pub vrot: f64,
    /// Velocity dispersion \[km/s\]. Invariant: `vdisp > 0`.
    pub vdisp: f64,
    /// Radial velocity \[km/s\].
    pub vrad: f64,
    /// Inclination \[deg\]. Invariant: `0 <= inc <= 90`.
    pub inc: f64,
    /// Position angle, east of north \[deg\]. Invariant: `0 <= pa < 360`.
    pub pa: f64,
    /// Vertical scale height \[arcsec\]. Invariant: `z0 >= 0`.
    pub z0: f64,
    /// Column density \[atoms/cm^2\].
    pub density: f64,
}

impl Ring {
    /// Area of the annulus, in arcsec^2.
    pub fn area(&self) -> f64 {
        let r_in = (self.radius - self.width / 2.0).max(0.0);
        let r_out = self.radius + self.width / 2.0;
        crate::constants::PI * (r_out * r_out - r_in * r_in)
    }

    /// Check the invariants documented on the struct.
    pub fn validate(&self) -> Result<(), RingError> {
        if !(self.width > 0.0) {
            return Err(RingError::Invariant("width must be > 0".into()));
        }
        if !(0.0..=90.0).contains(&self.inc) {
            return Err(RingError::Invariant("inc must be in [0, 90]".into()));
        }
        if !(0.0..360.0).contains(&self.pa) {
            return Err(RingError::Invariant("pa must be in [0, 360)".into()));
        }
        if !(self.vdisp > 0.0) {
            return Err(RingError::Invariant("vdisp must be > 0".into()));
        }
        if self.z0 < 0.0 {
            return Err(RingError::Invariant("z0 must be >= 0".into()));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum RingError {
    #[error("ring invariant violated: {0}")]
    Invariant(String),
    #[error("ring radii are not strictly increasing")]
    NonMonotonic,
}

/// An ordered sequence of [`Ring`]s, innermost first, sharing a common ring
/// width. Mutated in place by the fitter; consumed by the synthesiser.
#[derive(Clone, Debug, Default)]
pub struct RingSet {
    rings: Vec<Ring>,
}

impl RingSet {
    pub fn new(rings: Vec<Ring>) -> Result<Self, RingError> {
        for w in rings.windows(2) {
            if !(w[1].radius > w[0].radius) {
                return Err(RingError::NonMonotonic);
            }
        }
        for r in &rings {
            r.validate()?;
        }
        Ok(Self { rings })
    }

    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn get(&self, i: usize) -> &Ring {
        &self.rings[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Ring {
        &mut self.rings[i]
    }

    pub fn set(&mut self, i: usize, ring: Ring) {
        self.rings[i] = ring;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ring> {
        self.rings.iter()
    }

    pub fn as_slice(&self) -> &[Ring] {
        &self.rings
    }

    /// Maximum ring radius plus a half-width of margin.
    pub fn max_radius(&self) -> f64 {
        self.rings
            .last()
            .map(|r| r.radius + r.width / 2.0)
            .unwrap_or(0.0)
    }
}

/// A free parameter the fitter is allowed to adjust. All others stay clamped
/// to the ring set's current values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FreeParam {
    Vrot,
    Vdisp,
    Vrad,
    Inc,
    Pa,
    Xpos,
    Ypos,
    Vsys,
    Z0,
}

impl FreeParam {
    pub const ALL: [FreeParam; 9] = [
        FreeParam::Vrot,
        FreeParam::Vdisp,
        FreeParam::Vrad,
        FreeParam::Inc,
        FreeParam::Pa,
        FreeParam::Xpos,
        FreeParam::Ypos,
        FreeParam::Vsys,
        FreeParam::Z0,
    ];

    /// Whether this is one of the "geometrical" parameters typically chosen
    /// for the regularisation pass (§4.5).
    pub fn is_geometrical(self) -> bool {
        matches!(
            self,
            FreeParam::Inc
                | FreeParam::Pa
                | FreeParam::Xpos
                | FreeParam::Ypos
                | FreeParam::Vsys
                | FreeParam::Z0
        )
    }

    /// Fractional perturbation used to build the initial simplex (§4.5):
    /// 10% for vrot/vdisp, 5% for angles and everything else.
    pub fn perturbation_fraction(self) -> f64 {
        match self {
            FreeParam::Vrot | FreeParam::Vdisp => 0.10,
            _ => 0.05,
        }
    }

    pub fn get(self, ring: &Ring) -> f64 {
        match self {
            FreeParam::Vrot => ring.vrot,
            FreeParam::Vdisp => ring.vdisp,
            FreeParam::Vrad => ring.vrad,
            FreeParam::Inc => ring.inc,
            FreeParam::Pa => ring.pa,
            FreeParam::Xpos => ring.xpos,
            FreeParam::Ypos => ring.ypos,
            FreeParam::Vsys => ring.vsys,
            FreeParam::Z0 => ring.z0,
        }
    }

    pub fn set(self, ring: &mut Ring, value: f64) {
        match self {
            FreeParam::Vrot => ring.vrot = value,
            FreeParam::Vdisp => ring.vdisp = value.max(1e-3),
            FreeParam::Vrad => ring.vrad = value,
            FreeParam::Inc => ring.inc = value.clamp(0.0, 90.0),
            FreeParam::Pa => ring.pa = value.rem_euclid(360.0),
            FreeParam::Xpos => ring.xpos = value,
            FreeParam::Ypos => ring.ypos = value,
            FreeParam::Vsys => ring.vsys = value,
            FreeParam::Z0 => ring.z0 = value.max(0.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FreeParam::Vrot => "VROT",
            FreeParam::Vdisp => "VDISP",
            FreeParam::Vrad => "VRAD",
            FreeParam::Inc => "INC",
            FreeParam::Pa => "PA",
            FreeParam::Xpos => "XPOS",
            FreeParam::Ypos => "YPOS",
            FreeParam::Vsys => "VSYS",
            FreeParam::Z0 => "Z0",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(radius: f64) -> Ring {
        Ring {
            radius,
            width: 10.0,
            xpos: 32.0,
            ypos: 32.0,
            vsys: 500.0,
            vrot: 100.0,
            vdisp: 8.0,
            vrad: 0.0,
            inc: 60.0,
            pa: 90.0,
            z0: 0.0,
            density: 1.0,
        }
    }

    #[test]
    fn rejects_non_monotonic_radii() {
        let rings = vec![ring(20.0), ring(10.0)];
        assert!(matches!(
            RingSet::new(rings),
            Err(RingError::NonMonotonic)
        ));
    }

    #[test]
    fn rejects_invalid_inclination() {
        let mut r = ring(10.0);
        r.inc = 120.0;
        assert!(r.validate().is_err());
    }

    #[test]
    fn free_param_roundtrips() {
        let mut r = ring(10.0);
        for p in FreeParam::ALL {
            let v = p.get(&r) + 1.0;
            p.set(&mut r, v);
        }
        assert!((r.vrot - 101.0).abs() < 1e-9);
    }
}
