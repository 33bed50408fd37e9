// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Ring-file I/O (§6): whitespace-delimited text, one ring per row, columns
//! `(index, radius, vrot, vdisp, inc, pa, z0, xpos, ypos, vsys, vrad, density)`.
//! `#`-prefixed lines are comments. Per-ring errors are written to a parallel
//! file with the same schema and an `err` suffix per column.

use std::collections::HashMap;
use std::io::{self, Write};

use thiserror::Error;

use crate::ring::{FreeParam, Ring, RingError, RingSet};

#[derive(Error, Debug)]
pub enum RingIoError {
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("line {line}: expected 12 whitespace-separated columns, got {found}")]
    WrongColumnCount { line: usize, found: usize },
    #[error("line {line}: column {column} ({value:?}) is not a number")]
    NotANumber {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error(transparent)]
    InvalidRingSet(#[from] RingError),
}

const COLUMNS: [&str; 12] = [
    "index", "radius", "vrot", "vdisp", "inc", "pa", "z0", "xpos", "ypos", "vsys", "vrad", "density",
];

/// Parse a ring file's contents into a [`RingSet`].
pub fn read_ring_set(text: &str) -> Result<RingSet, RingIoError> {
    let mut rings = Vec::new();
    for (i, raw_line) in text.lines().enumerate() {
        let line = i + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != COLUMNS.len() {
            return Err(RingIoError::WrongColumnCount {
                line,
                found: fields.len(),
            });
        }
        let f = |idx: usize| -> Result<f64, RingIoError> {
            fields[idx]
                .parse::<f64>()
                .map_err(|_| RingIoError::NotANumber {
                    line,
                    column: COLUMNS[idx],
                    value: fields[idx].to_string(),
                })
        };
        rings.push(Ring {
            radius: f(1)?,
            vrot: f(2)?,
            vdisp: f(3)?,
            inc: f(4)?,
            pa: f(5)?,
            z0: f(6)?,
            xpos: f(7)?,
            ypos: f(8)?,
            vsys: f(9)?,
            vrad: f(10)?,
            density: f(11)?,
            width: 0.0,
        });
    }

    // Ring files don't carry an explicit width column; it's derived from the
    // radial spacing between consecutive rings (the common Delta-r every
    // ring in a RingSet shares).
    let spacing = if rings.len() >= 2 {
        rings[1].radius - rings[0].radius
    } else {
        rings.first().map(|r| 2.0 * r.radius).unwrap_or(1.0)
    };
    for ring in &mut rings {
        ring.width = spacing;
    }

    RingSet::new(rings).map_err(RingIoError::from)
}

/// Write `rings` to the whitespace-delimited schema described at the top of
/// this module.
pub fn write_ring_set<W: Write>(mut out: W, rings: &RingSet) -> Result<(), RingIoError> {
    writeln!(out, "# {}", COLUMNS.join(" "))?;
    for (i, ring) in rings.iter().enumerate() {
        writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            i,
            ring.radius,
            ring.vrot,
            ring.vdisp,
            ring.inc,
            ring.pa,
            ring.z0,
            ring.xpos,
            ring.ypos,
            ring.vsys,
            ring.vrad,
            ring.density,
        )?;
    }
    Ok(())
}

/// Write per-ring parameter uncertainties (as produced by the fitter's
/// `compute_errors` option) to the same schema, with zero for any column
/// that wasn't a free parameter for that ring.
pub fn write_ring_errors<W: Write>(
    mut out: W,
    rings: &RingSet,
    errors: &[HashMap<FreeParam, f64>],
) -> Result<(), RingIoError> {
    writeln!(out, "# {}", COLUMNS.join(" "))?;
    for (i, ring) in rings.iter().enumerate() {
        let e = errors.get(i);
        let col = |p: FreeParam| e.and_then(|m| m.get(&p)).copied().unwrap_or(0.0);
        writeln!(
            out,
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            i,
            ring.radius,
            col(FreeParam::Vrot),
            col(FreeParam::Vdisp),
            col(FreeParam::Inc),
            col(FreeParam::Pa),
            col(FreeParam::Z0),
            col(FreeParam::Xpos),
            col(FreeParam::Ypos),
            col(FreeParam::Vsys),
            col(FreeParam::Vrad),
            0.0, // density has no fitted uncertainty: it is never a FreeParam.
        )?;
    }
    Ok(())
}
