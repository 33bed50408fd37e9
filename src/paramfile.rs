// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parameter-file format (§6): key/value pairs, one per line, `#`
//! comments, parsed into a typed [`Config`]. Round-trips through
//! [`Config::parse`]/[`Config::to_string`] (§8 "Round trips").

use std::fmt::Write as _;

use thiserror::Error;

use crate::constants::{DEFAULT_CDENS, DEFAULT_TOL};
use crate::galmod::LType;
use crate::residual::{Ftype, WeightFunc};
use crate::ring::FreeParam;

#[derive(Error, Debug)]
pub enum ParamFileError {
    #[error("line {line}: expected KEY VALUE, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: unrecognised key {key:?}")]
    UnknownKey { line: usize, key: String },
    #[error("line {line}: invalid value {value:?} for key {key}: {reason}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
        reason: String,
    },
}

/// A ring-parameter guess source: either derive it automatically, take a
/// fixed value, or read it from a named file (one value per ring).
#[derive(Clone, Debug, PartialEq)]
pub enum GuessSource {
    Auto,
    Value(f64),
    File(String),
}

impl GuessSource {
    fn parse(_key: &str, value: &str, _line: usize) -> Result<Self, ParamFileError> {
        if value.eq_ignore_ascii_case("auto") {
            return Ok(GuessSource::Auto);
        }
        match value.parse::<f64>() {
            Ok(v) => Ok(GuessSource::Value(v)),
            Err(_) => Ok(GuessSource::File(value.to_string())),
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            GuessSource::Auto => out.push_str("auto"),
            GuessSource::Value(v) => {
                let _ = write!(out, "{v}");
            }
            GuessSource::File(f) => out.push_str(f),
        }
    }
}

/// `NORM`: the per-ring/per-pixel flux normalisation scheme. Distinct from
/// [`crate::galmod::Normalisation`], which additionally carries the
/// reference map/profile data this file format can't hold directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormKind {
    Local,
    Azimuthal,
    None,
}

/// `MASK`: which voxels the residual evaluator includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskTag {
    Smooth,
    Search,
    Both,
    Threshold,
    Negative,
    None,
}

/// `SIDE`: which half of the galaxy (by kinematic major axis) to fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Approaching,
    Receding,
    Both,
}

/// A fully-parsed parameter file (§6). Fields mirror the recognised keys
/// exactly; defaults match the ones spec.md documents.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub nradii: Option<usize>,
    pub radsep: Option<f64>,
    pub xpos: GuessSource,
    pub ypos: GuessSource,
    pub vsys: GuessSource,
    pub vrot: GuessSource,
    pub vdisp: GuessSource,
    pub inc: GuessSource,
    pub pa: GuessSource,
    pub z0: GuessSource,
    pub dens: GuessSource,
    pub free: Vec<FreeParam>,
    pub ftype: Ftype,
    pub wfunc: WeightFunc,
    pub norm: NormKind,
    pub ltype: LType,
    pub cdens: f64,
    pub nv: Option<usize>,
    pub tol: f64,
    pub mask: MaskTag,
    pub mask_threshold: Option<f64>,
    pub side: Side,
    pub twostage: bool,
    pub polyn: i32,
    pub flagerrors: bool,
    pub threads: Option<usize>,
    pub outfolder: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nradii: None,
            radsep: None,
            xpos: GuessSource::Auto,
            ypos: GuessSource::Auto,
            vsys: GuessSource::Auto,
            vrot: GuessSource::Auto,
            vdisp: GuessSource::Auto,
            inc: GuessSource::Auto,
            pa: GuessSource::Auto,
            z0: GuessSource::Auto,
            dens: GuessSource::Auto,
            free: vec![FreeParam::Vrot, FreeParam::Inc, FreeParam::Pa],
            ftype: Ftype::Chi2,
            wfunc: WeightFunc::Uniform,
            norm: NormKind::None,
            ltype: LType::Gaussian,
            cdens: DEFAULT_CDENS,
            nv: None,
            tol: DEFAULT_TOL,
            mask: MaskTag::None,
            mask_threshold: None,
            side: Side::Both,
            twostage: false,
            polyn: 1,
            flagerrors: false,
            threads: None,
            outfolder: None,
        }
    }
}

impl Config {
    /// Parse a whole parameter-file's contents. Unrecognised keys and
    /// malformed values are reported with the offending 1-indexed line.
    pub fn parse(text: &str) -> Result<Self, ParamFileError> {
        let mut config = Config::default();

        for (i, raw_line) in text.lines().enumerate() {
            let line = i + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or("").to_uppercase();
            let value = parts.next().unwrap_or("").trim();
            if value.is_empty() {
                return Err(ParamFileError::Malformed {
                    line,
                    text: trimmed.to_string(),
                });
            }
            config.apply(&key, value, line)?;
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str, line: usize) -> Result<(), ParamFileError> {
        let invalid = |reason: &str| ParamFileError::InvalidValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match key {
            "NRADII" => self.nradii = Some(parse_usize(value).map_err(|_| invalid("expected an integer"))?),
            "RADSEP" => self.radsep = Some(parse_f64(value).map_err(|_| invalid("expected a number"))?),
            "XPOS" => self.xpos = GuessSource::parse(key, value, line)?,
            "YPOS" => self.ypos = GuessSource::parse(key, value, line)?,
            "VSYS" => self.vsys = GuessSource::parse(key, value, line)?,
            "VROT" => self.vrot = GuessSource::parse(key, value, line)?,
            "VDISP" => self.vdisp = GuessSource::parse(key, value, line)?,
            "INC" => self.inc = GuessSource::parse(key, value, line)?,
            "PA" => self.pa = GuessSource::parse(key, value, line)?,
            "Z0" => self.z0 = GuessSource::parse(key, value, line)?,
            "DENS" => self.dens = GuessSource::parse(key, value, line)?,
            "FREE" => {
                self.free = value
                    .split_whitespace()
                    .map(|name| free_param_from_name(name).ok_or_else(|| invalid(&format!("unknown free parameter {name:?}"))))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            "FTYPE" => {
                self.ftype = match value {
                    "1" => Ftype::Chi2,
                    "2" => Ftype::AbsDiff,
                    "3" => Ftype::NormAbsDiff,
                    _ => return Err(invalid("expected 1, 2 or 3")),
                };
            }
            "WFUNC" => {
                self.wfunc = match value {
                    "0" => WeightFunc::Uniform,
                    "1" => WeightFunc::AbsCos,
                    "2" => WeightFunc::Cos2,
                    _ => return Err(invalid("expected 0, 1 or 2")),
                };
            }
            "NORM" => {
                self.norm = match value.to_lowercase().as_str() {
                    "local" => NormKind::Local,
                    "azim" => NormKind::Azimuthal,
                    "none" => NormKind::None,
                    _ => return Err(invalid("expected local, azim or none")),
                };
            }
            "LTYPE" => {
                self.ltype = match value {
                    "1" => LType::Gaussian,
                    "2" => LType::Sech2,
                    "3" => LType::Exponential,
                    "4" => LType::Lorentzian,
                    "5" => LType::Box,
                    _ => return Err(invalid("expected 1..5")),
                };
            }
            "CDENS" => self.cdens = parse_f64(value).map_err(|_| invalid("expected a number"))?,
            "NV" => {
                self.nv = if value.eq_ignore_ascii_case("auto") {
                    None
                } else {
                    Some(parse_usize(value).map_err(|_| invalid("expected an integer or auto"))?)
                };
            }
            "TOL" => self.tol = parse_f64(value).map_err(|_| invalid("expected a number"))?,
            "MASK" => {
                self.mask = match value.to_lowercase().as_str() {
                    "smooth" => MaskTag::Smooth,
                    "search" => MaskTag::Search,
                    "both" => MaskTag::Both,
                    "threshold" => MaskTag::Threshold,
                    "negative" => MaskTag::Negative,
                    "none" => MaskTag::None,
                    _ => return Err(invalid("expected smooth, search, both, threshold, negative or none")),
                };
            }
            "MASKTHRESHOLD" => self.mask_threshold = Some(parse_f64(value).map_err(|_| invalid("expected a number"))?),
            "SIDE" => {
                self.side = match value.to_uppercase().as_str() {
                    "A" => Side::Approaching,
                    "R" => Side::Receding,
                    "B" => Side::Both,
                    _ => return Err(invalid("expected A, R or B")),
                };
            }
            "TWOSTAGE" => self.twostage = parse_bool(value).map_err(|_| invalid("expected true/false"))?,
            "POLYN" => self.polyn = value.parse::<i32>().map_err(|_| invalid("expected an integer"))?,
            "FLAGERRORS" => self.flagerrors = parse_bool(value).map_err(|_| invalid("expected true/false"))?,
            "THREADS" => {
                self.threads = if value.eq_ignore_ascii_case("auto") {
                    None
                } else {
                    Some(parse_usize(value).map_err(|_| invalid("expected an integer or auto"))?)
                };
            }
            "OUTFOLDER" => self.outfolder = Some(value.to_string()),
            _ => {
                return Err(ParamFileError::UnknownKey {
                    line,
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        if let Some(n) = self.nradii {
            let _ = writeln!(out, "NRADII {n}");
        }
        if let Some(r) = self.radsep {
            let _ = writeln!(out, "RADSEP {r}");
        }
        for (key, src) in [
            ("XPOS", &self.xpos),
            ("YPOS", &self.ypos),
            ("VSYS", &self.vsys),
            ("VROT", &self.vrot),
            ("VDISP", &self.vdisp),
            ("INC", &self.inc),
            ("PA", &self.pa),
            ("Z0", &self.z0),
            ("DENS", &self.dens),
        ] {
            out.push_str(key);
            out.push(' ');
            src.write(&mut out);
            out.push('\n');
        }
        let free_names: Vec<&str> = self.free.iter().map(|p| p.name()).collect();
        let _ = writeln!(out, "FREE {}", free_names.join(" "));
        let _ = writeln!(
            out,
            "FTYPE {}",
            match self.ftype {
                Ftype::Chi2 => 1,
                Ftype::AbsDiff => 2,
                Ftype::NormAbsDiff => 3,
            }
        );
        let _ = writeln!(
            out,
            "WFUNC {}",
            match self.wfunc {
                WeightFunc::Uniform => 0,
                WeightFunc::AbsCos => 1,
                WeightFunc::Cos2 => 2,
            }
        );
        let _ = writeln!(
            out,
            "NORM {}",
            match self.norm {
                NormKind::Local => "local",
                NormKind::Azimuthal => "azim",
                NormKind::None => "none",
            }
        );
        let _ = writeln!(
            out,
            "LTYPE {}",
            match self.ltype {
                LType::Gaussian => 1,
                LType::Sech2 => 2,
                LType::Exponential => 3,
                LType::Lorentzian => 4,
                LType::Box => 5,
            }
        );
        let _ = writeln!(out, "CDENS {}", self.cdens);
        match self.nv {
            Some(nv) => {
                let _ = writeln!(out, "NV {nv}");
            }
            None => out.push_str("NV auto\n"),
        }
        let _ = writeln!(out, "TOL {}", self.tol);
        let _ = writeln!(
            out,
            "MASK {}",
            match self.mask {
                MaskTag::Smooth => "smooth",
                MaskTag::Search => "search",
                MaskTag::Both => "both",
                MaskTag::Threshold => "threshold",
                MaskTag::Negative => "negative",
                MaskTag::None => "none",
            }
        );
        if let Some(t) = self.mask_threshold {
            let _ = writeln!(out, "MASKTHRESHOLD {t}");
        }
        let _ = writeln!(
            out,
            "SIDE {}",
            match self.side {
                Side::Approaching => "A",
                Side::Receding => "R",
                Side::Both => "B",
            }
        );
        let _ = writeln!(out, "TWOSTAGE {}", self.twostage);
        let _ = writeln!(out, "POLYN {}", self.polyn);
        let _ = writeln!(out, "FLAGERRORS {}", self.flagerrors);
        match self.threads {
            Some(t) => {
                let _ = writeln!(out, "THREADS {t}");
            }
            None => out.push_str("THREADS auto\n"),
        }
        if let Some(folder) = &self.outfolder {
            let _ = writeln!(out, "OUTFOLDER {folder}");
        }
        write!(f, "{out}")
    }
}

fn parse_f64(value: &str) -> Result<f64, std::num::ParseFloatError> {
    value.parse()
}

fn parse_usize(value: &str) -> Result<usize, std::num::ParseIntError> {
    value.parse()
}

fn parse_bool(value: &str) -> Result<bool, ()> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(()),
    }
}

fn free_param_from_name(name: &str) -> Option<FreeParam> {
    FreeParam::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_when_given_minimal_keys() {
        let config = Config::parse("FREE VROT INC\n").unwrap();
        assert_eq!(config.free, vec![FreeParam::Vrot, FreeParam::Inc]);
        assert_eq!(config.cdens, DEFAULT_CDENS);
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "# a comment\n\nFTYPE 2\n";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.ftype, Ftype::AbsDiff);
    }

    #[test]
    fn rejects_unknown_key() {
        let result = Config::parse("BOGUS 1\n");
        assert!(matches!(result, Err(ParamFileError::UnknownKey { .. })));
    }

    #[test]
    fn rejects_malformed_line() {
        let result = Config::parse("FTYPE\n");
        assert!(matches!(result, Err(ParamFileError::Malformed { .. })));
    }

    #[test]
    fn xpos_accepts_auto_value_or_path() {
        let config = Config::parse("XPOS auto\nYPOS 12.5\n").unwrap();
        assert_eq!(config.xpos, GuessSource::Auto);
        assert_eq!(config.ypos, GuessSource::Value(12.5));
    }

    #[test]
    fn round_trips_every_recognised_key() {
        let mut config = Config::default();
        config.nradii = Some(12);
        config.radsep = Some(10.0);
        config.xpos = GuessSource::Value(32.0);
        config.vrot = GuessSource::File("vrot.dat".to_string());
        config.free = vec![FreeParam::Vrot, FreeParam::Inc, FreeParam::Pa];
        config.mask = MaskTag::Threshold;
        config.mask_threshold = Some(0.5);
        config.twostage = true;
        config.polyn = -1;
        config.threads = Some(4);
        config.outfolder = Some("out".to_string());

        let text = config.to_string();
        let reparsed = Config::parse(&text).unwrap();
        assert_eq!(reparsed, config);
    }
}
