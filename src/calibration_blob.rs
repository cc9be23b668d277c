//! Binary calibration record.
//!
//! Stands in for the factory calibration data a SoC keeps in eFuse: per
//! attenuation a bias code, one reference point and optional curve
//! coefficients. Layout (little endian):
//!
//! ```text
//! "ADCC" | version: u8 | unit: u8 | entry_count: u8 | entries...
//! entry: atten: u8 | bitwidth: u8 | init_code: u16 | ref_code: u16 | ref_mv: u16
//!        | coeff_count: u8 | coeffs: [f64; coeff_count]
//! ```

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use binrw::{BinRead, BinWrite, binrw};
use log::debug;

use crate::adc_driver::AdcError;
use crate::adc_types::{Attenuation, BitWidth};
use crate::calibration::{CurveFitting, LineFitting};

pub const BLOB_VERSION: u8 = 1;

#[binrw]
#[brw(little, magic = b"ADCC")]
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBlob {
    #[br(assert(version == BLOB_VERSION, "unsupported calibration record version {}", version))]
    pub version: u8,
    pub unit: u8,
    #[br(temp)]
    #[bw(calc = entries.len() as u8)]
    entry_count: u8,
    #[br(count = entry_count)]
    pub entries: Vec<CalibrationEntry>,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEntry {
    pub atten: Attenuation,
    pub bitwidth: u8,
    /// Mean raw value at 0 V input.
    pub init_code: u16,
    /// Mean raw value at `ref_mv` input.
    pub ref_code: u16,
    pub ref_mv: u16,
    #[br(temp)]
    #[bw(calc = coeffs.len() as u8)]
    coeff_count: u8,
    #[br(count = coeff_count)]
    pub coeffs: Vec<f64>,
}

impl CalibrationBlob {
    /// A missing file means the device was never calibrated.
    pub fn load(path: &Path) -> Result<Self, AdcError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no calibration record at {}", path.display());
                return Err(AdcError::NotSupported);
            }
            Err(e) => {
                return Err(AdcError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdcError> {
        CalibrationBlob::read(&mut Cursor::new(bytes))
            .map_err(|e| AdcError::InvalidArg(format!("calibration record: {}", e)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AdcError> {
        let mut writer = Cursor::new(Vec::new());
        self.write(&mut writer)
            .map_err(|e| AdcError::InvalidArg(format!("calibration record: {}", e)))?;
        Ok(writer.into_inner())
    }

    pub fn entry(&self, atten: Attenuation, bitwidth: BitWidth) -> Option<&CalibrationEntry> {
        self.entries
            .iter()
            .find(|entry| entry.atten == atten && entry.bitwidth == bitwidth.bits())
    }
}

impl CalibrationEntry {
    fn bitwidth(&self) -> Result<BitWidth, AdcError> {
        BitWidth::new(self.bitwidth)
            .ok_or_else(|| AdcError::InvalidArg(format!("invalid bit width {}", self.bitwidth)))
    }

    pub fn line_fitting(&self) -> Result<LineFitting, AdcError> {
        LineFitting::from_reference_point(self.bitwidth()?, self.init_code, self.ref_code, self.ref_mv)
    }

    pub fn curve_fitting(&self) -> Result<CurveFitting, AdcError> {
        if self.coeffs.is_empty() {
            return Err(AdcError::NotSupported);
        }
        CurveFitting::from_coefficients(self.line_fitting()?, &self.coeffs)
    }
}
