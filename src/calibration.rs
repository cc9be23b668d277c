//! Calibration transforms mapping raw ADC codes to millivolts, and the probe
//! that picks one at start-up.

use log::{error, info, warn};

use crate::adc_driver::{AdcDriver, AdcError};
use crate::adc_types::{BitWidth, CalibrationConfig, CalibrationScheme, SchemeSupport};

/// Gain is a 16.16 fixed-point number.
const GAIN_SCALE: u64 = 1 << 16;

/// Curve coefficients are fixed-point numbers with 52 fractional bits.
const COEFF_MUL: i128 = 1 << 52;

/// Longest error polynomial accepted, as in the vendor tables.
pub const MAX_CURVE_COEFFS: usize = 8;

/// Line fitting calibration scheme
///
/// Bias correction followed by a gain. The bias (`init_code`) is the mean raw
/// value read with the input at 0 V; the gain comes from a reference point, a
/// pair of a known input voltage and the mean raw value it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFitting {
    init_code: i32,
    gain: u32,
    max_code: u16,
}

impl LineFitting {
    pub fn from_reference_point(
        bitwidth: BitWidth,
        init_code: u16,
        ref_code: u16,
        ref_mv: u16,
    ) -> Result<Self, AdcError> {
        if ref_code <= init_code {
            return Err(AdcError::InvalidArg(format!(
                "reference code {} is not above init code {}",
                ref_code, init_code
            )));
        }
        let span = (ref_code - init_code) as u64;

        // Rounding formula: R = (OP(A * 2) + 1) / 2
        let gain = (ref_mv as u64 * GAIN_SCALE * 2 / span + 1) / 2;
        let gain = u32::try_from(gain)
            .map_err(|_| AdcError::InvalidArg(format!("gain {} out of range", gain)))?;

        Ok(Self {
            init_code: init_code as i32,
            gain,
            max_code: bitwidth.max_code(),
        })
    }

    /// Builds the transform from an IIO style `scale` (mV per LSB) and
    /// `offset` (codes added to the raw value before scaling).
    pub fn from_scale(bitwidth: BitWidth, scale_mv: f64, offset: i32) -> Result<Self, AdcError> {
        if !scale_mv.is_finite() || scale_mv <= 0.0 {
            return Err(AdcError::InvalidArg(format!("invalid scale {}", scale_mv)));
        }
        let gain = (scale_mv * GAIN_SCALE as f64).round();
        if gain < 1.0 || gain > u32::MAX as f64 {
            return Err(AdcError::InvalidArg(format!("scale {} out of range", scale_mv)));
        }

        let init_code = offset
            .checked_neg()
            .ok_or_else(|| AdcError::InvalidArg(format!("offset {} out of range", offset)))?;

        Ok(Self {
            init_code,
            gain: gain as u32,
            max_code: bitwidth.max_code(),
        })
    }

    pub fn raw_to_voltage(&self, raw: u16) -> Result<u32, AdcError> {
        if raw > self.max_code {
            return Err(AdcError::InvalidArg(format!(
                "raw code {} above maximum {}",
                raw, self.max_code
            )));
        }
        let val = (raw as i64 - self.init_code as i64).max(0) as u64;
        let mv = val * self.gain as u64 / GAIN_SCALE;
        u32::try_from(mv).map_err(|_| {
            AdcError::InvalidArg(format!("raw code {} converts to {} mV", raw, mv))
        })
    }
}

/// Curve fitting calibration scheme
///
/// Applies [`LineFitting`] first, then subtracts the error estimated by a
/// polynomial of the line-fitted voltage:
/// `coeff[0] + coeff[1] * v + ... + coeff[n] * v^n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveFitting {
    line: LineFitting,
    coeff: Vec<i64>,
}

impl CurveFitting {
    pub fn from_coefficients(line: LineFitting, coeffs: &[f64]) -> Result<Self, AdcError> {
        if coeffs.is_empty() {
            return Err(AdcError::InvalidArg("no curve coefficients".into()));
        }
        if coeffs.len() > MAX_CURVE_COEFFS {
            return Err(AdcError::InvalidArg(format!(
                "{} curve coefficients, at most {} supported",
                coeffs.len(),
                MAX_CURVE_COEFFS
            )));
        }
        if let Some(c) = coeffs.iter().find(|c| !c.is_finite()) {
            return Err(AdcError::InvalidArg(format!("invalid curve coefficient {}", c)));
        }

        let coeff = coeffs
            .iter()
            .map(|c| (c * COEFF_MUL as f64) as i64)
            .collect();

        Ok(Self { line, coeff })
    }

    pub fn raw_to_voltage(&self, raw: u16) -> Result<u32, AdcError> {
        let val = self.line.raw_to_voltage(raw)?;

        let mv = if val == 0 {
            Some(0)
        } else {
            self.error_at(val)
                .and_then(|err| (val as i128).checked_sub(err))
        }
        .ok_or_else(|| AdcError::InvalidArg(format!("curve error for {} mV overflows", val)))?
        .max(0);

        u32::try_from(mv).map_err(|_| {
            AdcError::InvalidArg(format!("raw code {} converts to {} mV", raw, mv))
        })
    }

    /// `None` on fixed-point overflow.
    fn error_at(&self, val: u32) -> Option<i128> {
        let mut var = 1i128;
        let mut err = self.coeff[0] as i128 / COEFF_MUL;

        for coeff in &self.coeff[1..] {
            var = var.checked_mul(val as i128)?;
            err = err.checked_add(var.checked_mul(*coeff as i128)? / COEFF_MUL)?;
        }

        Some(err)
    }
}

/// A calibration transform established at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Calibration {
    CurveFitting(CurveFitting),
    LineFitting(LineFitting),
}

impl Calibration {
    pub fn scheme(&self) -> CalibrationScheme {
        match self {
            Calibration::CurveFitting(_) => CalibrationScheme::CurveFitting,
            Calibration::LineFitting(_) => CalibrationScheme::LineFitting,
        }
    }

    pub fn raw_to_voltage(&self, raw: u16) -> Result<u32, AdcError> {
        match self {
            Calibration::CurveFitting(curve) => curve.raw_to_voltage(raw),
            Calibration::LineFitting(line) => line.raw_to_voltage(raw),
        }
    }
}

/// Tries every enabled scheme in [`CalibrationScheme::PREFERENCE`] order and
/// returns the first one the driver can build.
///
/// A missing calibration is not an error: the caller falls back to the
/// uncalibrated conversion.
pub fn init_calibration<D: AdcDriver>(
    driver: &mut D,
    config: &CalibrationConfig,
    enabled: SchemeSupport,
) -> Option<Calibration> {
    let mut last_error = None;

    for scheme in CalibrationScheme::PREFERENCE
        .iter()
        .filter(|scheme| enabled.contains(scheme.flag()))
    {
        info!("calibration scheme version is {}", scheme);
        match driver.create_calibration(*scheme, config) {
            Ok(calibration) => {
                info!("Calibration Success");
                return Some(calibration);
            }
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        None | Some(AdcError::NotSupported) => {
            warn!("calibration data not available, skip software calibration")
        }
        Some(e) => error!("calibration failed: {}", e),
    }

    None
}
