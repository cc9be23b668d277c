use std::fmt;
use std::str::FromStr;

use binrw::{BinRead, BinWrite};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// ADC unit index. The IIO backend maps unit `n` to `iio:device<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u8);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ADC{}", self.0)
    }
}

/// ADC channel index within a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversion resolution in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitWidth(u8);

impl BitWidth {
    pub const MIN: BitWidth = BitWidth(9);
    pub const MAX: BitWidth = BitWidth(12);
    pub const DEFAULT: BitWidth = BitWidth::MAX;

    /// Widths above `MAX` are accepted here and rejected by the driver,
    /// the same way the hardware layer reports an unsupported width.
    pub const fn new(bits: u8) -> Option<Self> {
        if bits >= Self::MIN.0 && bits <= 13 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// `2^bits`, the divisor of the fallback conversion formula.
    pub const fn full_scale(&self) -> u32 {
        1u32 << self.0
    }

    pub const fn max_code(&self) -> u16 {
        (self.full_scale() - 1) as u16
    }
}

impl Default for BitWidth {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Input attenuation applied before sampling.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BinRead, BinWrite)]
#[brw(repr = u8)]
pub enum Attenuation {
    Db0 = 0,
    Db2_5 = 1,
    Db6 = 2,
    Db11 = 3,
}

impl Attenuation {
    /// Nominal full-scale input voltage in mV.
    pub const fn ref_mv(&self) -> u16 {
        match self {
            Attenuation::Db0 => 950,
            Attenuation::Db2_5 => 1250,
            Attenuation::Db6 => 1750,
            Attenuation::Db11 => 2450,
        }
    }
}

impl fmt::Display for Attenuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Attenuation::Db0 => "0dB",
            Attenuation::Db2_5 => "2.5dB",
            Attenuation::Db6 => "6dB",
            Attenuation::Db11 => "11dB",
        };
        f.write_str(s)
    }
}

impl FromStr for Attenuation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = trimmed
            .strip_suffix("dB")
            .or_else(|| trimmed.strip_suffix("db"))
            .unwrap_or(trimmed)
            .trim();
        match value {
            "0" => Ok(Attenuation::Db0),
            "2.5" => Ok(Attenuation::Db2_5),
            "6" => Ok(Attenuation::Db6),
            "11" => Ok(Attenuation::Db11),
            _ => Err(format!("unknown attenuation `{}`", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub bitwidth: BitWidth,
    pub atten: Attenuation,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bitwidth: BitWidth::MAX,
            atten: Attenuation::Db11,
        }
    }
}

/// Everything a driver needs to build a calibration transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationConfig {
    pub unit: UnitId,
    pub channel: ChannelId,
    pub atten: Attenuation,
    pub bitwidth: BitWidth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationScheme {
    CurveFitting,
    LineFitting,
}

impl CalibrationScheme {
    /// Order in which the probe tries the schemes.
    pub const PREFERENCE: [CalibrationScheme; 2] =
        [CalibrationScheme::CurveFitting, CalibrationScheme::LineFitting];

    pub const fn flag(&self) -> SchemeSupport {
        match self {
            CalibrationScheme::CurveFitting => SchemeSupport::CURVE_FITTING,
            CalibrationScheme::LineFitting => SchemeSupport::LINE_FITTING,
        }
    }

    /// Identifier used on the wire (MQTT topics, JSON).
    pub const fn as_str(&self) -> &'static str {
        match self {
            CalibrationScheme::CurveFitting => "curve_fitting",
            CalibrationScheme::LineFitting => "line_fitting",
        }
    }
}

impl fmt::Display for CalibrationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationScheme::CurveFitting => f.write_str("Curve Fitting"),
            CalibrationScheme::LineFitting => f.write_str("Line Fitting"),
        }
    }
}

bitflags! {
    /// Calibration schemes the probe is allowed to try.
    pub struct SchemeSupport: u8 {
        const CURVE_FITTING = 0b0000_0001;
        const LINE_FITTING = 0b0000_0010;
    }
}

impl Default for SchemeSupport {
    fn default() -> Self {
        SchemeSupport::all()
    }
}

impl FromStr for SchemeSupport {
    type Err = String;

    /// Accepts `all`, `none` or a comma separated list of `curve` / `line`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => return Ok(SchemeSupport::all()),
            "none" | "" => return Ok(SchemeSupport::empty()),
            _ => {}
        }

        let mut schemes = SchemeSupport::empty();
        for item in s.split(',') {
            match item.trim() {
                "curve" | "curve_fitting" => schemes |= SchemeSupport::CURVE_FITTING,
                "line" | "line_fitting" => schemes |= SchemeSupport::LINE_FITTING,
                other => return Err(format!("unknown calibration scheme `{}`", other)),
            }
        }
        Ok(schemes)
    }
}
