use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uom::si::electric_potential::millivolt;
use uom::si::f32::{ElectricPotential, ThermodynamicTemperature};
use uom::si::thermodynamic_temperature::{degree_celsius, degree_fahrenheit, kelvin};

use crate::adc_types::CalibrationScheme;

/// One averaged temperature reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureMeasurement {
    pub temperature_c: f32,
    /// Mean of the per-sample voltages.
    pub voltage_mv: f32,
    pub samples: u16,
    /// `None` when the uncalibrated formula was used.
    pub calibration: Option<CalibrationScheme>,
}

impl TemperatureMeasurement {
    pub fn temperature(&self) -> ThermodynamicTemperature {
        ThermodynamicTemperature::new::<degree_celsius>(self.temperature_c)
    }

    pub fn voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<millivolt>(self.voltage_mv)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }
}

/// Unit used when publishing temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub fn convert(&self, temperature: ThermodynamicTemperature) -> f32 {
        match self {
            TemperatureUnit::Celsius => temperature.get::<degree_celsius>(),
            TemperatureUnit::Fahrenheit => temperature.get::<degree_fahrenheit>(),
            TemperatureUnit::Kelvin => temperature.get::<kelvin>(),
        }
    }

    pub const fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Kelvin => "K",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            "k" | "kelvin" => Ok(TemperatureUnit::Kelvin),
            other => Err(format!("unknown temperature unit `{}`", other)),
        }
    }
}
