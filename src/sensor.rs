//! Averaging analog temperature sensor.
//!
//! The sensor owns one configured ADC channel and, if the driver could build
//! one, a calibration transform. Whether readings go through the calibration
//! or through the fixed fallback formula is decided once in
//! [`AnalogTemperatureSensor::init`] and never changes afterwards.
//!
//! Reads block until every sample is converted. They take `&mut self`, so a
//! sensor shared between threads has to be serialised by its owner.

use log::{debug, info};

use crate::adc_driver::{AdcDriver, AdcError, AdcUnit};
use crate::adc_types::{
    Attenuation, CalibrationConfig, CalibrationScheme, ChannelConfig, ChannelId, SchemeSupport,
    UnitId,
};
use crate::calibration::{Calibration, init_calibration};
use crate::data_models::TemperatureMeasurement;
use crate::utils::{FALLBACK_REFERENCE_MV, millivolts_to_celsius, uncalibrated_millivolts};

pub const NUMBER_OF_SAMPLES: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorConfig {
    pub unit: UnitId,
    pub channel: ChannelId,
    pub channel_config: ChannelConfig,
    /// Attenuation the calibration data is looked up for.
    pub calibration_atten: Attenuation,
    pub calibration_schemes: SchemeSupport,
    pub samples: u16,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            unit: UnitId(0),
            channel: ChannelId(7),
            channel_config: ChannelConfig::default(),
            calibration_atten: Attenuation::Db6,
            calibration_schemes: SchemeSupport::all(),
            samples: NUMBER_OF_SAMPLES,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("invalid sensor configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to create {unit}")]
    UnitInit {
        unit: UnitId,
        #[source]
        source: AdcError,
    },
    #[error("failed to configure {unit} channel {channel}")]
    ChannelConfig {
        unit: UnitId,
        channel: ChannelId,
        #[source]
        source: AdcError,
    },
    #[error("failed to sample {unit} channel {channel}")]
    Sample {
        unit: UnitId,
        channel: ChannelId,
        #[source]
        source: AdcError,
    },
    #[error("failed to convert raw code {raw} to voltage")]
    Conversion {
        raw: u16,
        #[source]
        source: AdcError,
    },
}

pub struct AnalogTemperatureSensor<U> {
    unit: U,
    config: SensorConfig,
    calibration: Option<Calibration>,
}

impl<U: AdcUnit> AnalogTemperatureSensor<U> {
    /// Creates the ADC unit, configures the channel and probes for a
    /// calibration scheme. Only unit and channel failures are fatal.
    pub fn init<D>(driver: &mut D, config: SensorConfig) -> Result<Self, SensorError>
    where
        D: AdcDriver<Unit = U>,
    {
        if config.samples == 0 {
            return Err(SensorError::InvalidConfig(
                "sample count must be at least 1".into(),
            ));
        }

        let mut unit = driver
            .new_unit(config.unit)
            .map_err(|source| SensorError::UnitInit {
                unit: config.unit,
                source,
            })?;
        unit.config_channel(config.channel, &config.channel_config)
            .map_err(|source| SensorError::ChannelConfig {
                unit: config.unit,
                channel: config.channel,
                source,
            })?;

        let cali_config = CalibrationConfig {
            unit: config.unit,
            channel: config.channel,
            atten: config.calibration_atten,
            bitwidth: config.channel_config.bitwidth,
        };
        let calibration = init_calibration(driver, &cali_config, config.calibration_schemes);

        match &calibration {
            Some(calibration) => info!(
                "{} channel {} ready, {} calibration",
                config.unit,
                config.channel,
                calibration.scheme()
            ),
            None => info!(
                "{} channel {} ready, uncalibrated (raw * {} / 2^{})",
                config.unit,
                config.channel,
                FALLBACK_REFERENCE_MV,
                config.channel_config.bitwidth.bits()
            ),
        }

        Ok(Self {
            unit,
            config,
            calibration,
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn calibration_scheme(&self) -> Option<CalibrationScheme> {
        self.calibration.as_ref().map(Calibration::scheme)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Temperature in °C averaged over the configured number of samples.
    pub fn read(&mut self) -> Result<f32, SensorError> {
        self.measure().map(|measurement| measurement.temperature_c)
    }

    pub fn measure(&mut self) -> Result<TemperatureMeasurement, SensorError> {
        let samples = self.config.samples;

        let mut voltage_average = 0.0f32;
        for _ in 0..samples {
            voltage_average += self.sample_voltage()? as f32;
        }
        voltage_average /= samples as f32;

        Ok(TemperatureMeasurement {
            temperature_c: millivolts_to_celsius(voltage_average),
            voltage_mv: voltage_average,
            samples,
            calibration: self.calibration_scheme(),
        })
    }

    fn sample_voltage(&mut self) -> Result<u32, SensorError> {
        let SensorConfig { unit, channel, .. } = self.config;

        let raw = self
            .unit
            .read_raw(channel)
            .map_err(|source| SensorError::Sample {
                unit,
                channel,
                source,
            })?;

        let voltage = match &self.calibration {
            Some(calibration) => calibration
                .raw_to_voltage(raw)
                .map_err(|source| SensorError::Conversion { raw, source })?,
            None => uncalibrated_millivolts(raw, self.config.channel_config.bitwidth),
        };

        debug!(
            "{} channel {} raw: {}\tvoltage: {}mV",
            unit, channel, raw, voltage
        );
        Ok(voltage)
    }
}
