//! Averaged analog temperature readings from a calibrated ADC channel.
//!
//! [`sensor::AnalogTemperatureSensor`] works against the [`adc_driver`]
//! traits; [`iio_adc`] implements them on top of Linux IIO. The remaining
//! modules make up the reporting daemon in `main.rs`.

pub mod adc_driver;
pub mod adc_types;
pub mod calibration;
pub mod calibration_blob;
pub mod config;
pub mod data_models;
pub mod iio_adc;
pub mod mqtt_handlers;
pub mod sensor;
pub mod sensor_handlers;
pub mod utils;

#[cfg(test)]
mod testing;
