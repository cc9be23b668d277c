//! The ADC collaborator the sensor is built on.
//!
//! A backend provides four operations: create a unit, configure a channel on
//! it, take a raw one-shot sample and build a calibration transform. Nothing
//! else about the hardware leaks into [`crate::sensor`].

use std::io;
use std::path::PathBuf;

use crate::adc_types::{CalibrationConfig, CalibrationScheme, ChannelConfig, ChannelId, UnitId};
use crate::calibration::Calibration;

#[derive(Debug, thiserror::Error)]
pub enum AdcError {
    #[error("{0} not found")]
    UnitNotFound(UnitId),
    #[error("channel {channel} is not available on {unit}")]
    ChannelNotFound { unit: UnitId, channel: ChannelId },
    /// The requested calibration scheme has no data on this device.
    #[error("calibration scheme not supported")]
    NotSupported,
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("invalid sample data: {0}")]
    InvalidData(String),
    #[error("I/O error on `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An initialised ADC unit, able to configure and sample its channels.
pub trait AdcUnit {
    fn config_channel(&mut self, channel: ChannelId, config: &ChannelConfig)
        -> Result<(), AdcError>;

    /// Blocking one-shot conversion.
    fn read_raw(&mut self, channel: ChannelId) -> Result<u16, AdcError>;
}

pub trait AdcDriver {
    type Unit: AdcUnit;

    fn new_unit(&mut self, unit: UnitId) -> Result<Self::Unit, AdcError>;

    /// Returns [`AdcError::NotSupported`] when the scheme cannot be used on
    /// this unit/attenuation pair.
    fn create_calibration(
        &mut self,
        scheme: CalibrationScheme,
        config: &CalibrationConfig,
    ) -> Result<Calibration, AdcError>;
}
