//! Scriptable ADC driver for unit tests.

use crate::adc_driver::{AdcDriver, AdcError, AdcUnit};
use crate::adc_types::{CalibrationConfig, CalibrationScheme, ChannelConfig, ChannelId, UnitId};
use crate::calibration::Calibration;

#[derive(Debug, Clone)]
pub(crate) enum FakeCalibration {
    Supported(Calibration),
    NotSupported,
    Invalid,
}

/// Serves `codes` in a loop on every channel.
#[derive(Debug, Clone)]
pub(crate) struct FakeAdc {
    pub codes: Vec<u16>,
    pub fail_unit: bool,
    pub fail_channel: bool,
    /// Zero-based index of the read that fails, counted per unit.
    pub fail_read_at: Option<usize>,
    /// Makes every read panic, like a driver bug would.
    pub panic_on_read: bool,
    pub curve: FakeCalibration,
    pub line: FakeCalibration,
    pub attempts: Vec<CalibrationScheme>,
    pub units_created: usize,
}

impl FakeAdc {
    pub fn with_codes(codes: Vec<u16>) -> Self {
        Self {
            codes,
            fail_unit: false,
            fail_channel: false,
            fail_read_at: None,
            panic_on_read: false,
            curve: FakeCalibration::NotSupported,
            line: FakeCalibration::NotSupported,
            attempts: Vec::new(),
            units_created: 0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeUnit {
    id: UnitId,
    codes: Vec<u16>,
    reads: usize,
    fail_channel: bool,
    fail_read_at: Option<usize>,
    panic_on_read: bool,
    configured: Option<ChannelId>,
}

impl AdcDriver for FakeAdc {
    type Unit = FakeUnit;

    fn new_unit(&mut self, unit: UnitId) -> Result<FakeUnit, AdcError> {
        if self.fail_unit {
            return Err(AdcError::UnitNotFound(unit));
        }
        self.units_created += 1;
        Ok(FakeUnit {
            id: unit,
            codes: self.codes.clone(),
            reads: 0,
            fail_channel: self.fail_channel,
            fail_read_at: self.fail_read_at,
            panic_on_read: self.panic_on_read,
            configured: None,
        })
    }

    fn create_calibration(
        &mut self,
        scheme: CalibrationScheme,
        _config: &CalibrationConfig,
    ) -> Result<Calibration, AdcError> {
        self.attempts.push(scheme);
        let outcome = match scheme {
            CalibrationScheme::CurveFitting => &self.curve,
            CalibrationScheme::LineFitting => &self.line,
        };
        match outcome {
            FakeCalibration::Supported(calibration) => Ok(calibration.clone()),
            FakeCalibration::NotSupported => Err(AdcError::NotSupported),
            FakeCalibration::Invalid => Err(AdcError::InvalidArg("corrupt calibration".into())),
        }
    }
}

impl AdcUnit for FakeUnit {
    fn config_channel(&mut self, channel: ChannelId, _config: &ChannelConfig) -> Result<(), AdcError> {
        if self.fail_channel {
            return Err(AdcError::ChannelNotFound {
                unit: self.id,
                channel,
            });
        }
        self.configured = Some(channel);
        Ok(())
    }

    fn read_raw(&mut self, channel: ChannelId) -> Result<u16, AdcError> {
        if self.configured != Some(channel) {
            return Err(AdcError::InvalidArg(format!("channel {} not configured", channel)));
        }
        if self.panic_on_read {
            panic!("{} channel {} driver fault", self.id, channel);
        }
        let index = self.reads;
        self.reads += 1;
        if self.fail_read_at == Some(index) {
            return Err(AdcError::InvalidData("conversion timed out".into()));
        }
        Ok(self.codes[index % self.codes.len()])
    }
}
