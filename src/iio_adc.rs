//! Linux Industrial I/O (IIO) ADC backend.
//!
//! Units are `iio:device<n>` directories under the IIO root, channels are
//! their `in_voltage<k>_raw` attributes. Each read is a blocking sysfs read
//! which the kernel turns into a one-shot conversion.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::adc_driver::{AdcDriver, AdcError, AdcUnit};
use crate::adc_types::{
    BitWidth, CalibrationConfig, CalibrationScheme, ChannelConfig, ChannelId, UnitId,
};
use crate::calibration::{Calibration, LineFitting};
use crate::calibration_blob::CalibrationBlob;

pub const DEFAULT_IIO_ROOT: &str = "/sys/bus/iio/devices";

#[derive(Debug, Clone)]
pub struct IioAdc {
    root: PathBuf,
    calibration_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct IioUnit {
    id: UnitId,
    dir: PathBuf,
    channels: HashMap<ChannelId, ChannelConfig>,
}

impl IioAdc {
    pub fn new(root: impl Into<PathBuf>, calibration_file: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            calibration_file,
        }
    }

    fn unit_dir(&self, unit: UnitId) -> PathBuf {
        self.root.join(format!("iio:device{}", unit.0))
    }

    fn load_blob(&self, unit: UnitId) -> Result<CalibrationBlob, AdcError> {
        let path = self.calibration_file.as_ref().ok_or(AdcError::NotSupported)?;
        let blob = CalibrationBlob::load(path)?;
        if blob.unit != unit.0 {
            debug!(
                "calibration record is for ADC{}, not {}",
                blob.unit, unit
            );
            return Err(AdcError::NotSupported);
        }
        Ok(blob)
    }

    fn curve_fitting(&self, config: &CalibrationConfig) -> Result<Calibration, AdcError> {
        let blob = self.load_blob(config.unit)?;
        let entry = blob
            .entry(config.atten, config.bitwidth)
            .ok_or(AdcError::NotSupported)?;
        Ok(Calibration::CurveFitting(entry.curve_fitting()?))
    }

    fn line_fitting(&self, config: &CalibrationConfig) -> Result<Calibration, AdcError> {
        match self.load_blob(config.unit) {
            Ok(blob) => {
                if let Some(entry) = blob.entry(config.atten, config.bitwidth) {
                    return Ok(Calibration::LineFitting(entry.line_fitting()?));
                }
            }
            Err(AdcError::NotSupported) => {}
            Err(e) => return Err(e),
        }

        // Fall back to the scale/offset the kernel driver exports.
        let dir = self.unit_dir(config.unit);
        let channel = config.channel.0;
        let scale = read_first_attribute(&dir, &[
            format!("in_voltage{}_scale", channel),
            "in_voltage_scale".to_string(),
        ])?
        .ok_or(AdcError::NotSupported)?;
        let offset = read_first_attribute(&dir, &[
            format!("in_voltage{}_offset", channel),
            "in_voltage_offset".to_string(),
        ])?;

        let scale_mv: f64 = scale
            .parse()
            .map_err(|_| AdcError::InvalidArg(format!("invalid scale `{}`", scale)))?;
        let offset: i32 = match offset {
            Some(offset) => offset
                .parse()
                .map_err(|_| AdcError::InvalidArg(format!("invalid offset `{}`", offset)))?,
            None => 0,
        };

        Ok(Calibration::LineFitting(LineFitting::from_scale(
            config.bitwidth,
            scale_mv,
            offset,
        )?))
    }
}

impl Default for IioAdc {
    fn default() -> Self {
        Self::new(DEFAULT_IIO_ROOT, None)
    }
}

impl AdcDriver for IioAdc {
    type Unit = IioUnit;

    fn new_unit(&mut self, unit: UnitId) -> Result<IioUnit, AdcError> {
        let dir = self.unit_dir(unit);
        if !dir.is_dir() {
            return Err(AdcError::UnitNotFound(unit));
        }
        match read_attribute(&dir.join("name"))? {
            Some(name) => info!("opened {} ({}) at {}", unit, name, dir.display()),
            None => info!("opened {} at {}", unit, dir.display()),
        }
        Ok(IioUnit {
            id: unit,
            dir,
            channels: HashMap::new(),
        })
    }

    fn create_calibration(
        &mut self,
        scheme: CalibrationScheme,
        config: &CalibrationConfig,
    ) -> Result<Calibration, AdcError> {
        match scheme {
            CalibrationScheme::CurveFitting => self.curve_fitting(config),
            CalibrationScheme::LineFitting => self.line_fitting(config),
        }
    }
}

impl IioUnit {
    fn raw_path(&self, channel: ChannelId) -> PathBuf {
        self.dir.join(format!("in_voltage{}_raw", channel.0))
    }
}

impl AdcUnit for IioUnit {
    /// IIO drivers fix the input range in the kernel, so `atten` is only
    /// recorded here; the kernel `scale` already reflects the real range.
    fn config_channel(&mut self, channel: ChannelId, config: &ChannelConfig) -> Result<(), AdcError> {
        if config.bitwidth.bits() > BitWidth::MAX.bits() {
            return Err(AdcError::InvalidArg(format!(
                "bit width {} not supported",
                config.bitwidth.bits()
            )));
        }
        if !self.raw_path(channel).is_file() {
            return Err(AdcError::ChannelNotFound {
                unit: self.id,
                channel,
            });
        }
        debug!(
            "{} channel {} configured: {} bit, {}",
            self.id,
            channel,
            config.bitwidth.bits(),
            config.atten
        );
        self.channels.insert(channel, *config);
        Ok(())
    }

    fn read_raw(&mut self, channel: ChannelId) -> Result<u16, AdcError> {
        let config = self
            .channels
            .get(&channel)
            .ok_or_else(|| AdcError::InvalidArg(format!("channel {} not configured", channel)))?;

        let path = self.raw_path(channel);
        let text = fs::read_to_string(&path).map_err(|source| AdcError::Io {
            path: path.clone(),
            source,
        })?;
        let text = text.trim();

        let raw: i64 = text
            .parse()
            .map_err(|_| AdcError::InvalidData(format!("`{}` is not a number", text)))?;
        if raw < 0 || raw > config.bitwidth.max_code() as i64 {
            return Err(AdcError::InvalidData(format!(
                "raw value {} outside {} bit range",
                raw,
                config.bitwidth.bits()
            )));
        }
        Ok(raw as u16)
    }
}

/// `Ok(None)` when the attribute does not exist.
fn read_attribute(path: &Path) -> Result<Option<String>, AdcError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(AdcError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_first_attribute(dir: &Path, names: &[String]) -> Result<Option<String>, AdcError> {
    for name in names {
        if let Some(value) = read_attribute(&dir.join(name))? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc_types::Attenuation;
    use crate::calibration_blob::{BLOB_VERSION, CalibrationEntry};

    /// Throwaway sysfs-like tree, removed on drop.
    struct FakeSysfs {
        root: PathBuf,
    }

    impl FakeSysfs {
        fn new(name: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "ambient-temp-iio-{}-{}",
                name,
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(root.join("iio:device0")).unwrap();
            Self { root }
        }

        fn set(&self, attribute: &str, value: &str) {
            fs::write(self.root.join("iio:device0").join(attribute), value).unwrap();
        }
    }

    impl Drop for FakeSysfs {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn cali_config(atten: Attenuation) -> CalibrationConfig {
        CalibrationConfig {
            unit: UnitId(0),
            channel: ChannelId(7),
            atten,
            bitwidth: BitWidth::MAX,
        }
    }

    #[test]
    fn missing_unit_is_reported() {
        let sysfs = FakeSysfs::new("missing-unit");
        let mut adc = IioAdc::new(&sysfs.root, None);
        assert!(matches!(
            adc.new_unit(UnitId(3)),
            Err(AdcError::UnitNotFound(UnitId(3)))
        ));
    }

    #[test]
    fn reads_configured_channel() {
        let sysfs = FakeSysfs::new("read");
        sysfs.set("name", "test-adc");
        sysfs.set("in_voltage7_raw", "2048\n");

        let mut adc = IioAdc::new(&sysfs.root, None);
        let mut unit = adc.new_unit(UnitId(0)).unwrap();

        assert!(matches!(
            unit.read_raw(ChannelId(7)),
            Err(AdcError::InvalidArg(_))
        ));
        assert!(matches!(
            unit.config_channel(ChannelId(6), &ChannelConfig::default()),
            Err(AdcError::ChannelNotFound { .. })
        ));

        unit.config_channel(ChannelId(7), &ChannelConfig::default()).unwrap();
        assert_eq!(unit.read_raw(ChannelId(7)).unwrap(), 2048);
    }

    #[test]
    fn rejects_out_of_range_and_garbage_samples() {
        let sysfs = FakeSysfs::new("range");
        sysfs.set("in_voltage7_raw", "4096");

        let mut adc = IioAdc::new(&sysfs.root, None);
        let mut unit = adc.new_unit(UnitId(0)).unwrap();
        unit.config_channel(ChannelId(7), &ChannelConfig::default()).unwrap();
        assert!(matches!(
            unit.read_raw(ChannelId(7)),
            Err(AdcError::InvalidData(_))
        ));

        sysfs.set("in_voltage7_raw", "abc");
        assert!(matches!(
            unit.read_raw(ChannelId(7)),
            Err(AdcError::InvalidData(_))
        ));
    }

    #[test]
    fn rejects_unsupported_bitwidth() {
        let sysfs = FakeSysfs::new("bitwidth");
        sysfs.set("in_voltage7_raw", "0");

        let mut adc = IioAdc::new(&sysfs.root, None);
        let mut unit = adc.new_unit(UnitId(0)).unwrap();
        let config = ChannelConfig {
            bitwidth: BitWidth::new(13).unwrap(),
            atten: Attenuation::Db11,
        };
        assert!(matches!(
            unit.config_channel(ChannelId(7), &config),
            Err(AdcError::InvalidArg(_))
        ));
    }

    #[test]
    fn line_fitting_from_kernel_scale() {
        let sysfs = FakeSysfs::new("scale");
        sysfs.set("in_voltage7_scale", "0.5");
        sysfs.set("in_voltage_offset", "-100");

        let mut adc = IioAdc::new(&sysfs.root, None);
        let config = cali_config(Attenuation::Db6);

        assert!(matches!(
            adc.create_calibration(CalibrationScheme::CurveFitting, &config),
            Err(AdcError::NotSupported)
        ));
        let line = adc
            .create_calibration(CalibrationScheme::LineFitting, &config)
            .unwrap();
        assert_eq!(line.scheme(), CalibrationScheme::LineFitting);
        assert_eq!(line.raw_to_voltage(2100).unwrap(), 1000);
    }

    #[test]
    fn no_scale_means_no_line_fitting() {
        let sysfs = FakeSysfs::new("no-scale");
        let mut adc = IioAdc::new(&sysfs.root, None);
        assert!(matches!(
            adc.create_calibration(CalibrationScheme::LineFitting, &cali_config(Attenuation::Db6)),
            Err(AdcError::NotSupported)
        ));

        sysfs.set("in_voltage_scale", "fast");
        assert!(matches!(
            adc.create_calibration(CalibrationScheme::LineFitting, &cali_config(Attenuation::Db6)),
            Err(AdcError::InvalidArg(_))
        ));
    }

    #[test]
    fn calibration_record_provides_both_schemes() {
        let sysfs = FakeSysfs::new("record");
        let record = sysfs.root.join("adc_cal.bin");
        let blob = CalibrationBlob {
            version: BLOB_VERSION,
            unit: 0,
            entries: vec![CalibrationEntry {
                atten: Attenuation::Db6,
                bitwidth: 12,
                init_code: 0,
                ref_code: 2048,
                ref_mv: 1100,
                coeffs: vec![2.0],
            }],
        };
        fs::write(&record, blob.to_bytes().unwrap()).unwrap();

        let mut adc = IioAdc::new(&sysfs.root, Some(record));
        let config = cali_config(Attenuation::Db6);

        let curve = adc
            .create_calibration(CalibrationScheme::CurveFitting, &config)
            .unwrap();
        assert_eq!(curve.raw_to_voltage(2048).unwrap(), 1098);

        let line = adc
            .create_calibration(CalibrationScheme::LineFitting, &config)
            .unwrap();
        assert_eq!(line.raw_to_voltage(2048).unwrap(), 1100);

        // No entry for 11 dB and no kernel scale either.
        assert!(matches!(
            adc.create_calibration(CalibrationScheme::CurveFitting, &cali_config(Attenuation::Db11)),
            Err(AdcError::NotSupported)
        ));
    }

    #[test]
    fn corrupt_calibration_record_is_invalid() {
        let sysfs = FakeSysfs::new("corrupt");
        let record = sysfs.root.join("adc_cal.bin");
        fs::write(&record, b"garbage").unwrap();

        let mut adc = IioAdc::new(&sysfs.root, Some(record));
        assert!(matches!(
            adc.create_calibration(CalibrationScheme::CurveFitting, &cali_config(Attenuation::Db6)),
            Err(AdcError::InvalidArg(_))
        ));
    }
}
