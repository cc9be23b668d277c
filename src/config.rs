//! Daemon configuration, read from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::adc_types::{Attenuation, BitWidth, ChannelConfig, ChannelId, SchemeSupport, UnitId};
use crate::data_models::TemperatureUnit;
use crate::iio_adc::DEFAULT_IIO_ROOT;
use crate::sensor::{NUMBER_OF_SAMPLES, SensorConfig};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid {var} `{value}`: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub mqtt: MqttConfig,
    pub iio_root: PathBuf,
    pub calibration_file: Option<PathBuf>,
    pub sensor: SensorConfig,
    pub sample_interval: Duration,
    pub temperature_unit: TemperatureUnit,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mqtt = MqttConfig {
            host: lookup("MQTT_BROKER_HOST").ok_or(ConfigError::Missing("MQTT_BROKER_HOST"))?,
            port: parse(
                "MQTT_BROKER_PORT",
                lookup("MQTT_BROKER_PORT").ok_or(ConfigError::Missing("MQTT_BROKER_PORT"))?,
            )?,
            username: lookup("MQTT_USERNAME"),
            password: lookup("MQTT_PASSWORD"),
            client_id: lookup("MQTT_CLIENT_ID").unwrap_or_else(|| "ambient_temp_client".to_string()),
            topic_prefix: lookup("MQTT_TOPIC_PREFIX").unwrap_or_else(|| "ambient_temp".to_string()),
        };

        let bits: u8 = parse_or(&lookup, "ADC_BITWIDTH", BitWidth::DEFAULT.bits())?;
        let bitwidth = BitWidth::new(bits).ok_or_else(|| ConfigError::Invalid {
            var: "ADC_BITWIDTH",
            value: bits.to_string(),
            reason: "expected 9 to 13 bits".to_string(),
        })?;

        let samples: u16 = parse_or(&lookup, "ADC_SAMPLES", NUMBER_OF_SAMPLES)?;
        if samples == 0 {
            return Err(ConfigError::Invalid {
                var: "ADC_SAMPLES",
                value: samples.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let sensor = SensorConfig {
            unit: UnitId(parse_or(&lookup, "ADC_UNIT", 0)?),
            channel: ChannelId(parse_or(&lookup, "ADC_CHANNEL", 7)?),
            channel_config: ChannelConfig {
                bitwidth,
                atten: parse_or(&lookup, "ADC_ATTEN", Attenuation::Db11)?,
            },
            calibration_atten: parse_or(&lookup, "ADC_CALI_ATTEN", Attenuation::Db6)?,
            calibration_schemes: parse_or(&lookup, "ADC_CALI_SCHEMES", SchemeSupport::all())?,
            samples,
        };

        let interval_secs: u64 = parse_or(&lookup, "SAMPLE_INTERVAL_SECS", 10)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SAMPLE_INTERVAL_SECS",
                value: interval_secs.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            mqtt,
            iio_root: lookup("IIO_DEVICES_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IIO_ROOT)),
            calibration_file: lookup("ADC_CALIBRATION_FILE").map(PathBuf::from),
            sensor,
            sample_interval: Duration::from_secs(interval_secs),
            temperature_unit: parse_or(&lookup, "TEMPERATURE_UNIT", TemperatureUnit::Celsius)?,
        })
    }
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.clone(),
        reason: e.to_string(),
    })
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => parse(var, value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const BROKER: [(&str, &str); 2] = [("MQTT_BROKER_HOST", "localhost"), ("MQTT_BROKER_PORT", "1883")];

    #[test]
    fn defaults_when_only_broker_is_set() {
        let config = DaemonConfig::from_lookup(lookup_from(&BROKER)).unwrap();
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "ambient_temp_client");
        assert_eq!(config.mqtt.topic_prefix, "ambient_temp");
        assert_eq!(config.mqtt.username, None);
        assert_eq!(config.iio_root, PathBuf::from(DEFAULT_IIO_ROOT));
        assert_eq!(config.calibration_file, None);
        assert_eq!(config.sensor, SensorConfig::default());
        assert_eq!(config.sample_interval, Duration::from_secs(10));
        assert_eq!(config.temperature_unit, TemperatureUnit::Celsius);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = BROKER.to_vec();
        pairs.extend_from_slice(&[
            ("ADC_UNIT", "1"),
            ("ADC_CHANNEL", "3"),
            ("ADC_BITWIDTH", "10"),
            ("ADC_ATTEN", "2.5dB"),
            ("ADC_CALI_ATTEN", "11"),
            ("ADC_CALI_SCHEMES", "line"),
            ("ADC_SAMPLES", "16"),
            ("ADC_CALIBRATION_FILE", "/var/lib/adc_cal.bin"),
            ("SAMPLE_INTERVAL_SECS", "60"),
            ("TEMPERATURE_UNIT", "fahrenheit"),
        ]);
        let config = DaemonConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.sensor.unit, UnitId(1));
        assert_eq!(config.sensor.channel, ChannelId(3));
        assert_eq!(config.sensor.channel_config.bitwidth.bits(), 10);
        assert_eq!(config.sensor.channel_config.atten, Attenuation::Db2_5);
        assert_eq!(config.sensor.calibration_atten, Attenuation::Db11);
        assert_eq!(config.sensor.calibration_schemes, SchemeSupport::LINE_FITTING);
        assert_eq!(config.sensor.samples, 16);
        assert_eq!(
            config.calibration_file,
            Some(PathBuf::from("/var/lib/adc_cal.bin"))
        );
        assert_eq!(config.sample_interval, Duration::from_secs(60));
        assert_eq!(config.temperature_unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn broker_is_required() {
        assert_eq!(
            DaemonConfig::from_lookup(lookup_from(&[])),
            Err(ConfigError::Missing("MQTT_BROKER_HOST"))
        );
        assert_eq!(
            DaemonConfig::from_lookup(lookup_from(&[("MQTT_BROKER_HOST", "localhost")])),
            Err(ConfigError::Missing("MQTT_BROKER_PORT"))
        );
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let mut pairs = BROKER.to_vec();
        pairs.push(("ADC_BITWIDTH", "16"));
        assert!(matches!(
            DaemonConfig::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: "ADC_BITWIDTH", .. })
        ));

        let mut pairs = BROKER.to_vec();
        pairs.push(("ADC_SAMPLES", "0"));
        assert!(matches!(
            DaemonConfig::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: "ADC_SAMPLES", .. })
        ));

        let mut pairs = BROKER.to_vec();
        pairs.push(("ADC_ATTEN", "3"));
        assert!(matches!(
            DaemonConfig::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: "ADC_ATTEN", .. })
        ));

        let pairs = [("MQTT_BROKER_HOST", "localhost"), ("MQTT_BROKER_PORT", "port")];
        assert!(matches!(
            DaemonConfig::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: "MQTT_BROKER_PORT", .. })
        ));
    }
}
