use std::time::Duration;

use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, MqttOptions, QoS, Transport};

use crate::config::MqttConfig;
use crate::data_models::{TemperatureMeasurement, TemperatureUnit};

// MQTT connection; the event loop is driven by a background task
pub async fn connect_mqtt(config: &MqttConfig) -> Result<AsyncClient, Box<dyn std::error::Error>> {
    let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
    mqtt_options.set_keep_alive(Duration::from_secs(5));
    if let Some(u) = &config.username {
        mqtt_options.set_credentials(u, config.password.clone().unwrap_or_default());
    }
    mqtt_options.set_transport(Transport::Tcp);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    info!("MQTT connected");
                }
                Ok(Event::Outgoing(rumqttc::Outgoing::PingReq)) => {
                    debug!("MQTT PingReq");
                }
                Ok(event) => {
                    debug!("MQTT Event: {:?}", event);
                }
                Err(e) => {
                    error!("MQTT EventLoop error: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });

    Ok(client)
}

/// Topic/payload pairs published for one measurement.
pub fn measurement_topics(
    topic_prefix: &str,
    measurement: &TemperatureMeasurement,
    unit: TemperatureUnit,
) -> Result<Vec<(String, String)>, serde_json::Error> {
    let scheme = measurement
        .calibration
        .map(|scheme| scheme.as_str())
        .unwrap_or("none");

    Ok(vec![
        (
            format!("{}/temperature", topic_prefix),
            format!("{:.2}", unit.convert(measurement.temperature())),
        ),
        (
            format!("{}/voltage_mv", topic_prefix),
            format!("{:.1}", measurement.voltage_mv),
        ),
        (
            format!("{}/calibrated", topic_prefix),
            measurement.is_calibrated().to_string(),
        ),
        (
            format!("{}/calibration_scheme", topic_prefix),
            scheme.to_string(),
        ),
        (
            format!("{}/measurement", topic_prefix),
            serde_json::to_string(measurement)?,
        ),
    ])
}

pub async fn publish_measurement(
    client: &AsyncClient,
    topic_prefix: &str,
    measurement: &TemperatureMeasurement,
    unit: TemperatureUnit,
) -> Result<(), Box<dyn std::error::Error>> {
    for (topic, payload) in measurement_topics(topic_prefix, measurement, unit)? {
        client.publish(topic, QoS::AtLeastOnce, false, payload).await?;
    }

    debug!(
        "published {:.2} {} to topic prefix '{}'",
        unit.convert(measurement.temperature()),
        unit,
        topic_prefix
    );

    Ok(())
}
