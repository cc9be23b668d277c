use std::time::Duration;

use dotenv::dotenv;
use env_logger::{Builder, Target};
use log::{error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ambient_temp_daemon::config::DaemonConfig;
use ambient_temp_daemon::iio_adc::IioAdc;
use ambient_temp_daemon::mqtt_handlers::{connect_mqtt, publish_measurement};
use ambient_temp_daemon::sensor_handlers::{
    RETRY_DELAY, SensorEvent, error_chain, sensor_manager_task,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();
    info!("ambient temperature daemon starting...");
    dotenv().ok(); // load .env

    let config = DaemonConfig::from_env()?;
    info!("MQTT broker: {}:{}", config.mqtt.host, config.mqtt.port);
    info!(
        "sensor: {} channel {} at {}, every {:?}",
        config.sensor.unit,
        config.sensor.channel,
        config.iio_root.display(),
        config.sample_interval
    );

    let mqtt_client = loop {
        match connect_mqtt(&config.mqtt).await {
            Ok(client) => break client,
            Err(e) => {
                error!("MQTT connection failed: {:?}, retrying in 10s...", e);
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel::<SensorEvent>(32);
    let shutdown = CancellationToken::new();

    let driver = IioAdc::new(&config.iio_root, config.calibration_file.clone());
    let sensor_task = tokio::spawn(sensor_manager_task(
        driver,
        config.sensor,
        config.sample_interval,
        RETRY_DELAY,
        event_tx,
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
                shutdown.cancel();
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Some(SensorEvent::Measurement(measurement)) => {
                        info!(
                            "temperature {:.2} °C ({:.1} mV)",
                            measurement.temperature_c, measurement.voltage_mv
                        );
                        if let Err(e) = publish_measurement(
                            &mqtt_client,
                            &config.mqtt.topic_prefix,
                            &measurement,
                            config.temperature_unit,
                        )
                        .await
                        {
                            error!("MQTT publish failed: {:?}", e);
                        }
                    }
                    Some(SensorEvent::Error(e)) => {
                        error!("sensor error: {}", error_chain(&e));
                    }
                    None => {
                        error!("sensor task stopped, exiting.");
                        break;
                    }
                }
            }
        }
    }

    // unblocks a sensor task waiting on a full channel
    drop(event_rx);
    if let Err(e) = sensor_task.await {
        error!("sensor task failed: {}", e);
    }
    if let Err(e) = mqtt_client.disconnect().await {
        error!("MQTT disconnect failed: {:?}", e);
    }
    info!("exited.");

    Ok(())
}
