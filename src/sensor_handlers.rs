use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::adc_driver::AdcDriver;
use crate::data_models::TemperatureMeasurement;
use crate::sensor::{AnalogTemperatureSensor, SensorConfig, SensorError};

#[derive(Debug)]
pub enum SensorEvent {
    Measurement(TemperatureMeasurement),
    Error(SensorError),
}

/// Delay before the sensor is initialised again after a failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

// Sensor manager task
//
// Owns the driver and the sensor. Every blocking driver call runs on the
// blocking pool; the sensor is moved in and handed back each time. A failed
// init or read is reported as an event and the sensor is rebuilt after
// `retry_delay`.
pub async fn sensor_manager_task<D>(
    mut driver: D,
    config: SensorConfig,
    interval: Duration,
    retry_delay: Duration,
    event_tx: mpsc::Sender<SensorEvent>,
    shutdown: CancellationToken,
) where
    D: AdcDriver + Send + 'static,
    D::Unit: Send + 'static,
{
    loop {
        let init = tokio::task::spawn_blocking(move || {
            let result = AnalogTemperatureSensor::init(&mut driver, config);
            (driver, result)
        })
        .await;

        let mut sensor = match init {
            Ok((d, Ok(sensor))) => {
                driver = d;
                sensor
            }
            Ok((d, Err(e))) => {
                driver = d;
                error!("sensor init failed: {}, retrying in {:?}...", error_chain(&e), retry_delay);
                if !report(&event_tx, SensorEvent::Error(e)).await {
                    return;
                }
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(retry_delay) => continue,
                }
            }
            Err(e) => {
                join_failed(e);
                return;
            }
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("sensor task shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let read = tokio::task::spawn_blocking(move || {
                let result = sensor.measure();
                (sensor, result)
            })
            .await;

            match read {
                Ok((s, Ok(measurement))) => {
                    sensor = s;
                    debug!(
                        "measured {:.2} °C ({:.1} mV over {} samples)",
                        measurement.temperature_c, measurement.voltage_mv, measurement.samples
                    );
                    if !report(&event_tx, SensorEvent::Measurement(measurement)).await {
                        return;
                    }
                }
                Ok((_, Err(e))) => {
                    error!("sensor read failed: {}, reinitialising...", error_chain(&e));
                    if !report(&event_tx, SensorEvent::Error(e)).await {
                        return;
                    }
                    break;
                }
                Err(e) => {
                    join_failed(e);
                    return;
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

/// Returns `false` once nobody listens any more.
async fn report(event_tx: &mpsc::Sender<SensorEvent>, event: SensorEvent) -> bool {
    if event_tx.send(event).await.is_err() {
        info!("event channel closed, sensor task exiting");
        return false;
    }
    true
}

fn join_failed(e: JoinError) {
    error!("blocking sensor call did not complete: {}", e);
}

/// `error: cause: cause` for log lines.
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
