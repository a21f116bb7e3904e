use embedded_hal_async::i2c::I2c;
use log::{debug, error};
use sht4x::Sht4xAsync;
use torpor_core::error::SensorError;
use torpor_core::hal::{EnvironmentSensor, Reading};

/// Sensirion SHT40 on the shared I2C bus.
pub struct Sht40<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

impl<I: I2c> Sht40<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }
}

impl<I: I2c> EnvironmentSensor for Sht40<I> {
    /// Probe the sensor by reading its serial number
    async fn init(&mut self) -> Result<(), SensorError> {
        match self.sensor.serial_number(&mut embassy_time::Delay).await {
            Ok(serial) => {
                debug!("SHT40 serial {:#010x}", serial);
                Ok(())
            }
            Err(e) => {
                error!("SHT40 probe failed: {:?}", e);
                Err(SensorError::NotPresent { sensor: "SHT40" })
            }
        }
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        Ok(Reading::new(
            measurement.temperature_celsius().to_num::<f32>(),
            measurement.humidity_percent().to_num::<f32>(),
        ))
    }
}
