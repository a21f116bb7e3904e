//! Shared handle to the CoreS3 internal I2C bus
//!
//! The AXP2101, the BM8563 and the SHT40 each hold an [`I2cClient`]. A client
//! locks the bus for one whole transaction and logs failed transfers under the
//! name of the chip it was talking to, which the drivers' own errors lack.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{Error as _, ErrorType, I2c, Operation};
use log::debug;

pub type BusLock<T> = Mutex<CriticalSectionRawMutex, T>;

pub struct I2cClient<'a, T> {
    bus: &'a BusLock<T>,
    chip: &'static str,
}

impl<'a, T> I2cClient<'a, T> {
    pub const fn new(bus: &'a BusLock<T>, chip: &'static str) -> Self {
        Self { bus, chip }
    }
}

impl<T: ErrorType> ErrorType for I2cClient<'_, T> {
    type Error = T::Error;
}

/// `read`, `write` and `write_read` use the trait's defaults, which all land
/// in `transaction`.
impl<T: I2c> I2c for I2cClient<'_, T> {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = self.bus.lock().await.transaction(address, operations).await;
        if let Err(e) = &result {
            debug!(
                "{} at {:#04x}: {}-step transfer failed ({:?})",
                self.chip,
                address,
                operations.len(),
                e.kind()
            );
        }
        result
    }
}
