//! Bus and power bring-up for the CoreS3
//!
//! Pin map:
//!
//! | Function            | Pins                                  |
//! |---------------------|---------------------------------------|
//! | Internal I2C (400k) | SDA GPIO12, SCL GPIO11                |
//! | SPI2 (LCD + SD)     | SCK GPIO36, MOSI GPIO37, MISO GPIO35  |
//! | LCD                 | CS GPIO3, DC GPIO34                   |
//! | SD card             | CS GPIO4                              |
//! | Wake button         | GPIO8 (Port B), active low            |

use core::cell::RefCell;

use axp2101_embedded::AsyncAxp2101;
use embedded_hal_bus::spi::{NoDelay, RefCellDevice};
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError as I2cConfigError, I2c};
use esp_hal::spi::master::{Config as SpiConfig, ConfigError as SpiConfigError, Spi};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use log::{info, warn};
use static_cell::StaticCell;

use crate::shared_i2c::{BusLock, I2cClient};

pub type I2cBus = I2c<'static, Async>;
pub type SharedI2c = I2cClient<'static, I2cBus>;
pub type SpiBus = Spi<'static, Blocking>;
pub type SharedSpi = RefCellDevice<'static, SpiBus, Output<'static>, NoDelay>;

pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> Result<I2cBus, I2cConfigError> {
    Ok(
        I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))?
            .with_sda(sda)
            .with_scl(scl)
            .into_async(),
    )
}

/// Park the bus in a static so every device can hold a `'static` handle
pub fn share_i2c_bus(bus: I2cBus) -> &'static BusLock<I2cBus> {
    static I2C0_BUS: StaticCell<BusLock<I2cBus>> = StaticCell::new();
    I2C0_BUS.init(BusLock::new(bus))
}

pub fn create_spi_bus(
    spi2: esp_hal::peripherals::SPI2<'static>,
    sck: esp_hal::peripherals::GPIO36<'static>,
    mosi: esp_hal::peripherals::GPIO37<'static>,
    miso: esp_hal::peripherals::GPIO35<'static>,
) -> Result<&'static RefCell<SpiBus>, SpiConfigError> {
    static SPI2_BUS: StaticCell<RefCell<SpiBus>> = StaticCell::new();

    let spi = Spi::new(spi2, SpiConfig::default())?
        .with_sck(sck)
        .with_mosi(mosi)
        .with_miso(miso);
    Ok(SPI2_BUS.init(RefCell::new(spi)))
}

/// One device on the shared SPI bus, selected by `cs`
pub fn spi_device(
    bus: &'static RefCell<SpiBus>,
    cs: impl esp_hal::gpio::OutputPin + 'static,
) -> SharedSpi {
    let cs = Output::new(cs, Level::High, OutputConfig::default());
    match RefCellDevice::new_no_delay(bus, cs) {
        Ok(device) => device,
        // Setting an esp-hal output high cannot fail
        Err(e) => match e {},
    }
}

macro_rules! rail {
    ($what:literal, $op:expr) => {
        if let Err(e) = $op.await {
            warn!("Power: {} failed: {:?}", $what, e);
        }
    };
}

/// Switch on the rails the LCD, SD card and sensors hang off.
///
/// Failures are logged and skipped; whatever is left unpowered shows up as a
/// missing device further on.
pub async fn init_power(i2c: SharedI2c) {
    info!("Configuring power management");
    let mut pmu = AsyncAxp2101::new(i2c);

    match pmu.init().await {
        Ok(_) => info!("Power management ready"),
        Err(e) => {
            warn!("Power init failed: {:?}", e);
            return;
        }
    }

    rail!("ALDO1 enable", pmu.enable_aldo1());
    rail!("ALDO2 enable", pmu.enable_aldo2());
    rail!("ALDO3 enable", pmu.enable_aldo3());
    rail!("ALDO4 enable", pmu.enable_aldo4());
    rail!("BLDO1 enable", pmu.enable_bldo1());
    rail!("BLDO2 enable", pmu.enable_bldo2());
    rail!("DLDO1 enable", pmu.enable_dldo1());
    // LCD and SD card run from ALDO4
    rail!("ALDO4 3.3 V", pmu.set_aldo4_voltage(3300));
}
