//! ESP32-S3 firmware-specific modules for torpor
//!
//! This crate contains the concrete collaborators the core lifecycle runs
//! against on an M5Stack CoreS3: ESP32 peripheral bring-up, the deep sleep
//! wake sources, the I2C and SPI devices, and the WiFi station used for
//! network time and the operator page.

#![no_std]

extern crate alloc;

pub mod board;
pub mod console;
pub mod display;
pub mod hardware;
pub mod network_time;
pub mod radio;
pub mod rtc;
pub mod sensor;
pub mod shared_i2c;
pub mod soc;
pub mod store;
pub mod web;

/// Moves a value into a function-local `StaticCell` and returns `&'static mut`.
#[macro_export]
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}
