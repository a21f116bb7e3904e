//! The M5Stack CoreS3 as a [`Board`]

use torpor_core::hal::Board;

use crate::display::StatusScreen;
use crate::hardware::{SharedI2c, SharedSpi};
use crate::network_time::SntpClient;
use crate::rtc::Bm8563;
use crate::sensor::Sht40;
use crate::soc::EspSoc;
use crate::store::{FixedTimestamps, SdCardStore};
use crate::web::WebConsole;

pub type SdStore = SdCardStore<SharedSpi, embassy_time::Delay, FixedTimestamps>;

pub struct CoreS3;

impl Board for CoreS3 {
    type Sensor = Sht40<SharedI2c>;
    type Store = SdStore;
    type Display = StatusScreen;
    type Interaction = WebConsole;
    type Rtc = Bm8563<SharedI2c>;
    type NetworkTime = SntpClient;
    type Soc = EspSoc;
}
