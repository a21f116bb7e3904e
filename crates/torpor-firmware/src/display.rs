//! ILI9342 status screen
//!
//! Shows the last persisted reading whenever the device wakes for an
//! operator. The panel is put to sleep again when the interactive window
//! closes.

use core::fmt::Write;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_10X20};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use esp_hal::gpio::Output;
use log::warn;
use mipidsi::NoResetPin;
use mipidsi::interface::SpiInterface;
use mipidsi::models::ILI9342CRgb565;
use torpor_core::error::DisplayError;
use torpor_core::hal::{Reading, StatusDisplay};
use torpor_core::time::TIME_NOT_SET;

use crate::hardware::SharedSpi;

pub const DISPLAY_WIDTH: u16 = 320;
pub const DISPLAY_HEIGHT: u16 = 240;

pub type Lcd =
    mipidsi::Display<SpiInterface<'static, SharedSpi, Output<'static>>, ILI9342CRgb565, NoResetPin>;

pub struct StatusScreen {
    lcd: Option<Lcd>,
    asleep: bool,
}

impl StatusScreen {
    /// `None` when the panel failed to initialize; every draw then reports
    /// [`DisplayError::NotPresent`].
    pub fn new(lcd: Option<Lcd>) -> Self {
        Self { lcd, asleep: false }
    }
}

impl StatusDisplay for StatusScreen {
    async fn show_reading(&mut self, reading: &Reading, timestamp: &str) -> Result<(), DisplayError> {
        let lcd = self.lcd.as_mut().ok_or(DisplayError::NotPresent)?;
        if self.asleep {
            lcd.wake(&mut embassy_time::Delay)
                .map_err(|_| DisplayError::Draw)?;
            self.asleep = false;
        }
        draw_reading(lcd, reading, timestamp).map_err(|_| DisplayError::Draw)
    }

    async fn turn_off(&mut self) {
        let Some(lcd) = self.lcd.as_mut() else {
            return;
        };
        if self.asleep {
            return;
        }
        match lcd.sleep(&mut embassy_time::Delay) {
            Ok(()) => self.asleep = true,
            Err(_) => warn!("Display did not enter sleep"),
        }
    }
}

fn draw_reading<D>(target: &mut D, reading: &Reading, timestamp: &str) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(Rgb565::BLACK)?;

    let large = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
    let small = MonoTextStyle::new(&FONT_6X10, Rgb565::CSS_LIGHT_GRAY);

    let mut line: heapless::String<32> = heapless::String::new();
    let _ = write!(line, "{:.1} C", reading.temperature_c);
    Text::with_baseline(&line, Point::new(24, 48), large, Baseline::Top).draw(target)?;

    line.clear();
    let _ = write!(line, "{:.1} %RH", reading.humidity_pct);
    Text::with_baseline(&line, Point::new(24, 88), large, Baseline::Top).draw(target)?;

    let stamp = if timestamp.is_empty() { TIME_NOT_SET } else { timestamp };
    Text::with_baseline("Logged at", Point::new(24, 160), small, Baseline::Top).draw(target)?;
    Text::with_baseline(stamp, Point::new(24, 176), small, Baseline::Top).draw(target)?;
    Ok(())
}
