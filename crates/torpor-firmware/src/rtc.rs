//! BM8563 real-time clock (PCF8563 compatible)
//!
//! Time registers start at 0x02 and are BCD. Bit 7 of the seconds register
//! (VL) is set by the chip whenever its supply dropped too low to keep
//! counting; writing the time clears it.

use embedded_hal_async::i2c::I2c;
use torpor_core::error::RtcError;
use torpor_core::hal::ExternalRtc;
use torpor_core::time::{DateTime, TimeCandidate};

const ADDRESS: u8 = 0x51;

const REG_CONTROL_1: u8 = 0x00;
const REG_SECONDS: u8 = 0x02;

const VOLTAGE_LOW: u8 = 0x80;
/// Set in the month register for years 19xx
const CENTURY: u8 = 0x80;

pub struct Bm8563<I> {
    i2c: I,
}

impl<I: I2c> Bm8563<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }
}

impl<I: I2c> ExternalRtc for Bm8563<I> {
    async fn is_present(&mut self) -> bool {
        let mut control = [0u8; 1];
        self.i2c
            .write_read(ADDRESS, &[REG_CONTROL_1], &mut control)
            .await
            .is_ok()
    }

    async fn read_time(&mut self) -> Result<TimeCandidate, RtcError> {
        let mut regs = [0u8; 7];
        self.i2c
            .write_read(ADDRESS, &[REG_SECONDS], &mut regs)
            .await
            .map_err(|_| RtcError::Bus {
                operation: "read time",
            })?;

        let [seconds, minutes, hours, days, _weekday, century_month, years] = regs;
        let century = if century_month & CENTURY != 0 { 1900 } else { 2000 };
        let value = DateTime::new(
            century + u16::from(from_bcd(years)),
            from_bcd(century_month & 0x1F),
            from_bcd(days & 0x3F),
            from_bcd(hours & 0x3F),
            from_bcd(minutes & 0x7F),
            from_bcd(seconds & 0x7F),
        )
        .map_err(|_| RtcError::Malformed)?;

        Ok(TimeCandidate::new(value, seconds & VOLTAGE_LOW == 0))
    }

    async fn write_time(&mut self, value: DateTime) -> Result<(), RtcError> {
        if !(2000..=2099).contains(&value.year()) {
            return Err(RtcError::Malformed);
        }

        let frame = [
            REG_SECONDS,
            to_bcd(value.second()),
            to_bcd(value.minute()),
            to_bcd(value.hour()),
            to_bcd(value.day()),
            value.weekday(),
            to_bcd(value.month()),
            to_bcd((value.year() - 2000) as u8),
        ];
        self.i2c
            .write(ADDRESS, &frame)
            .await
            .map_err(|_| RtcError::Bus {
                operation: "write time",
            })
    }
}

fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}
