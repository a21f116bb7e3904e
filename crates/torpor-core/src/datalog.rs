//! CSV layout of the sample log
//!
//! Every store writes the same file: one header line, then one row per
//! persisted sample with humidity before temperature.

use core::fmt::Write;

use crate::error::StoreError;
use crate::hal::Reading;

pub const CSV_HEADER: &str = "Timestamp,Humidity (%),Temperature (C)\n";

/// One formatted row, newline included.
///
/// Sized for a 24-byte timestamp and two `f32::MAX` values at two decimals.
pub type CsvRow = heapless::String<128>;

/// A row that does not fit is refused whole, never written without its newline.
pub fn format_row(timestamp: &str, reading: &Reading) -> Result<CsvRow, StoreError> {
    let mut row = CsvRow::new();
    write!(
        row,
        "{},{:.2},{:.2}\n",
        timestamp, reading.humidity_pct, reading.temperature_c
    )
    .map_err(|_| StoreError::RowTooLong)?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_puts_humidity_before_temperature() {
        let row = format_row("2025-06-01 12:00:00", &Reading::new(21.5, 45.25)).unwrap();
        assert_eq!(row.as_str(), "2025-06-01 12:00:00,45.25,21.50\n");
    }

    #[test]
    fn unset_time_is_written_verbatim() {
        let row = format_row(crate::time::TIME_NOT_SET, &Reading::new(-4.126, 99.0)).unwrap();
        assert_eq!(row.as_str(), "Time Not Set,99.00,-4.13\n");
    }

    #[test]
    fn extreme_finite_readings_keep_their_newline() {
        let row = format_row("2025-06-01 12:00:00", &Reading::new(f32::MAX, -f32::MAX)).unwrap();
        assert!(row.ends_with('\n'));
        assert_eq!(row.matches(',').count(), 2);
    }

    #[test]
    fn oversized_row_is_refused() {
        let timestamp = "x".repeat(120);
        assert_eq!(
            format_row(&timestamp, &Reading::new(21.5, 45.0)),
            Err(StoreError::RowTooLong)
        );
    }
}
