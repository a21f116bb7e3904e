//! Operator-entered time from the interactive window's set-time form
//!
//! The form submits `Y`, `M`, `D`, `h` and `m` (plus an optional `s`) as a
//! query string, e.g. `Y=2025&M=6&D=1&h=14&m=5`.

use super::{DateTime, InvalidDateTime};

/// Parse the set-time query string. Unknown keys are ignored.
pub fn parse_set_time_query(query: &str) -> Result<DateTime, InvalidDateTime> {
    let mut fields: [Option<u16>; 6] = [None; 6];

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let slot = match key {
            "Y" => 0,
            "M" => 1,
            "D" => 2,
            "h" => 3,
            "m" => 4,
            "s" => 5,
            _ => continue,
        };
        fields[slot] = Some(value.trim().parse().map_err(|_| InvalidDateTime)?);
    }

    let [Some(year), Some(month), Some(day), Some(hour), Some(minute), second] = fields else {
        return Err(InvalidDateTime);
    };

    DateTime::new(
        year,
        narrow(month)?,
        narrow(day)?,
        narrow(hour)?,
        narrow(minute)?,
        narrow(second.unwrap_or(0))?,
    )
}

fn narrow(value: u16) -> Result<u8, InvalidDateTime> {
    u8::try_from(value).map_err(|_| InvalidDateTime)
}
