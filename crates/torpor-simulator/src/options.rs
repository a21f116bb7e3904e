//! Environment-driven simulator settings
//!
//! | Variable            | Effect                                           |
//! |---------------------|--------------------------------------------------|
//! | `TORPOR_STATE_DIR`  | Where retained memory, hardware and log live     |
//! | `TORPOR_CYCLES`     | Wake cycles per invocation (default 5)           |
//! | `TORPOR_LOG`        | Log level for both supervisor and cycles         |
//! | `TORPOR_IDLE_MS`    | Interactive idle timeout (default 2000)          |
//! | `TORPOR_NO_RTC`     | External RTC is absent                           |
//! | `TORPOR_OFFLINE`    | Network time fetches fail                        |
//! | `TORPOR_SENSOR_FAIL`| Sensor does not respond                          |
//! | `TORPOR_SET_TIME`   | Operator enters this time (first cycle only)     |
//! | `TORPOR_COLD_BOOT`  | Pull the battery before the first cycle          |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;

pub const STATE_DIR: &str = "TORPOR_STATE_DIR";
pub const CYCLES: &str = "TORPOR_CYCLES";
pub const LOG: &str = "TORPOR_LOG";
pub const IDLE_MS: &str = "TORPOR_IDLE_MS";
pub const NO_RTC: &str = "TORPOR_NO_RTC";
pub const OFFLINE: &str = "TORPOR_OFFLINE";
pub const SENSOR_FAIL: &str = "TORPOR_SENSOR_FAIL";
pub const SET_TIME: &str = "TORPOR_SET_TIME";
pub const COLD_BOOT: &str = "TORPOR_COLD_BOOT";

/// Variables that only apply to the first cycle of an invocation
pub const ONE_SHOT: [&str; 2] = [SET_TIME, COLD_BOOT];

#[derive(Debug, Clone)]
pub struct Options {
    pub state_dir: PathBuf,
    pub cycles: u32,
    pub level: LevelFilter,
    pub idle_ms: u64,
    pub no_rtc: bool,
    pub offline: bool,
    pub sensor_fail: bool,
    pub set_time: Option<String>,
    pub cold_boot: bool,
}

impl Options {
    pub fn from_env() -> Self {
        Self {
            state_dir: env::var_os(STATE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("torpor-state")),
            cycles: parsed(CYCLES).unwrap_or(5),
            level: parsed(LOG).unwrap_or(LevelFilter::Info),
            idle_ms: parsed(IDLE_MS).unwrap_or(2000),
            no_rtc: flag(NO_RTC),
            offline: flag(OFFLINE),
            sensor_fail: flag(SENSOR_FAIL),
            set_time: env::var(SET_TIME).ok().filter(|v| !v.trim().is_empty()),
            cold_boot: flag(COLD_BOOT),
        }
    }
}

fn flag(name: &str) -> bool {
    env::var_os(name).is_some_and(|v| !v.is_empty() && v != "0")
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok()?.trim().parse().ok()
}
