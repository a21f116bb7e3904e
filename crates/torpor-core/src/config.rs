//! Device configuration
//!
//! All timing constants that drive the wake/sleep cycle live here. The
//! defaults are the values the device ships with; the simulator and tests
//! override individual fields.

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::hal::WakeLevel;

/// Level the device logger is installed with
pub const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// Most verbose level kept in the retained ring; the console still gets [`LOG_LEVEL`]
pub const RING_LEVEL: LevelFilter = LevelFilter::Info;

/// Capacity of the retained diagnostic ring in bytes, about half of RTC fast RAM
pub const DIAGNOSTIC_RING_CAPACITY: usize = 4096;

/// Maximum length of one formatted log line, newline included
pub const LOG_LINE_CAPACITY: usize = 256;

/// Shortest sleep the scheduler will program (1 second)
pub const MIN_SLEEP_US: i64 = 1_000_000;

/// Sleep used instead of any request below [`MIN_SLEEP_US`] (2 seconds)
pub const SAFE_DEFAULT_SLEEP_US: u64 = 2_000_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub schedule: ScheduleConfig,
    pub wake: WakeConfig,
    pub interactive: InteractiveConfig,
    pub time: TimeConfig,
    pub network: NetworkConfig<'a>,
}

impl Config<'static> {
    /// Configuration the device ships with
    pub const fn device_default() -> Self {
        Self {
            schedule: ScheduleConfig::device_default(),
            wake: WakeConfig::device_default(),
            interactive: InteractiveConfig::device_default(),
            time: TimeConfig::device_default(),
            network: NetworkConfig {
                ssid: "",
                password: "",
                ntp_server: "pool.ntp.org",
            },
        }
    }
}

impl Default for Config<'static> {
    fn default() -> Self {
        Self::device_default()
    }
}

/// Sleep scheduling parameters
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Target period between two logged samples
    pub log_interval_ms: u64,
    /// Estimated time spent booting before the sample is taken
    pub wakeup_overhead_ms: u64,
    /// Requests below this are replaced with `safe_default_sleep_us`
    pub min_sleep_us: i64,
    pub safe_default_sleep_us: u64,
}

impl ScheduleConfig {
    pub const fn device_default() -> Self {
        Self {
            log_interval_ms: 60 * 1000,
            wakeup_overhead_ms: 1000,
            min_sleep_us: MIN_SLEEP_US,
            safe_default_sleep_us: SAFE_DEFAULT_SLEEP_US,
        }
    }
}

/// Wake classification parameters
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeConfig {
    /// Open the interactive window after routine timer wakes too
    pub stay_awake_on_timer: bool,
    /// Level of the external signal line that wakes the device
    pub signal_level: WakeLevel,
    pub debounce_poll_ms: u32,
    /// Upper bound on waiting for the signal line to be released
    pub debounce_max_ms: u32,
}

impl WakeConfig {
    pub const fn device_default() -> Self {
        Self {
            stay_awake_on_timer: false,
            signal_level: WakeLevel::Low,
            debounce_poll_ms: 10,
            debounce_max_ms: 5000,
        }
    }
}

/// Interactive window parameters
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractiveConfig {
    /// Inactivity after which the window closes
    pub idle_timeout_ms: u64,
    /// Pause between two service iterations
    pub poll_interval_ms: u32,
}

impl InteractiveConfig {
    pub const fn device_default() -> Self {
        Self {
            idle_timeout_ms: 90 * 1000,
            poll_interval_ms: 10,
        }
    }
}

/// Time reconciliation parameters
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConfig {
    /// A clock is trusted only when its year is strictly greater than this
    pub min_valid_year: u16,
    pub network_timeout_ms: u32,
}

impl TimeConfig {
    pub const fn device_default() -> Self {
        Self {
            min_valid_year: 2023,
            network_timeout_ms: 10 * 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    pub ntp_server: &'a str,
}
