//! Files that stand in for memory and chips surviving a cycle
//!
//! `retained.bin` is the postcard image of the retained region,
//! `hardware.bin` holds everything the silicon would remember on its own:
//! the virtual clocks, the wake source that will fire, and the external
//! RTC's registers. The operator's view of the interaction window lands in
//! `operator.html` and `download.csv`.

use std::fs;
use std::io;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use torpor_core::retained::RetainedState;

pub const RETAINED_FILE: &str = "retained.bin";
pub const HARDWARE_FILE: &str = "hardware.bin";
pub const DATALOG_FILE: &str = "datalog.csv";
pub const PAGE_FILE: &str = "operator.html";
pub const DOWNLOAD_FILE: &str = "download.csv";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWake {
    PowerOn,
    Timer,
    Signal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HardwareState {
    pub world_us: u64,
    pub powered_at_us: u64,
    /// SoC wall clock minus world time. Lost on power-on.
    pub system_offset_secs: Option<i64>,
    /// External RTC minus world time. `None` until first written.
    pub rtc_offset_secs: Option<i64>,
    pub wake: PendingWake,
    /// Completed cycles across all invocations
    pub wakes: u32,
}

impl Default for HardwareState {
    fn default() -> Self {
        Self {
            world_us: 0,
            powered_at_us: 0,
            system_offset_secs: None,
            rtc_offset_secs: None,
            wake: PendingWake::PowerOn,
            wakes: 0,
        }
    }
}

pub fn load_hardware(dir: &Path) -> HardwareState {
    match fs::read(dir.join(HARDWARE_FILE)) {
        Ok(bytes) => postcard::from_bytes(&bytes).unwrap_or_else(|e| {
            warn!("Discarding unreadable hardware state: {}", e);
            HardwareState::default()
        }),
        Err(_) => HardwareState::default(),
    }
}

pub fn save_hardware(dir: &Path, state: &HardwareState) -> io::Result<()> {
    let bytes = postcard::to_allocvec(state).map_err(|e| io::Error::other(e.to_string()))?;
    fs::write(dir.join(HARDWARE_FILE), bytes)
}

/// `None` when there is no image or it does not decode, i.e. a power-on
pub fn load_retained(dir: &Path) -> Option<RetainedState> {
    let bytes = fs::read(dir.join(RETAINED_FILE)).ok()?;
    match RetainedState::from_snapshot(&bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Retained image rejected: {}", e);
            None
        }
    }
}

pub fn save_retained(dir: &Path, image: &[u8]) -> io::Result<()> {
    fs::write(dir.join(RETAINED_FILE), image)
}
