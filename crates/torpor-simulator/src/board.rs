//! Simulated collaborators
//!
//! Everything runs on the virtual clock in [`crate::clock`]: delays cost no
//! real time, and state the silicon would keep across deep sleep is handed
//! back to [`crate::state`] at the end of the cycle.

use std::f64::consts::TAU;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};
use torpor_core::datalog::{CSV_HEADER, format_row};
use torpor_core::error::{
    DisplayError, InteractionError, NetworkTimeError, RtcError, SensorError, StoreError,
};
use torpor_core::hal::{
    Board, EnvironmentSensor, ExternalRtc, Interaction, NetworkTime, Platform, Reading,
    ReadingStore, SleepControl, StatusDisplay, SystemClock, WakeLevel,
};
use torpor_core::page;
use torpor_core::recorder::ConsoleSink;
use torpor_core::time::{DateTime, TimeCandidate};
use torpor_core::wake::WakeEvent;

use crate::clock;
use crate::state::{DOWNLOAD_FILE, PAGE_FILE};

const SENSOR_NAME: &str = "SHT40 (simulated)";
/// High-repeatability measurement time of the real part
const MEASUREMENT_US: u64 = 10_000;
const NETWORK_ROUND_TRIP_US: u64 = 150_000;
/// Polls the button still reads pressed after a signal wake
const BUTTON_HELD_POLLS: u32 = 3;

pub struct Simulated;

impl Board for Simulated {
    type Sensor = SimSensor;
    type Store = CsvStore;
    type Display = ConsoleDisplay;
    type Interaction = SimOperator;
    type Rtc = SimRtc;
    type NetworkTime = HostNetworkTime;
    type Soc = SimSoc;
}

/// Log console on stderr
pub struct StderrConsole;

pub static STDERR_CONSOLE: StderrConsole = StderrConsole;

impl ConsoleSink for StderrConsole {
    fn write_str(&self, text: &str) {
        eprint!("{text}");
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn wall_clock(offset_secs: i64) -> DateTime {
    let secs = clock::world_secs().saturating_add(offset_secs);
    DateTime::from_unix_secs(u64::try_from(secs).unwrap_or(0))
}

fn offset_to(value: DateTime) -> i64 {
    i64::try_from(value.to_unix_secs())
        .unwrap_or(i64::MAX)
        .saturating_sub(clock::world_secs())
}

pub struct SimSoc {
    wake: WakeEvent,
    button_held_polls: u32,
    system_offset_secs: Option<i64>,
    pub armed_timer_us: Option<u64>,
    pub armed_signal: Option<WakeLevel>,
    pub suspended: bool,
}

impl SimSoc {
    /// `system_offset_secs` is `None` after power-on; the clock then counts
    /// from the epoch like a fresh RTC controller.
    pub fn new(wake: WakeEvent, system_offset_secs: Option<i64>) -> Self {
        Self {
            wake,
            button_held_polls: if wake == WakeEvent::ExternalSignal {
                BUTTON_HELD_POLLS
            } else {
                0
            },
            system_offset_secs,
            armed_timer_us: None,
            armed_signal: None,
            suspended: false,
        }
    }

    pub fn system_offset_secs(&self) -> Option<i64> {
        self.system_offset_secs
    }
}

impl DelayNs for SimSoc {
    async fn delay_ns(&mut self, ns: u32) {
        clock::advance_us(u64::from(ns) / 1000);
    }
}

impl Platform for SimSoc {
    fn wake_event(&mut self) -> WakeEvent {
        self.wake
    }

    fn signal_line_active(&mut self) -> bool {
        if self.button_held_polls > 0 {
            self.button_held_polls -= 1;
            true
        } else {
            false
        }
    }

    fn monotonic_ms(&mut self) -> u64 {
        clock::uptime_ms()
    }
}

impl SystemClock for SimSoc {
    fn now(&self) -> DateTime {
        match self.system_offset_secs {
            Some(offset) => wall_clock(offset),
            None => DateTime::from_unix_secs(clock::uptime_us() / 1_000_000),
        }
    }

    fn set(&mut self, value: DateTime) {
        self.system_offset_secs = Some(offset_to(value));
    }
}

impl SleepControl for SimSoc {
    fn arm_timer(&mut self, duration_us: u64) {
        self.armed_timer_us = Some(duration_us);
    }

    fn arm_signal_line(&mut self, level: WakeLevel) {
        self.armed_signal = Some(level);
    }

    fn suspend(&mut self) {
        debug!(
            "Suspending with timer {:?} us, signal {:?}",
            self.armed_timer_us, self.armed_signal
        );
        self.suspended = true;
    }
}

/// Battery-backed clock chip. Runs on world time, so it survives power-on.
pub struct SimRtc {
    present: bool,
    offset_secs: Option<i64>,
}

impl SimRtc {
    pub fn new(present: bool, offset_secs: Option<i64>) -> Self {
        Self {
            present,
            offset_secs,
        }
    }

    pub fn offset_secs(&self) -> Option<i64> {
        self.offset_secs
    }
}

impl ExternalRtc for SimRtc {
    async fn is_present(&mut self) -> bool {
        self.present
    }

    async fn read_time(&mut self) -> Result<TimeCandidate, RtcError> {
        if !self.present {
            return Err(RtcError::NotPresent);
        }
        Ok(match self.offset_secs {
            Some(offset) => TimeCandidate::new(wall_clock(offset), true),
            // Never set: counting from whatever it powered up with
            None => TimeCandidate::new(wall_clock(0), false),
        })
    }

    async fn write_time(&mut self, value: DateTime) -> Result<(), RtcError> {
        if !self.present {
            return Err(RtcError::NotPresent);
        }
        self.offset_secs = Some(offset_to(value));
        Ok(())
    }
}

/// Network time answered from the host's clock
pub struct HostNetworkTime {
    offline: bool,
}

impl HostNetworkTime {
    pub fn new(offline: bool) -> Self {
        Self { offline }
    }
}

impl NetworkTime for HostNetworkTime {
    async fn fetch(&mut self, timeout_ms: u32) -> Result<DateTime, NetworkTimeError> {
        if self.offline {
            clock::advance_us(u64::from(timeout_ms) * 1000);
            return Err(NetworkTimeError::Timeout { timeout_ms });
        }
        clock::advance_us(NETWORK_ROUND_TRIP_US);

        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| NetworkTimeError::BadResponse("host clock before 1970"))?;
        Ok(DateTime::from_unix_secs(since_epoch.as_secs()))
    }
}

/// Synthetic readings following slow daily-ish sinusoids of world time
pub struct SimSensor {
    fail: bool,
}

impl SimSensor {
    pub fn new(fail: bool) -> Self {
        Self { fail }
    }
}

impl EnvironmentSensor for SimSensor {
    async fn init(&mut self) -> Result<(), SensorError> {
        if self.fail {
            return Err(SensorError::NotPresent {
                sensor: SENSOR_NAME,
            });
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        if self.fail {
            return Err(SensorError::ReadFailed {
                sensor: SENSOR_NAME,
                operation: "measure",
                details: "no acknowledge",
            });
        }
        clock::advance_us(MEASUREMENT_US);

        let t = clock::world_us() as f64 / 1e6;
        let temperature = 21.0 + 3.0 * (TAU * t / 3600.0).sin() + 0.4 * (TAU * t / 420.0).cos();
        let humidity = 48.0 + 9.0 * (TAU * t / 5400.0).sin() + 1.5 * (TAU * t / 300.0).cos();
        Ok(Reading::new(temperature as f32, humidity as f32))
    }
}

/// Sample log as a CSV file in the state directory
pub struct CsvStore {
    path: PathBuf,
    file: Option<File>,
}

impl CsvStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }
}

impl ReadingStore for CsvStore {
    async fn init(&mut self) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|_| StoreError::NotMounted)?;
        let len = file
            .metadata()
            .map_err(|_| StoreError::Io { operation: "stat" })?
            .len();
        if len == 0 {
            file.write_all(CSV_HEADER.as_bytes())
                .map_err(|_| StoreError::Io {
                    operation: "write header",
                })?;
        }
        self.file = Some(file);
        Ok(())
    }

    async fn append(&mut self, timestamp: &str, reading: &Reading) -> Result<(), StoreError> {
        let file = self.file.as_mut().ok_or(StoreError::NotMounted)?;
        let row = format_row(timestamp, reading)?;
        file.write_all(row.as_bytes())
            .map_err(|_| StoreError::Io { operation: "append" })?;
        file.sync_data()
            .map_err(|_| StoreError::Io { operation: "sync" })
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(_) => return Err(StoreError::NotMounted),
        };
        file.seek(SeekFrom::Start(offset))
            .map_err(|_| StoreError::Io { operation: "seek" })?;
        file.read(buf)
            .map_err(|_| StoreError::Io { operation: "read" })
    }
}

/// Status screen rendered as log lines
#[derive(Default)]
pub struct ConsoleDisplay {
    lit: bool,
}

impl StatusDisplay for ConsoleDisplay {
    async fn show_reading(&mut self, reading: &Reading, timestamp: &str) -> Result<(), DisplayError> {
        self.lit = true;
        info!(
            "[display] {:.1} C | {:.1} %RH | logged at {}",
            reading.temperature_c, reading.humidity_pct, timestamp
        );
        Ok(())
    }

    async fn turn_off(&mut self) {
        if self.lit {
            info!("[display] off");
            self.lit = false;
        }
    }
}

/// An operator who opens the home page, which pulls the log like a browser
/// would, optionally submits one time entry, then walks away.
///
/// The page lands in [`PAGE_FILE`] and the log copy in [`DOWNLOAD_FILE`].
pub struct SimOperator {
    dir: PathBuf,
    time_entry: Option<DateTime>,
    submitted: Option<DateTime>,
    idle_timeout_us: u64,
    last_activity_us: u64,
    active: bool,
    downloaded: bool,
}

impl SimOperator {
    pub fn new(dir: &Path, time_entry: Option<DateTime>, idle_timeout_ms: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            time_entry,
            submitted: None,
            idle_timeout_us: idle_timeout_ms.saturating_mul(1000),
            last_activity_us: 0,
            active: false,
            downloaded: false,
        }
    }

    async fn download<S: ReadingStore>(&self, store: &mut S) -> io::Result<u64> {
        let mut out = File::create(self.dir.join(DOWNLOAD_FILE))?;
        let mut chunk = [0u8; 512];
        let mut offset = 0u64;
        loop {
            let n = store
                .read_at(offset, &mut chunk)
                .await
                .map_err(|e| io::Error::other(e.to_string()))?;
            if n == 0 {
                return Ok(offset);
            }
            out.write_all(&chunk[..n])?;
            offset += n as u64;
        }
    }
}

impl Interaction for SimOperator {
    async fn activate(&mut self, reading: &Reading, measured_at: &str) -> Result<(), InteractionError> {
        self.active = true;
        self.downloaded = false;
        self.last_activity_us = clock::world_us();
        let home = page::render_home(reading, measured_at);
        match std::fs::write(self.dir.join(PAGE_FILE), home) {
            Ok(()) => info!("Operator window open, home page in {}", PAGE_FILE),
            Err(e) => warn!("Operator window open, home page not written: {}", e),
        }
        Ok(())
    }

    async fn service<S: ReadingStore>(&mut self, store: &mut S) {
        if !self.active {
            return;
        }
        if !self.downloaded {
            self.downloaded = true;
            match self.download(store).await {
                Ok(bytes) => info!("Operator downloaded {} bytes of log", bytes),
                Err(e) => warn!("Log download failed: {}", e),
            }
        }
        if let Some(value) = self.time_entry.take() {
            info!("Operator submits time {}", value);
            self.submitted = Some(value);
            self.last_activity_us = clock::world_us();
        }
    }

    fn take_time_request(&mut self) -> Option<DateTime> {
        self.submitted.take()
    }

    fn is_idle(&mut self) -> bool {
        !self.active || clock::world_us().saturating_sub(self.last_activity_us) >= self.idle_timeout_us
    }

    async fn deactivate(&mut self) {
        self.active = false;
        info!("Operator window closed");
    }
}
