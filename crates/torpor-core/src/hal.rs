//! Capability traits for everything outside the core
//!
//! Each collaborator is injected into the [`Lifecycle`](crate::lifecycle::Lifecycle)
//! through a [`Board`], with exactly one implementation per target: the
//! ESP32-S3 firmware, the desktop simulator and the test mocks.

use core::future::Future;

use embedded_hal_async::delay::DelayNs;
use serde::{Deserialize, Serialize};

use crate::error::{
    DisplayError, InteractionError, NetworkTimeError, RtcError, SensorError, StoreError,
};
use crate::time::{DateTime, TimeCandidate};
use crate::wake::WakeEvent;

/// One temperature/humidity sample.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

impl Reading {
    /// Sentinel held in retained memory until the first successful log
    pub const UNSET: Self = Self {
        temperature_c: f32::NAN,
        humidity_pct: f32::NAN,
    };

    pub const fn new(temperature_c: f32, humidity_pct: f32) -> Self {
        Self {
            temperature_c,
            humidity_pct,
        }
    }

    /// Both channels hold a number
    pub fn is_valid(&self) -> bool {
        !self.temperature_c.is_nan() && !self.humidity_pct.is_nan()
    }
}

/// Level that triggers the external signal wake source.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeLevel {
    Low,
    High,
}

/// Temperature and humidity sensor.
pub trait EnvironmentSensor {
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Take one measurement. A reading with a NaN channel is treated as failed.
    fn read(&mut self) -> impl Future<Output = Result<Reading, SensorError>>;
}

/// Append-only sink for logged samples.
pub trait ReadingStore {
    fn init(&mut self) -> impl Future<Output = Result<(), StoreError>>;

    fn append(
        &mut self,
        timestamp: &str,
        reading: &Reading,
    ) -> impl Future<Output = Result<(), StoreError>>;

    /// Copy log file bytes starting at `offset` into `buf`, header included.
    ///
    /// Returns 0 at the end of the file, and for a log that does not exist yet.
    fn read_at(
        &mut self,
        offset: u64,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, StoreError>>;
}

/// Small status screen showing the cached reading.
pub trait StatusDisplay {
    fn show_reading(
        &mut self,
        reading: &Reading,
        timestamp: &str,
    ) -> impl Future<Output = Result<(), DisplayError>>;

    fn turn_off(&mut self) -> impl Future<Output = ()>;
}

/// Operator-facing window (access point, configuration server, buttons).
///
/// A window that failed to activate must report itself idle, otherwise the
/// interactive state has no way out.
pub trait Interaction {
    /// Open the window showing `reading`, the last persisted sample, and
    /// `measured_at`, its log timestamp (empty before the first sample).
    fn activate(
        &mut self,
        reading: &Reading,
        measured_at: &str,
    ) -> impl Future<Output = Result<(), InteractionError>>;

    /// Handle pending operator activity. Called once per interactive iteration.
    ///
    /// `store` serves log downloads.
    fn service<S: ReadingStore>(&mut self, store: &mut S) -> impl Future<Output = ()>;

    /// A wall-clock time entered by the operator, taken at most once.
    fn take_time_request(&mut self) -> Option<DateTime>;

    fn is_idle(&mut self) -> bool;

    fn deactivate(&mut self) -> impl Future<Output = ()>;
}

/// Battery-backed calendar clock chip.
pub trait ExternalRtc {
    fn is_present(&mut self) -> impl Future<Output = bool>;

    /// Current time plus the chip's own integrity flag (cleared after power loss).
    fn read_time(&mut self) -> impl Future<Output = Result<TimeCandidate, RtcError>>;

    fn write_time(&mut self, value: DateTime) -> impl Future<Output = Result<(), RtcError>>;
}

/// The SoC's own wall clock, which keeps running through deep sleep.
pub trait SystemClock {
    fn now(&self) -> DateTime;

    fn set(&mut self, value: DateTime);
}

/// Network time client. Brings networking up and down around the fetch.
pub trait NetworkTime {
    fn fetch(&mut self, timeout_ms: u32) -> impl Future<Output = Result<DateTime, NetworkTimeError>>;
}

/// SoC services that exist on every wake.
pub trait Platform: DelayNs {
    /// Decode the hardware wake cause register
    fn wake_event(&mut self) -> WakeEvent;

    /// Whether the external signal line is currently asserted
    fn signal_line_active(&mut self) -> bool;

    /// Milliseconds on a clock that keeps counting through deep sleep
    fn monotonic_ms(&mut self) -> u64;
}

/// Wake source programming and the deep sleep entry itself.
pub trait SleepControl {
    fn arm_timer(&mut self, duration_us: u64);

    fn arm_signal_line(&mut self, level: WakeLevel);

    /// Enter deep sleep. Never returns on hardware; simulated targets return
    /// to end the cycle.
    fn suspend(&mut self);
}

/// Groups the collaborator types of one target.
pub trait Board {
    type Sensor: EnvironmentSensor;
    type Store: ReadingStore;
    type Display: StatusDisplay;
    type Interaction: Interaction;
    type Rtc: ExternalRtc;
    type NetworkTime: NetworkTime;
    type Soc: Platform + SystemClock + SleepControl;
}

/// Owned collaborator instances for one wake cycle.
pub struct Devices<B: Board> {
    pub sensor: B::Sensor,
    pub store: B::Store,
    pub display: B::Display,
    pub interaction: B::Interaction,
    pub rtc: B::Rtc,
    pub network_time: B::NetworkTime,
    pub soc: B::Soc,
}
