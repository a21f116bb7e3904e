//! Scripted collaborators for host tests

use std::boxed::Box;
use std::string::String;
use std::sync::Mutex as StdMutex;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;

use crate::datalog::{CSV_HEADER, format_row};
use crate::error::{
    DisplayError, InteractionError, NetworkTimeError, RtcError, SensorError, StoreError,
};
use crate::hal::{
    Board, Devices, EnvironmentSensor, ExternalRtc, Interaction, NetworkTime, Platform,
    Reading, ReadingStore, SleepControl, StatusDisplay, SystemClock, WakeLevel,
};
use crate::recorder::ConsoleSink;
use crate::time::{DateTime, TimeCandidate};
use crate::wake::WakeEvent;

pub fn date(year: u16) -> DateTime {
    DateTime::new(year, 6, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocCall {
    ArmTimer(u64),
    ArmSignal(WakeLevel),
    /// Console output flushed, recorded by a journaling `CapturedConsole`
    Flush,
    Suspend,
}

/// One ordered record shared by a `MockSoc` and a `CapturedConsole`
pub type CallLog = &'static StdMutex<Vec<SocCall>>;

pub fn call_log() -> CallLog {
    Box::leak(Box::new(StdMutex::new(Vec::new())))
}

pub struct MockSoc {
    pub wake: WakeEvent,
    /// Number of polls that still see the signal line asserted
    pub signal_active_polls: u32,
    pub base_ms: u64,
    elapsed_ns: u64,
    pub clock: DateTime,
    pub clock_sets: u32,
    pub calls: Vec<SocCall>,
    pub journal: Option<CallLog>,
}

impl MockSoc {
    pub fn new() -> Self {
        Self {
            wake: WakeEvent::ColdBoot,
            signal_active_polls: 0,
            base_ms: 0,
            elapsed_ns: 0,
            clock: DateTime::EPOCH,
            clock_sets: 0,
            calls: Vec::new(),
            journal: None,
        }
    }

    fn record(&mut self, call: SocCall) {
        self.calls.push(call);
        if let Some(journal) = self.journal {
            journal.lock().unwrap().push(call);
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for MockSoc {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

impl Platform for MockSoc {
    fn wake_event(&mut self) -> WakeEvent {
        self.wake
    }

    fn signal_line_active(&mut self) -> bool {
        if self.signal_active_polls > 0 {
            self.signal_active_polls -= 1;
            true
        } else {
            false
        }
    }

    fn monotonic_ms(&mut self) -> u64 {
        self.base_ms + self.elapsed_ms()
    }
}

impl SystemClock for MockSoc {
    fn now(&self) -> DateTime {
        self.clock
    }

    fn set(&mut self, value: DateTime) {
        self.clock = value;
        self.clock_sets += 1;
    }
}

impl SleepControl for MockSoc {
    fn arm_timer(&mut self, duration_us: u64) {
        self.record(SocCall::ArmTimer(duration_us));
    }

    fn arm_signal_line(&mut self, level: WakeLevel) {
        self.record(SocCall::ArmSignal(level));
    }

    fn suspend(&mut self) {
        self.record(SocCall::Suspend);
    }
}

pub struct MockClock {
    value: DateTime,
    pub sets: u32,
}

impl MockClock {
    pub fn unset() -> Self {
        Self::at(DateTime::EPOCH)
    }

    pub fn at(value: DateTime) -> Self {
        Self { value, sets: 0 }
    }
}

impl SystemClock for MockClock {
    fn now(&self) -> DateTime {
        self.value
    }

    fn set(&mut self, value: DateTime) {
        self.value = value;
        self.sets += 1;
    }
}

pub struct MockRtc {
    present: bool,
    time: TimeCandidate,
    pub reads: u32,
    pub write_attempts: u32,
    pub writes: Vec<DateTime>,
    pub fail_writes: Option<RtcError>,
}

impl MockRtc {
    pub fn with_time(value: DateTime, valid: bool) -> Self {
        Self {
            present: true,
            time: TimeCandidate::new(value, valid),
            reads: 0,
            write_attempts: 0,
            writes: Vec::new(),
            fail_writes: None,
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::with_time(DateTime::EPOCH, false)
        }
    }
}

impl ExternalRtc for MockRtc {
    async fn is_present(&mut self) -> bool {
        self.present
    }

    async fn read_time(&mut self) -> Result<TimeCandidate, RtcError> {
        self.reads += 1;
        if !self.present {
            return Err(RtcError::NotPresent);
        }
        Ok(self.time)
    }

    async fn write_time(&mut self, value: DateTime) -> Result<(), RtcError> {
        self.write_attempts += 1;
        if !self.present {
            return Err(RtcError::NotPresent);
        }
        if let Some(e) = self.fail_writes {
            return Err(e);
        }
        self.writes.push(value);
        self.time = TimeCandidate::new(value, true);
        Ok(())
    }
}

pub struct MockNetworkTime {
    answer: Result<DateTime, NetworkTimeError>,
    pub fetches: u32,
    pub last_timeout_ms: Option<u32>,
}

impl MockNetworkTime {
    pub fn answering(value: DateTime) -> Self {
        Self {
            answer: Ok(value),
            fetches: 0,
            last_timeout_ms: None,
        }
    }

    pub fn failing(error: NetworkTimeError) -> Self {
        Self {
            answer: Err(error),
            fetches: 0,
            last_timeout_ms: None,
        }
    }
}

impl NetworkTime for MockNetworkTime {
    async fn fetch(&mut self, timeout_ms: u32) -> Result<DateTime, NetworkTimeError> {
        self.fetches += 1;
        self.last_timeout_ms = Some(timeout_ms);
        self.answer
    }
}

pub struct MockSensor {
    pub init_error: Option<SensorError>,
    pub result: Result<Reading, SensorError>,
    pub reads: u32,
}

impl MockSensor {
    pub fn reading(temperature_c: f32, humidity_pct: f32) -> Self {
        Self {
            init_error: None,
            result: Ok(Reading::new(temperature_c, humidity_pct)),
            reads: 0,
        }
    }
}

impl EnvironmentSensor for MockSensor {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.init_error.map_or(Ok(()), Err)
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        self.reads += 1;
        self.result
    }
}

#[derive(Default)]
pub struct MockStore {
    pub init_error: Option<StoreError>,
    pub fail_appends: Option<StoreError>,
    pub rows: Vec<(String, Reading)>,
}

impl ReadingStore for MockStore {
    async fn init(&mut self) -> Result<(), StoreError> {
        self.init_error.map_or(Ok(()), Err)
    }

    async fn append(&mut self, timestamp: &str, reading: &Reading) -> Result<(), StoreError> {
        if let Some(e) = self.fail_appends {
            return Err(e);
        }
        self.rows.push((String::from(timestamp), *reading));
        Ok(())
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, StoreError> {
        if self.rows.is_empty() {
            return Ok(0);
        }
        let mut file = String::from(CSV_HEADER);
        for (timestamp, reading) in &self.rows {
            file.push_str(&format_row(timestamp, reading)?);
        }
        let rest = file
            .as_bytes()
            .get(offset as usize..)
            .unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }
}

#[derive(Default)]
pub struct MockDisplay {
    pub shown: Vec<(Reading, String)>,
    pub turned_off: u32,
}

impl StatusDisplay for MockDisplay {
    async fn show_reading(&mut self, reading: &Reading, timestamp: &str) -> Result<(), DisplayError> {
        self.shown.push((*reading, String::from(timestamp)));
        Ok(())
    }

    async fn turn_off(&mut self) {
        self.turned_off += 1;
    }
}

pub struct MockInteraction {
    pub fail_activation: Option<InteractionError>,
    /// Reports idle once this many service calls have happened
    pub idle_after: u32,
    pub time_request: Option<DateTime>,
    pub active: bool,
    pub activations: u32,
    pub deactivations: u32,
    pub services: u32,
    /// Reading and timestamp handed to each activation
    pub shown: Vec<(Reading, String)>,
    /// Read the whole log from the store on the first service call
    pub download: bool,
    pub downloaded: Option<Vec<u8>>,
}

impl MockInteraction {
    pub fn idle_after(services: u32) -> Self {
        Self {
            fail_activation: None,
            idle_after: services,
            time_request: None,
            active: false,
            activations: 0,
            deactivations: 0,
            services: 0,
            shown: Vec::new(),
            download: false,
            downloaded: None,
        }
    }
}

impl Interaction for MockInteraction {
    async fn activate(&mut self, reading: &Reading, measured_at: &str) -> Result<(), InteractionError> {
        self.activations += 1;
        self.shown.push((*reading, String::from(measured_at)));
        if let Some(e) = self.fail_activation {
            return Err(e);
        }
        self.active = true;
        Ok(())
    }

    async fn service<S: ReadingStore>(&mut self, store: &mut S) {
        self.services += 1;
        if self.download && self.downloaded.is_none() {
            let mut file = Vec::new();
            let mut chunk = [0u8; 16];
            while let Ok(n @ 1..) = store.read_at(file.len() as u64, &mut chunk).await {
                file.extend_from_slice(&chunk[..n]);
            }
            self.downloaded = Some(file);
        }
    }

    fn take_time_request(&mut self) -> Option<DateTime> {
        self.time_request.take()
    }

    fn is_idle(&mut self) -> bool {
        !self.active || self.services >= self.idle_after
    }

    async fn deactivate(&mut self) {
        self.active = false;
        self.deactivations += 1;
    }
}

pub struct MockBoard;

impl Board for MockBoard {
    type Sensor = MockSensor;
    type Store = MockStore;
    type Display = MockDisplay;
    type Interaction = MockInteraction;
    type Rtc = MockRtc;
    type NetworkTime = MockNetworkTime;
    type Soc = MockSoc;
}

/// A healthy board: valid RTC, working sensor and store, no network.
pub fn devices(wake: WakeEvent) -> Devices<MockBoard> {
    let mut soc = MockSoc::new();
    soc.wake = wake;
    soc.base_ms = 1_000;

    Devices {
        sensor: MockSensor::reading(21.5, 45.0),
        store: MockStore::default(),
        display: MockDisplay::default(),
        interaction: MockInteraction::idle_after(3),
        rtc: MockRtc::with_time(date(2025), true),
        network_time: MockNetworkTime::failing(NetworkTimeError::Link),
        soc,
    }
}

/// Console that keeps everything written to it
pub struct CapturedConsole {
    text: StdMutex<String>,
    flushes: StdMutex<u32>,
    journal: Option<CallLog>,
}

impl CapturedConsole {
    pub fn leak() -> &'static Self {
        Box::leak(Box::new(Self {
            text: StdMutex::new(String::new()),
            flushes: StdMutex::new(0),
            journal: None,
        }))
    }

    /// Also records each flush into `journal`
    pub fn journaling(journal: CallLog) -> &'static Self {
        Box::leak(Box::new(Self {
            text: StdMutex::new(String::new()),
            flushes: StdMutex::new(0),
            journal: Some(journal),
        }))
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> u32 {
        *self.flushes.lock().unwrap()
    }
}

impl ConsoleSink for CapturedConsole {
    fn write_str(&self, text: &str) {
        self.text.lock().unwrap().push_str(text);
    }

    fn flush(&self) {
        *self.flushes.lock().unwrap() += 1;
        if let Some(journal) = self.journal {
            journal.lock().unwrap().push(SocCall::Flush);
        }
    }
}
