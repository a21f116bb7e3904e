//! Per-wake state machine
//!
//! ```text
//! Init -> ClassifyWake -> LogReading -> Interactive* -> PrepareSleep
//!                                  \________________/
//! ```
//!
//! Every wake starts at [`State::Init`] and ends in [`State::PrepareSleep`],
//! which programs the wake sources and suspends. Nothing in here is fatal:
//! a failing collaborator is logged and its feature skipped for the cycle.

use embedded_hal_async::delay::DelayNs;
use log::{Log, debug, error, info, warn};

use crate::config::Config;
use crate::hal::{
    Board, Devices, EnvironmentSensor, Interaction, Platform, ReadingStore, StatusDisplay,
};
use crate::recorder::DiagnosticLogger;
use crate::retained::CycleRecord;
use crate::schedule::{self, SleepPlan};
use crate::time::{TimeAuthority, TimeSource};
use crate::wake::{self, Debounce, WakeEvent};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    ClassifyWake,
    LogReading,
    Interactive,
    PrepareSleep,
}

/// Scratch state for one wake. Discarded at suspend.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleContext {
    pub wake: Option<WakeEvent>,
    pub stay_awake: bool,
    pub sensor_ready: bool,
    pub store_ready: bool,
    pub time_source: Option<TimeSource>,
    pub logged: bool,
    pub interactive_started: bool,
    /// Activation failed; the window counts as idle from then on
    pub interactive_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue(State),
    /// Wake sources are armed and suspend was requested
    Suspended(SleepPlan),
}

/// Outcome of one wake, for targets where suspend returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub wake: WakeEvent,
    pub logged: bool,
    pub time_source: Option<TimeSource>,
    pub plan: SleepPlan,
    pub cycle_count: i32,
}

pub struct Lifecycle<'a, B: Board> {
    devices: Devices<B>,
    record: &'a mut CycleRecord,
    recorder: Option<&'a DiagnosticLogger>,
    config: &'a Config<'a>,
    time: TimeAuthority,
    state: State,
    ctx: CycleContext,
}

impl<'a, B: Board> Lifecycle<'a, B> {
    pub fn new(devices: Devices<B>, record: &'a mut CycleRecord, config: &'a Config<'a>) -> Self {
        Self {
            devices,
            record,
            recorder: None,
            config,
            time: TimeAuthority::new(&config.time),
            state: State::Init,
            ctx: CycleContext::default(),
        }
    }

    /// Use `recorder` for the fill report and the history replay
    pub fn with_recorder(mut self, recorder: &'a DiagnosticLogger) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &CycleContext {
        &self.ctx
    }

    pub fn record(&self) -> &CycleRecord {
        &*self.record
    }

    pub fn devices(&self) -> &Devices<B> {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut Devices<B> {
        &mut self.devices
    }

    pub fn into_devices(self) -> Devices<B> {
        self.devices
    }

    /// Run states until suspend.
    ///
    /// On hardware the final suspend does not return, so neither does this.
    pub async fn run(&mut self) -> CycleReport {
        loop {
            if let Step::Suspended(plan) = self.step().await {
                return CycleReport {
                    wake: self.ctx.wake.unwrap_or(WakeEvent::ColdBoot),
                    logged: self.ctx.logged,
                    time_source: self.ctx.time_source,
                    plan,
                    cycle_count: self.record.suspend_cycle_count(),
                };
            }
        }
    }

    /// Execute the current state once
    pub async fn step(&mut self) -> Step {
        match self.state {
            State::Init => {
                self.init().await;
                self.transition(State::ClassifyWake)
            }
            State::ClassifyWake => {
                self.classify_wake().await;
                self.transition(State::LogReading)
            }
            State::LogReading => {
                self.log_reading().await;
                if self.ctx.stay_awake {
                    self.transition(State::Interactive)
                } else {
                    self.transition(State::PrepareSleep)
                }
            }
            State::Interactive => {
                if self.interactive().await {
                    self.transition(State::PrepareSleep)
                } else {
                    Step::Continue(State::Interactive)
                }
            }
            State::PrepareSleep => Step::Suspended(self.prepare_sleep()),
        }
    }

    fn transition(&mut self, next: State) -> Step {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
        Step::Continue(next)
    }

    async fn init(&mut self) {
        let cycle = self.record.suspend_cycle_count();
        if let Some(recorder) = self.recorder {
            recorder.set_cycle(cycle);
        }
        info!("Cycle {} starting", cycle);

        match self.devices.sensor.init().await {
            Ok(()) => self.ctx.sensor_ready = true,
            Err(e) => error!("Sensor unavailable this cycle: {}", e),
        }

        match self.devices.store.init().await {
            Ok(()) => self.ctx.store_ready = true,
            Err(e) => error!("Log store unavailable this cycle: {}", e),
        }

        match self.recorder.and_then(DiagnosticLogger::ring_usage) {
            Some(usage) => info!(
                "Retained log holds {}/{} bytes{}",
                usage.used,
                usage.capacity,
                if usage.wrapped { " (wrapped)" } else { "" }
            ),
            None => warn!("Retained log recorder not attached"),
        }

        match self
            .time
            .resolve_and_sync(
                &mut self.devices.rtc,
                &mut self.devices.soc,
                &mut self.devices.network_time,
            )
            .await
        {
            Ok(source) => self.ctx.time_source = Some(source),
            Err(e) => warn!("{}, samples will be stamped without a time", e),
        }
    }

    async fn classify_wake(&mut self) {
        let event = self.devices.soc.wake_event();
        let stay_awake = wake::stay_awake(event, &self.config.wake);
        self.ctx.wake = Some(event);
        self.ctx.stay_awake = stay_awake;
        info!("Woke from {}, stay awake: {}", event.label(), stay_awake);

        if event == WakeEvent::ExternalSignal {
            match wake::debounce(&mut self.devices.soc, &self.config.wake).await {
                Debounce::Released { waited_ms } => {
                    debug!("Signal line released after {} ms", waited_ms)
                }
                Debounce::StillHeld { waited_ms } => {
                    warn!("Signal line still asserted after {} ms", waited_ms)
                }
            }
            self.show_cached_reading().await;
        }

        if stay_awake {
            if let Some(recorder) = self.recorder {
                match recorder.replay_to_console() {
                    Some(lines) => info!("Replayed {} retained log lines", lines),
                    None => debug!("No console or ring for replay"),
                }
            }
        }
    }

    async fn log_reading(&mut self) {
        if !self.ctx.sensor_ready {
            warn!("Skipping sample, sensor not initialized");
            return;
        }

        let reading = match self.devices.sensor.read().await {
            Ok(reading) if reading.is_valid() => reading,
            Ok(_) => {
                error!("Sensor returned NaN, sample dropped");
                return;
            }
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        if !self.ctx.store_ready {
            warn!("Sample not persisted, log store not initialized");
            return;
        }

        let timestamp = self.time.timestamp_text(&self.devices.soc);
        match self.devices.store.append(&timestamp, &reading).await {
            Ok(()) => {
                let now_ms = self.devices.soc.monotonic_ms();
                self.record.record_success(now_ms, reading, &timestamp);
                self.ctx.logged = true;
                info!(
                    "Logged {:.2} C, {:.2} %RH at {}",
                    reading.temperature_c, reading.humidity_pct, timestamp
                );
            }
            Err(e) => error!("Sample not persisted: {}", e),
        }
    }

    /// One iteration of the interactive window. Returns `true` once idle.
    async fn interactive(&mut self) -> bool {
        if !self.ctx.interactive_started {
            self.ctx.interactive_started = true;
            self.show_cached_reading().await;
            let reading = *self.record.last_reading();
            match self
                .devices
                .interaction
                .activate(&reading, self.record.last_log_timestamp())
                .await
            {
                Ok(()) => info!(
                    "Interactive window open, closes after {} s idle",
                    self.config.interactive.idle_timeout_ms / 1000
                ),
                Err(e) => {
                    error!("{}", e);
                    self.ctx.interactive_failed = true;
                }
            }
        }

        self.devices
            .interaction
            .service(&mut self.devices.store)
            .await;

        if let Some(value) = self.devices.interaction.take_time_request() {
            match self
                .time
                .apply_manual(value, &mut self.devices.rtc, &mut self.devices.soc)
                .await
            {
                Ok(()) => self.ctx.time_source = Some(TimeSource::Manual),
                Err(e) => warn!("Manual time rejected: {}", e),
            }
        }

        if self.ctx.interactive_failed || self.devices.interaction.is_idle() {
            info!("Interactive window idle, closing");
            self.devices.interaction.deactivate().await;
            self.devices.display.turn_off().await;
            return true;
        }

        DelayNs::delay_ms(
            &mut self.devices.soc,
            self.config.interactive.poll_interval_ms,
        )
        .await;
        false
    }

    async fn show_cached_reading(&mut self) {
        let reading = *self.record.last_reading();
        if !reading.is_valid() {
            debug!("No cached reading to show yet");
            return;
        }

        if let Err(e) = self
            .devices
            .display
            .show_reading(&reading, self.record.last_log_timestamp())
            .await
        {
            warn!("{}", e);
        }
    }

    fn prepare_sleep(&mut self) -> SleepPlan {
        let now_ms = self.devices.soc.monotonic_ms();
        let plan = SleepPlan::for_cycle(self.record.last_logged_at_ms(), now_ms, &self.config.schedule);
        let finished = self.record.suspend_cycle_count();
        self.record.complete_cycle();
        info!(
            "Cycle {} done, next wake in {} ms",
            finished,
            plan.effective_us / 1000
        );

        let output: &dyn Log = match self.recorder {
            Some(recorder) => recorder,
            None => log::logger(),
        };
        schedule::enter(
            &mut self.devices.soc,
            plan,
            self.config.wake.signal_level,
            output,
        );
        plan
    }
}
