//! ESP32-S3 platform services: wake cause, clocks and deep sleep
//!
//! Both clocks come from the RTC controller, which keeps counting through
//! deep sleep: the monotonic clock is the time since power-up, the wall clock
//! is that plus the boot-time offset the RTC keeps in its own registers.

use core::time::Duration as CoreDuration;

use embassy_time::{Duration, Timer};
use embedded_hal_async::delay::DelayNs;
use esp_hal::gpio::{Input, RtcPinWithResistors};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::{Ext0WakeupSource, TimerWakeupSource, WakeupLevel};
use esp_hal::system::SleepSource;
use log::warn;
use torpor_core::hal::{Platform, SleepControl, SystemClock, WakeLevel};
use torpor_core::time::DateTime;
use torpor_core::wake::WakeEvent;

pub struct EspSoc {
    rtc: Rtc<'static>,
    /// Wake button, polled while debouncing. Released before sleep.
    signal: Option<Input<'static>>,
    active_level: WakeLevel,
    timer_us: Option<u64>,
    signal_wake: Option<WakeLevel>,
}

impl EspSoc {
    pub fn new(rtc: Rtc<'static>, signal: Input<'static>, active_level: WakeLevel) -> Self {
        Self {
            rtc,
            signal: Some(signal),
            active_level,
            timer_us: None,
            signal_wake: None,
        }
    }
}

impl DelayNs for EspSoc {
    async fn delay_ns(&mut self, ns: u32) {
        Timer::after(Duration::from_nanos(ns.into())).await;
    }
}

impl Platform for EspSoc {
    fn wake_event(&mut self) -> WakeEvent {
        match esp_hal::rtc_cntl::wakeup_cause() {
            SleepSource::Timer => WakeEvent::TimerExpiry,
            SleepSource::Ext0 => WakeEvent::ExternalSignal,
            _ => WakeEvent::ColdBoot,
        }
    }

    fn signal_line_active(&mut self) -> bool {
        match (&self.signal, self.active_level) {
            (Some(pin), WakeLevel::Low) => pin.is_low(),
            (Some(pin), WakeLevel::High) => pin.is_high(),
            (None, _) => false,
        }
    }

    fn monotonic_ms(&mut self) -> u64 {
        self.rtc.time_since_power_up().as_millis()
    }
}

impl SystemClock for EspSoc {
    fn now(&self) -> DateTime {
        DateTime::from_unix_secs(self.rtc.current_time_us() / 1_000_000)
    }

    fn set(&mut self, value: DateTime) {
        self.rtc.set_current_time_us(value.to_unix_secs() * 1_000_000);
    }
}

impl SleepControl for EspSoc {
    fn arm_timer(&mut self, duration_us: u64) {
        self.timer_us = Some(duration_us);
    }

    fn arm_signal_line(&mut self, level: WakeLevel) {
        self.signal_wake = Some(level);
    }

    fn suspend(&mut self) {
        let Some(duration_us) = self.timer_us else {
            warn!("No sleep duration armed, waking again immediately");
            self.rtc.sleep_deep(&[&TimerWakeupSource::new(CoreDuration::ZERO)]);
        };
        let timer = TimerWakeupSource::new(CoreDuration::from_micros(duration_us));

        let Some(level) = self.signal_wake else {
            self.rtc.sleep_deep(&[&timer]);
        };

        // Drop the Input and reclaim GPIO8 for the ext0 wake source
        self.signal = None;
        // SAFETY: the only other handle to GPIO8 was the Input dropped above
        let pin = unsafe { esp_hal::peripherals::GPIO8::steal() };
        enter_deep_sleep(&mut self.rtc, pin, &timer, level);
    }
}

fn enter_deep_sleep<P: RtcPinWithResistors>(
    rtc: &mut Rtc<'_>,
    pin: P,
    timer: &TimerWakeupSource,
    level: WakeLevel,
) -> ! {
    let (pull_up, wakeup_level) = match level {
        WakeLevel::Low => (true, WakeupLevel::Low),
        WakeLevel::High => (false, WakeupLevel::High),
    };
    pin.rtcio_pullup(pull_up);
    pin.rtcio_pulldown(!pull_up);

    let ext0 = Ext0WakeupSource::new(pin, wakeup_level);
    rtc.sleep_deep(&[timer, &ext0])
}
