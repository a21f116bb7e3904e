//! One wake cycle, run inside its own process
//!
//! Loads what survived the last suspend, runs the lifecycle to suspend,
//! then persists the retained image and the hardware state with the
//! virtual clock moved past the planned sleep.

use std::io;

use embassy_futures::block_on;
use log::{info, warn};
use torpor_core::config::Config;
use torpor_core::hal::Devices;
use torpor_core::lifecycle::Lifecycle;
use torpor_core::recorder::DiagnosticLogger;
use torpor_core::retained::{RetainedBoot, RetainedState};
use torpor_core::time::DateTime;
use torpor_core::wake::WakeEvent;

use crate::board::{
    ConsoleDisplay, CsvStore, HostNetworkTime, STDERR_CONSOLE, SimOperator, SimRtc, SimSensor,
    SimSoc, Simulated,
};
use crate::clock;
use crate::options::Options;
use crate::state::{self, DATALOG_FILE, PendingWake};

static LOGGER: DiagnosticLogger = DiagnosticLogger::new();

/// Every fourth wake is the operator pressing the button
const SIGNAL_WAKE_EVERY: u32 = 4;

pub fn run(options: &Options) -> io::Result<()> {
    let dir = options.state_dir.as_path();
    let mut hardware = state::load_hardware(dir);
    let image = state::load_retained(dir);

    let power_on = options.cold_boot || hardware.wake == PendingWake::PowerOn || image.is_none();
    if power_on {
        hardware.powered_at_us = hardware.world_us;
        hardware.system_offset_secs = None;
    }
    clock::start(hardware.world_us, hardware.powered_at_us);

    let slot: *mut RetainedState = match image {
        Some(image) if !power_on => Box::into_raw(Box::new(image)),
        // RTC memory after power-on: zeroes, so the header check fails
        _ => Box::into_raw(Box::<RetainedState>::new_zeroed()).cast(),
    };
    // SAFETY: `slot` is a leaked, aligned allocation nothing else references.
    // Zeroed memory is only read through the header fields before rewrite.
    let (retained, boot) = unsafe { RetainedState::claim(slot) };
    let (record, ring) = retained.split();

    LOGGER.attach_console(&STDERR_CONSOLE);
    LOGGER.set_uptime_source(clock::uptime_ms);
    LOGGER.attach_ring(ring);
    LOGGER.set_cycle(record.suspend_cycle_count());
    LOGGER
        .install(options.level)
        .map_err(|e| io::Error::other(e.to_string()))?;

    match boot {
        RetainedBoot::Fresh => info!("Retained region initialized"),
        RetainedBoot::Resumed => info!("Retained region resumed"),
    }

    let wake = match hardware.wake {
        _ if power_on => WakeEvent::ColdBoot,
        PendingWake::Timer => WakeEvent::TimerExpiry,
        PendingWake::Signal => WakeEvent::ExternalSignal,
        PendingWake::PowerOn => WakeEvent::ColdBoot,
    };

    let time_entry = options.set_time.as_deref().and_then(|text| {
        match text.parse::<DateTime>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparsable operator time {:?}", text);
                None
            }
        }
    });

    let mut config = Config::device_default();
    config.interactive.idle_timeout_ms = options.idle_ms;
    config.network.ssid = "simulated";

    let devices: Devices<Simulated> = Devices {
        sensor: SimSensor::new(options.sensor_fail),
        store: CsvStore::new(dir.join(DATALOG_FILE)),
        display: ConsoleDisplay::default(),
        interaction: SimOperator::new(dir, time_entry, options.idle_ms),
        rtc: SimRtc::new(!options.no_rtc, hardware.rtc_offset_secs),
        network_time: HostNetworkTime::new(options.offline),
        soc: SimSoc::new(wake, hardware.system_offset_secs),
    };

    let mut lifecycle = Lifecycle::new(devices, &mut *record, &config).with_recorder(&LOGGER);
    let report = block_on(lifecycle.run());
    let devices = lifecycle.into_devices();

    if !devices.soc.suspended {
        warn!("Cycle ended without a suspend request");
    }

    hardware.wakes = hardware.wakes.wrapping_add(1);
    let sleep_us = devices.soc.armed_timer_us.unwrap_or(0);
    let button_due = hardware.wakes % SIGNAL_WAKE_EVERY == SIGNAL_WAKE_EVERY - 1;
    // A button press cuts the sleep short
    let (next, slept_us) = if button_due && devices.soc.armed_signal.is_some() {
        (PendingWake::Signal, sleep_us / 2)
    } else {
        (PendingWake::Timer, sleep_us)
    };
    info!(
        "Cycle {} suspended, next wake by {:?} after {} ms",
        report.cycle_count,
        next,
        slept_us / 1000
    );

    let ring = LOGGER
        .detach_ring()
        .ok_or_else(|| io::Error::other("diagnostic ring was not attached"))?;
    let image = RetainedState::encode_snapshot(record, ring)
        .map_err(|e| io::Error::other(e.to_string()))?;
    state::save_retained(dir, &image)?;

    hardware.system_offset_secs = devices.soc.system_offset_secs();
    hardware.rtc_offset_secs = devices.rtc.offset_secs();
    hardware.world_us = clock::world_us().saturating_add(slept_us);
    hardware.wake = next;
    state::save_hardware(dir, &hardware)
}
