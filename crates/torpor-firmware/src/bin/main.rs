#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::{Runner, StackResources};
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::WifiDevice;
use log::{error, info, warn};
use mipidsi::interface::SpiInterface;
use mipidsi::{Builder as MipidsiBuilder, models::ILI9342CRgb565};
use rtt_target::rprintln;
use torpor_core::config::{Config, LOG_LEVEL, NetworkConfig};
use torpor_core::hal::Devices;
use torpor_core::lifecycle::Lifecycle;
use torpor_core::recorder::DiagnosticLogger;
use torpor_core::retained::{RetainedBoot, RetainedState};
use torpor_firmware::board::CoreS3;
use torpor_firmware::console::{RTT_CONSOLE, uptime_ms};
use torpor_firmware::display::{DISPLAY_HEIGHT, DISPLAY_WIDTH, StatusScreen};
use torpor_firmware::hardware;
use torpor_firmware::mk_static;
use torpor_firmware::network_time::SntpClient;
use torpor_firmware::radio::{LinkError, RadioLink, SharedRadio};
use torpor_firmware::rtc::Bm8563;
use torpor_firmware::sensor::Sht40;
use torpor_firmware::shared_i2c::I2cClient;
use torpor_firmware::soc::EspSoc;
use torpor_firmware::store::{FixedTimestamps, SdCardStore};
use torpor_firmware::web::WebConsole;

/// Set in `.env`, see `build.rs`
const WIFI_SSID: &str = match option_env!("TORPOR_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};
const WIFI_PASS: &str = match option_env!("TORPOR_WIFI_PASS") {
    Some(pass) => pass,
    None => "",
};

static LOGGER: DiagnosticLogger = DiagnosticLogger::new();

/// Survives deep sleep; garbage after power-up until claimed
#[esp_hal::ram(unstable(rtc_fast))]
static mut RETAINED: RetainedState = RetainedState::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_print!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // SAFETY: the only access to RETAINED, made once before anything else runs
    let (retained, boot) = unsafe { RetainedState::claim(&raw mut RETAINED) };
    let (record, ring) = retained.split();

    LOGGER.attach_console(&RTT_CONSOLE);
    LOGGER.set_uptime_source(uptime_ms);
    LOGGER.attach_ring(ring);
    if let Err(e) = LOGGER.install(LOG_LEVEL) {
        rprintln!("Logger install failed: {}", e);
    }
    match boot {
        RetainedBoot::Fresh => info!("Retained region initialized"),
        RetainedBoot::Resumed => info!("Retained region resumed"),
    }

    let defaults = Config::device_default();
    let config = Config {
        network: NetworkConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASS,
            ..defaults.network
        },
        ..defaults
    };

    // I2C: power management, clock, sensor
    let i2c_bus = hardware::create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11)
        .expect("400 kHz is a valid I2C configuration");
    let i2c = hardware::share_i2c_bus(i2c_bus);
    hardware::init_power(I2cClient::new(i2c, "AXP2101")).await;

    // SPI: LCD and SD card share the bus
    let spi = hardware::create_spi_bus(
        peripherals.SPI2,
        peripherals.GPIO36,
        peripherals.GPIO37,
        peripherals.GPIO35,
    )
    .expect("default SPI configuration is valid");

    let dc = Output::new(peripherals.GPIO34, Level::Low, OutputConfig::default());
    let spi_buffer = mk_static!([u8; 64], [0u8; 64]);
    let di = SpiInterface::new(hardware::spi_device(spi, peripherals.GPIO3), dc, spi_buffer);
    let lcd = match MipidsiBuilder::new(ILI9342CRgb565, di)
        .display_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .init(&mut embassy_time::Delay)
    {
        Ok(lcd) => Some(lcd),
        Err(_) => {
            error!("Display init failed, continuing without it");
            None
        }
    };
    let sd_card =
        embedded_sdmmc::SdCard::new(hardware::spi_device(spi, peripherals.GPIO4), embassy_time::Delay);

    let (link, runner) = bring_up_radio(peripherals.WIFI, &config.network);
    let radio: &'static SharedRadio = mk_static!(SharedRadio, AsyncMutex::new(link));

    let button = Input::new(
        peripherals.GPIO8,
        InputConfig::default().with_pull(Pull::Up),
    );
    let soc = EspSoc::new(Rtc::new(peripherals.LPWR), button, config.wake.signal_level);

    let devices: Devices<CoreS3> = Devices {
        sensor: Sht40::new(I2cClient::new(i2c, "SHT40")),
        store: SdCardStore::new(sd_card, FixedTimestamps),
        display: StatusScreen::new(lcd),
        interaction: WebConsole::new(radio, config.interactive.idle_timeout_ms),
        rtc: Bm8563::new(I2cClient::new(i2c, "BM8563")),
        network_time: SntpClient::new(radio, config.network.ntp_server),
        soc,
    };
    let mut lifecycle = Lifecycle::new(devices, record, &config).with_recorder(&LOGGER);

    let network = async {
        match runner {
            Some(mut runner) => runner.run().await,
            None => core::future::pending::<()>().await,
        }
    };

    // Deep sleep restarts the chip, so neither side is expected to finish
    match select(network, lifecycle.run()).await {
        Either::First(()) => error!("Network runner stopped"),
        Either::Second(report) => error!("Suspend returned after cycle {}", report.cycle_count),
    }
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

fn bring_up_radio(
    wifi: esp_hal::peripherals::WIFI<'static>,
    network: &NetworkConfig<'static>,
) -> (RadioLink, Option<Runner<'static, WifiDevice<'static>>>) {
    let controller = match esp_radio::init() {
        Ok(controller) => mk_static!(esp_radio::Controller<'static>, controller),
        Err(e) => {
            warn!("Radio init failed: {:?}", e);
            return (RadioLink::disabled(LinkError::Unavailable), None);
        }
    };

    let (wifi_controller, interfaces) = match esp_radio::wifi::new(controller, wifi, Default::default()) {
        Ok(parts) => parts,
        Err(e) => {
            warn!("WiFi controller init failed: {:?}", e);
            return (RadioLink::disabled(LinkError::Unavailable), None);
        }
    };

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );

    (
        RadioLink::new(wifi_controller, stack, network.ssid, network.password),
        Some(runner),
    )
}
