//! WiFi station link shared by network time and the operator page
//!
//! The embassy-net runner is polled by `main` for the whole wake; this type
//! only moves the controller between stopped and associated-with-a-lease.

use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{debug, info, warn};
use thiserror_no_std::Error;

pub type SharedRadio = Mutex<CriticalSectionRawMutex, RadioLink>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("WiFi radio is not available")]
    Unavailable,
    #[error("No WiFi credentials were built in")]
    NoCredentials,
    #[error("WiFi {0} failed")]
    Driver(&'static str),
}

impl LinkError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unavailable => "radio unavailable",
            Self::NoCredentials => "no credentials",
            Self::Driver(step) => step,
        }
    }
}

struct Station {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

pub struct RadioLink {
    station: Result<Station, LinkError>,
    joined: bool,
}

impl RadioLink {
    /// Configure the controller as a station for `ssid`.
    ///
    /// An empty `ssid` leaves the link permanently unavailable.
    pub fn new(
        mut controller: WifiController<'static>,
        stack: Stack<'static>,
        ssid: &str,
        password: &str,
    ) -> Self {
        if ssid.is_empty() {
            warn!("No WiFi credentials built in, network time and the operator page are disabled");
            return Self::disabled(LinkError::NoCredentials);
        }

        let mode = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(ssid.into())
                .with_password(password.into()),
        );
        if let Err(e) = controller.set_config(&mode) {
            warn!("WiFi mode config failed: {:?}", e);
            return Self::disabled(LinkError::Driver("configure"));
        }

        Self {
            station: Ok(Station { controller, stack }),
            joined: false,
        }
    }

    /// A link whose every join fails with `reason`
    pub const fn disabled(reason: LinkError) -> Self {
        Self {
            station: Err(reason),
            joined: false,
        }
    }

    pub fn stack(&self) -> Option<Stack<'static>> {
        self.station.as_ref().ok().map(|station| station.stack)
    }

    /// Start the radio, associate, and wait for a DHCP lease.
    ///
    /// Unbounded; callers wrap it in their own timeout and call
    /// [`leave`](Self::leave) when it fails.
    pub async fn join(&mut self) -> Result<Stack<'static>, LinkError> {
        let station = self.station.as_mut().map_err(|reason| *reason)?;
        if self.joined {
            return Ok(station.stack);
        }

        if !matches!(station.controller.is_started(), Ok(true)) {
            station.controller.start_async().await.map_err(|e| {
                warn!("WiFi start failed: {:?}", e);
                LinkError::Driver("start")
            })?;
        }
        station.controller.connect_async().await.map_err(|e| {
            warn!("WiFi connect failed: {:?}", e);
            LinkError::Driver("connect")
        })?;

        wait_for_ip(station.stack).await;
        self.joined = true;
        Ok(station.stack)
    }

    /// Disconnect and stop the radio to save power
    pub async fn leave(&mut self) {
        let Ok(station) = self.station.as_mut() else {
            return;
        };
        self.joined = false;

        if let Err(e) = station.controller.disconnect_async().await {
            debug!("Disconnect error (may already be disconnected): {:?}", e);
        }
        if let Err(e) = station.controller.stop_async().await {
            debug!("Stop error: {:?}", e);
        }
        debug!("WiFi stopped");
    }
}

async fn wait_for_ip(stack: Stack<'static>) {
    while !stack.is_link_up() {
        Timer::after(Duration::from_millis(100)).await;
    }
    loop {
        if let Some(config) = stack.config_v4() {
            info!("Got IP: {}", config.address);
            return;
        }
        Timer::after(Duration::from_millis(100)).await;
    }
}
