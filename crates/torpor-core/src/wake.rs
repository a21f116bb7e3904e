//! Wake cause classification and signal line debouncing

use embedded_hal_async::delay::DelayNs;

use crate::config::WakeConfig;
use crate::hal::Platform;

/// Why this cycle started. Decoded fresh from hardware on every wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeEvent {
    /// Power-on or any cause that is not a configured wake source
    ColdBoot,
    TimerExpiry,
    ExternalSignal,
}

impl WakeEvent {
    pub fn label(&self) -> &'static str {
        match self {
            WakeEvent::ColdBoot => "cold boot",
            WakeEvent::TimerExpiry => "timer",
            WakeEvent::ExternalSignal => "external signal",
        }
    }
}

/// Whether this wake should open the interactive window after logging
pub fn stay_awake(event: WakeEvent, config: &WakeConfig) -> bool {
    match event {
        WakeEvent::ExternalSignal | WakeEvent::ColdBoot => true,
        WakeEvent::TimerExpiry => config.stay_awake_on_timer,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounce {
    Released { waited_ms: u32 },
    /// Gave up after the configured maximum with the line still asserted
    StillHeld { waited_ms: u32 },
}

/// Poll the signal line until it is released, bounded by `debounce_max_ms`.
pub async fn debounce<P: Platform>(platform: &mut P, config: &WakeConfig) -> Debounce {
    let poll_ms = config.debounce_poll_ms.max(1);
    let mut waited_ms = 0u32;

    while platform.signal_line_active() {
        if waited_ms >= config.debounce_max_ms {
            return Debounce::StillHeld { waited_ms };
        }
        DelayNs::delay_ms(platform, poll_ms).await;
        waited_ms = waited_ms.saturating_add(poll_ms);
    }

    Debounce::Released { waited_ms }
}
