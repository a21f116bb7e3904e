//! RTT console for the diagnostic logger

use torpor_core::recorder::ConsoleSink;

pub struct RttConsole;

impl ConsoleSink for RttConsole {
    fn write_str(&self, text: &str) {
        rtt_target::rprint!("{}", text);
    }
}

pub static RTT_CONSOLE: RttConsole = RttConsole;

/// Milliseconds since this wake, for log line prefixes
pub fn uptime_ms() -> u64 {
    embassy_time::Instant::now().as_millis()
}
