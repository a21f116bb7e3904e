//! Virtual time
//!
//! World time never resets; uptime restarts at every power-on. Delays and
//! sleeps advance the world clock instantly instead of waiting. A cycle runs
//! on one thread, so the clock is thread-local.

use std::cell::Cell;

thread_local! {
    static WORLD_US: Cell<u64> = const { Cell::new(0) };
    static POWERED_AT_US: Cell<u64> = const { Cell::new(0) };
}

pub fn start(world_us: u64, powered_at_us: u64) {
    WORLD_US.set(world_us);
    POWERED_AT_US.set(powered_at_us);
}

pub fn advance_us(us: u64) {
    WORLD_US.set(WORLD_US.get().saturating_add(us));
}

pub fn world_us() -> u64 {
    WORLD_US.get()
}

pub fn world_secs() -> i64 {
    i64::try_from(world_us() / 1_000_000).unwrap_or(i64::MAX)
}

pub fn uptime_us() -> u64 {
    world_us().saturating_sub(POWERED_AT_US.get())
}

/// Also the logger's uptime source
pub fn uptime_ms() -> u64 {
    uptime_us() / 1000
}
