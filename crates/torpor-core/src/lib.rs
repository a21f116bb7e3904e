//! Hardware-independent core library for torpor
//!
//! torpor is a battery-powered temperature/humidity logger that spends almost
//! all of its life in deep sleep. Every wake-up is a fresh process start: the
//! only state that survives is a small retained memory region. This crate holds
//! everything that has to be correct across that discontinuity:
//!
//! - [`retained`]: the layout of the retained region and its cold-boot check
//! - [`recorder`]: the circular diagnostic log kept inside that region
//! - [`time`]: reconciliation of the external RTC, the device clock and network time
//! - [`schedule`]: sleep duration math and wake source programming
//! - [`lifecycle`]: the per-wake state machine composing all of the above
//! - [`datalog`]: the CSV row format every sample store writes
//! - [`page`]: the interaction window's home page
//!
//! Hardware is reached only through the capability traits in [`hal`], so the
//! crate is `#![no_std]` with `extern crate alloc` and builds both for the
//! ESP32-S3 firmware and for desktop hosts (the simulator and the tests).

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod datalog;
pub mod error;
pub mod hal;
pub mod lifecycle;
pub mod page;
pub mod recorder;
pub mod retained;
pub mod schedule;
pub mod time;
pub mod wake;

#[cfg(test)]
mod testing;
