//! Retained diagnostic recorder
//!
//! A circular text log that lives in retained memory next to the cycle
//! record, so the history of previous wakes can be replayed once a console is
//! attached again. [`DiagnosticLogger`] is the `log` backend that feeds it.

mod logger;
mod ring;

pub use logger::{ConsoleSink, DiagnosticLogger, RetainedRing, RingUsage};
pub use ring::{DiagnosticRing, Replay};
