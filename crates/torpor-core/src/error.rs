//! Error types for every collaborator boundary
//!
//! None of these are fatal to a wake cycle. The lifecycle logs them and
//! degrades the affected feature until the next wake.

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} is not present")]
    NotPresent { sensor: &'static str },
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} returned a reading outside its range")]
    InvalidReading { sensor: &'static str },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("Log store is not mounted")]
    NotMounted,
    #[error("Log store failed to {operation}")]
    Io { operation: &'static str },
    #[error("Log row does not fit its buffer")]
    RowTooLong,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Display is not present")]
    NotPresent,
    #[error("Display draw failed")]
    Draw,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionError {
    #[error("Radio bring-up failed: {0}")]
    Radio(&'static str),
    #[error("Interaction service failed to start: {0}")]
    Service(&'static str),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    #[error("External RTC is not present")]
    NotPresent,
    #[error("External RTC bus error during {operation}")]
    Bus { operation: &'static str },
    #[error("External RTC holds a malformed date")]
    Malformed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTimeError {
    #[error("Network link could not be established")]
    Link,
    #[error("Time server name could not be resolved")]
    Dns,
    #[error("No time server response within {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },
    #[error("Time server response rejected: {0}")]
    BadResponse(&'static str),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncError {
    #[error("No trustworthy time source available")]
    NoSource,
    #[error("Time with year {year} fails the validity check")]
    Implausible { year: u16 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Retained snapshot could not be encoded")]
    Encode,
    #[error("Retained snapshot could not be decoded")]
    Decode,
    #[error("Retained snapshot header does not match this firmware")]
    Header,
}
