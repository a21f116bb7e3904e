//! Wall-clock reconciliation
//!
//! Three sources can tell the device what time it is, tried in a fixed order:
//! the battery-backed external RTC, the SoC's own clock (which keeps counting
//! through deep sleep), and a network time fetch. Only a network result is
//! ever written back to the external RTC automatically.

mod calendar;
pub mod manual;
pub mod sntp;

pub use calendar::{DateTime, InvalidDateTime, TIME_NOT_SET, TimestampText};

use log::{debug, info, warn};

use crate::config::TimeConfig;
use crate::error::TimeSyncError;
use crate::hal::{ExternalRtc, NetworkTime, SystemClock};

/// A time reading together with whether its source vouches for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCandidate {
    pub value: DateTime,
    pub valid: bool,
}

impl TimeCandidate {
    pub const fn new(value: DateTime, valid: bool) -> Self {
        Self { value, valid }
    }
}

/// Where the system clock got its current value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    ExternalRtc,
    SystemClock,
    Network,
    /// Entered by the operator in the interactive window
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeAuthority {
    min_valid_year: u16,
    network_timeout_ms: u32,
}

impl TimeAuthority {
    pub const fn new(config: &TimeConfig) -> Self {
        Self {
            min_valid_year: config.min_valid_year,
            network_timeout_ms: config.network_timeout_ms,
        }
    }

    /// The validity predicate shared by every source
    pub fn is_valid(&self, value: &DateTime) -> bool {
        value.is_plausible(self.min_valid_year)
    }

    /// Make the system clock trustworthy, or report that nothing could.
    ///
    /// The network is asked at most once per call.
    pub async fn resolve_and_sync<R, C, N>(
        &self,
        rtc: &mut R,
        clock: &mut C,
        network: &mut N,
    ) -> Result<TimeSource, TimeSyncError>
    where
        R: ExternalRtc,
        C: SystemClock,
        N: NetworkTime,
    {
        let rtc_present = rtc.is_present().await;
        if rtc_present {
            match rtc.read_time().await {
                Ok(candidate) if candidate.valid && self.is_valid(&candidate.value) => {
                    clock.set(candidate.value);
                    info!("Time adopted from external RTC: {}", candidate.value);
                    return Ok(TimeSource::ExternalRtc);
                }
                Ok(candidate) => {
                    warn!(
                        "External RTC time {} not trusted (flag valid: {})",
                        candidate.value, candidate.valid
                    );
                }
                Err(e) => warn!("External RTC read failed: {}", e),
            }
        } else {
            debug!("No external RTC present");
        }

        let now = clock.now();
        if self.is_valid(&now) {
            info!("System clock already valid: {}", now);
            return Ok(TimeSource::SystemClock);
        }

        match network.fetch(self.network_timeout_ms).await {
            Ok(value) if self.is_valid(&value) => {
                clock.set(value);
                info!("Time adopted from network: {}", value);
                if rtc_present {
                    if let Err(e) = rtc.write_time(value).await {
                        warn!("Could not write network time to external RTC: {}", e);
                    }
                }
                Ok(TimeSource::Network)
            }
            Ok(value) => {
                warn!("Network time {} fails the validity check", value);
                Err(TimeSyncError::NoSource)
            }
            Err(e) => {
                warn!("Network time unavailable: {}", e);
                Err(TimeSyncError::NoSource)
            }
        }
    }

    /// Adopt an operator-entered time into the system clock and the external RTC.
    pub async fn apply_manual<R, C>(
        &self,
        value: DateTime,
        rtc: &mut R,
        clock: &mut C,
    ) -> Result<(), TimeSyncError>
    where
        R: ExternalRtc,
        C: SystemClock,
    {
        if !self.is_valid(&value) {
            return Err(TimeSyncError::Implausible { year: value.year() });
        }

        clock.set(value);
        info!("Time set manually: {}", value);
        if let Err(e) = rtc.write_time(value).await {
            warn!("Could not write manual time to external RTC: {}", e);
        }
        Ok(())
    }

    /// Current system time as log text, or [`TIME_NOT_SET`]
    pub fn timestamp_text<C: SystemClock>(&self, clock: &C) -> TimestampText {
        let now = clock.now();
        if self.is_valid(&now) {
            now.to_text()
        } else {
            let mut text = TimestampText::new();
            let _ = text.push_str(TIME_NOT_SET);
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeConfig;
    use crate::error::{NetworkTimeError, RtcError};
    use crate::testing::{MockClock, MockNetworkTime, MockRtc};
    use embassy_futures::block_on;

    fn authority() -> TimeAuthority {
        TimeAuthority::new(&TimeConfig::device_default())
    }

    fn at(year: u16) -> DateTime {
        DateTime::new(year, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn valid_rtc_is_adopted_without_write_back() {
        let mut rtc = MockRtc::with_time(at(2025), true);
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::answering(at(2026));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Ok(TimeSource::ExternalRtc));
        assert_eq!(clock.now(), at(2025));
        assert!(rtc.writes.is_empty());
        assert_eq!(network.fetches, 0);
    }

    #[test]
    fn rtc_year_at_threshold_falls_through_to_clock() {
        let mut rtc = MockRtc::with_time(at(2023), true);
        let mut clock = MockClock::at(at(2025));
        let mut network = MockNetworkTime::answering(at(2026));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Ok(TimeSource::SystemClock));
        assert_eq!(clock.now(), at(2025));
        assert_eq!(clock.sets, 0);
        assert_eq!(network.fetches, 0);
    }

    #[test]
    fn rtc_that_lost_power_is_not_trusted() {
        let mut rtc = MockRtc::with_time(at(2025), false);
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::answering(at(2026));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Ok(TimeSource::Network));
        assert_eq!(clock.now(), at(2026));
    }

    #[test]
    fn network_adoption_writes_rtc_exactly_once() {
        let mut rtc = MockRtc::with_time(DateTime::EPOCH, true);
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::answering(at(2026));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Ok(TimeSource::Network));
        assert_eq!(rtc.writes.as_slice(), &[at(2026)]);
        assert_eq!(network.fetches, 1);
        assert_eq!(
            network.last_timeout_ms,
            Some(TimeConfig::device_default().network_timeout_ms)
        );
    }

    #[test]
    fn missing_rtc_is_skipped_on_network_adoption() {
        let mut rtc = MockRtc::absent();
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::answering(at(2026));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Ok(TimeSource::Network));
        assert_eq!(rtc.reads, 0);
        assert_eq!(rtc.write_attempts, 0);
        assert_eq!(clock.now(), at(2026));
    }

    #[test]
    fn rtc_write_failure_does_not_undo_network_adoption() {
        let mut rtc = MockRtc::with_time(DateTime::EPOCH, true);
        rtc.fail_writes = Some(RtcError::Bus { operation: "write" });
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::answering(at(2026));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Ok(TimeSource::Network));
        assert_eq!(clock.now(), at(2026));
    }

    #[test]
    fn every_source_failing_reports_no_source() {
        let mut rtc = MockRtc::absent();
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::failing(NetworkTimeError::Timeout { timeout_ms: 10_000 });

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Err(TimeSyncError::NoSource));
        assert_eq!(network.fetches, 1);
        assert_eq!(clock.sets, 0);
        assert_eq!(
            authority().timestamp_text(&clock).as_str(),
            TIME_NOT_SET
        );
    }

    #[test]
    fn implausible_network_answer_is_rejected() {
        let mut rtc = MockRtc::absent();
        let mut clock = MockClock::unset();
        let mut network = MockNetworkTime::answering(at(2001));

        let source = block_on(authority().resolve_and_sync(&mut rtc, &mut clock, &mut network));

        assert_eq!(source, Err(TimeSyncError::NoSource));
        assert!(rtc.writes.is_empty());
    }

    #[test]
    fn manual_time_sets_clock_and_rtc() {
        let mut rtc = MockRtc::with_time(DateTime::EPOCH, true);
        let mut clock = MockClock::unset();

        let result = block_on(authority().apply_manual(at(2025), &mut rtc, &mut clock));

        assert_eq!(result, Ok(()));
        assert_eq!(clock.now(), at(2025));
        assert_eq!(rtc.writes.as_slice(), &[at(2025)]);
        assert_eq!(
            authority().timestamp_text(&clock).as_str(),
            "2025-06-01 12:00:00"
        );
    }

    #[test]
    fn implausible_manual_time_writes_nothing() {
        let mut rtc = MockRtc::with_time(DateTime::EPOCH, true);
        let mut clock = MockClock::unset();

        let result = block_on(authority().apply_manual(at(2020), &mut rtc, &mut clock));

        assert_eq!(result, Err(TimeSyncError::Implausible { year: 2020 }));
        assert_eq!(clock.sets, 0);
        assert!(rtc.writes.is_empty());
    }
}
