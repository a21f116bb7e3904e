//! Sleep duration math and deep sleep entry
//!
//! All arithmetic is signed: an overdue cycle produces a negative request,
//! which the floor then replaces with the safe default before anything
//! reaches the hardware.

use log::{Log, debug, warn};

use crate::config::ScheduleConfig;
use crate::hal::{SleepControl, WakeLevel};

/// Microseconds until the next sample is due.
///
/// `(interval - overhead - (now - last)) * 1000`, saturating at the `i64`
/// bounds. Negative when the cycle overran the interval.
pub fn compute_sleep_us(
    last_logged_at_ms: u64,
    now_ms: u64,
    wakeup_overhead_ms: u64,
    log_interval_ms: u64,
) -> i64 {
    let elapsed_ms = (now_ms as i128) - (last_logged_at_ms as i128);
    let remaining_ms = (log_interval_ms as i128) - (wakeup_overhead_ms as i128) - elapsed_ms;
    let remaining_us = remaining_ms.saturating_mul(1000);
    remaining_us.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// The decision for one suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub requested_us: i64,
    pub effective_us: u64,
    /// The request was below the floor and was replaced
    pub substituted: bool,
}

impl SleepPlan {
    /// Apply the floor: anything under `min_sleep_us` becomes
    /// `safe_default_sleep_us`.
    pub fn new(requested_us: i64, config: &ScheduleConfig) -> Self {
        if requested_us < config.min_sleep_us {
            Self {
                requested_us,
                effective_us: config.safe_default_sleep_us,
                substituted: true,
            }
        } else {
            Self {
                requested_us,
                effective_us: requested_us as u64,
                substituted: false,
            }
        }
    }

    /// Plan for this cycle from the retained last-log time.
    ///
    /// A `now_ms` behind `last_logged_at_ms` means the monotonic clock started
    /// over, so the result is capped at one full interval.
    pub fn for_cycle(last_logged_at_ms: u64, now_ms: u64, config: &ScheduleConfig) -> Self {
        let mut plan = Self::new(
            compute_sleep_us(
                last_logged_at_ms,
                now_ms,
                config.wakeup_overhead_ms,
                config.log_interval_ms,
            ),
            config,
        );

        let ceiling_us = config.log_interval_ms.saturating_mul(1000);
        if now_ms < last_logged_at_ms && plan.effective_us > ceiling_us {
            warn!(
                "Monotonic clock went backwards ({} ms < {} ms), capping sleep",
                now_ms, last_logged_at_ms
            );
            plan.effective_us = ceiling_us.max(config.safe_default_sleep_us);
        }

        plan
    }
}

/// Program both wake sources and enter deep sleep.
///
/// The timer gets the floored duration, the external signal line is armed at
/// `signal_level`, and pending log output is flushed before the jump. On
/// hardware this does not return.
pub fn suspend<S: SleepControl>(
    sleep: &mut S,
    requested_us: i64,
    config: &ScheduleConfig,
    signal_level: WakeLevel,
) -> SleepPlan {
    let plan = SleepPlan::new(requested_us, config);
    enter(sleep, plan, signal_level, log::logger());
    plan
}

/// `output` is flushed after both wake sources are armed and before
/// `suspend`, so the last lines reach the console.
pub(crate) fn enter<S: SleepControl>(
    sleep: &mut S,
    plan: SleepPlan,
    signal_level: WakeLevel,
    output: &dyn Log,
) {
    if plan.substituted {
        warn!(
            "Requested sleep {} us below floor, using {} us",
            plan.requested_us, plan.effective_us
        );
    }

    sleep.arm_timer(plan.effective_us);
    sleep.arm_signal_line(signal_level);
    debug!("Entering deep sleep for {} us", plan.effective_us);

    output.flush();
    sleep.suspend();
}
