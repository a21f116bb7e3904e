//! State that survives deep sleep
//!
//! On the device [`RetainedState`] sits in RTC fast memory and is the only
//! thing carried from one wake to the next. A magic/version header tells a
//! resumed image apart from whatever a cold power-up left in that memory.

use alloc::vec::Vec;
use core::ptr;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::hal::Reading;
use crate::recorder::RetainedRing;
use crate::time::TimestampText;

/// "TORP"
pub const RETAINED_MAGIC: u32 = 0x544F_5250;
/// Bump whenever the layout of [`RetainedState`] changes
pub const RETAINED_VERSION: u16 = 1;

/// What the lifecycle remembers between wakes.
///
/// The three last-log fields only change together, through
/// [`record_success`](Self::record_success).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CycleRecord {
    last_logged_at_ms: u64,
    suspend_cycle_count: i32,
    last_reading: Reading,
    last_log_timestamp: TimestampText,
}

impl CycleRecord {
    pub const fn new() -> Self {
        Self {
            last_logged_at_ms: 0,
            suspend_cycle_count: 0,
            last_reading: Reading::UNSET,
            last_log_timestamp: TimestampText::new(),
        }
    }

    pub fn last_logged_at_ms(&self) -> u64 {
        self.last_logged_at_ms
    }

    pub fn suspend_cycle_count(&self) -> i32 {
        self.suspend_cycle_count
    }

    pub fn last_reading(&self) -> &Reading {
        &self.last_reading
    }

    pub fn last_log_timestamp(&self) -> &str {
        self.last_log_timestamp.as_str()
    }

    /// Commit a persisted sample. Call only after the store write succeeded.
    pub fn record_success(&mut self, at_ms: u64, reading: Reading, timestamp: &str) {
        let mut text = TimestampText::new();
        for c in timestamp.chars() {
            if text.push(c).is_err() {
                break;
            }
        }

        self.last_logged_at_ms = at_ms;
        self.last_reading = reading;
        self.last_log_timestamp = text;
    }

    /// Count one finished cycle, wrapping on overflow
    pub fn complete_cycle(&mut self) -> i32 {
        self.suspend_cycle_count = self.suspend_cycle_count.wrapping_add(1);
        self.suspend_cycle_count
    }
}

impl Default for CycleRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// How [`RetainedState::claim`] found the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainedBoot {
    /// Header did not match; the region was re-initialized
    Fresh,
    Resumed,
}

#[repr(C)]
#[derive(Debug)]
pub struct RetainedState {
    magic: u32,
    version: u16,
    pub cycle: CycleRecord,
    pub diagnostics: RetainedRing,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    magic: u32,
    version: u16,
    cycle: &'a CycleRecord,
    diagnostics: &'a RetainedRing,
}

#[derive(Deserialize)]
struct Snapshot {
    magic: u32,
    version: u16,
    cycle: CycleRecord,
    diagnostics: RetainedRing,
}

impl RetainedState {
    pub const fn new() -> Self {
        Self {
            magic: RETAINED_MAGIC,
            version: RETAINED_VERSION,
            cycle: CycleRecord::new(),
            diagnostics: RetainedRing::new(),
        }
    }

    pub fn has_valid_header(&self) -> bool {
        self.magic == RETAINED_MAGIC && self.version == RETAINED_VERSION
    }

    /// Borrow the two halves separately: the lifecycle owns the cycle
    /// record, the logger owns the ring.
    pub fn split(&mut self) -> (&mut CycleRecord, &mut RetainedRing) {
        (&mut self.cycle, &mut self.diagnostics)
    }

    /// Take ownership of the retained region at `slot`.
    ///
    /// Only the header is read before it is validated. A mismatch rewrites
    /// the whole region with [`RetainedState::new`].
    ///
    /// # Safety
    ///
    /// `slot` must be valid for reads and writes of one `RetainedState`,
    /// properly aligned, and not aliased for the lifetime `'a`. If the header
    /// matches, the rest of the region must hold a value previously written
    /// through this type.
    pub unsafe fn claim<'a>(slot: *mut Self) -> (&'a mut Self, RetainedBoot) {
        let (magic, version) = unsafe {
            (
                ptr::read_volatile(ptr::addr_of!((*slot).magic)),
                ptr::read_volatile(ptr::addr_of!((*slot).version)),
            )
        };

        if magic != RETAINED_MAGIC || version != RETAINED_VERSION {
            unsafe { slot.write(Self::new()) };
            return (unsafe { &mut *slot }, RetainedBoot::Fresh);
        }

        let state = unsafe { &mut *slot };
        if !state.diagnostics.is_consistent() {
            state.diagnostics.clear();
        }
        (state, RetainedBoot::Resumed)
    }

    /// Serialize both halves while they are borrowed out separately
    pub fn encode_snapshot(
        cycle: &CycleRecord,
        diagnostics: &RetainedRing,
    ) -> Result<Vec<u8>, SnapshotError> {
        postcard::to_allocvec(&SnapshotRef {
            magic: RETAINED_MAGIC,
            version: RETAINED_VERSION,
            cycle,
            diagnostics,
        })
        .map_err(|_| SnapshotError::Encode)
    }

    pub fn to_snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        Self::encode_snapshot(&self.cycle, &self.diagnostics)
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = postcard::from_bytes(bytes).map_err(|_| SnapshotError::Decode)?;
        if snapshot.magic != RETAINED_MAGIC || snapshot.version != RETAINED_VERSION {
            return Err(SnapshotError::Header);
        }

        let mut state = Self {
            magic: snapshot.magic,
            version: snapshot.version,
            cycle: snapshot.cycle,
            diagnostics: snapshot.diagnostics,
        };
        if !state.diagnostics.is_consistent() {
            state.diagnostics.clear();
        }
        Ok(state)
    }
}

impl Default for RetainedState {
    fn default() -> Self {
        Self::new()
    }
}
