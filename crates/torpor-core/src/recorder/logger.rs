use core::cell::RefCell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicI32, Ordering};

use critical_section::Mutex;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use super::ring::DiagnosticRing;
use crate::config::{DIAGNOSTIC_RING_CAPACITY, LOG_LINE_CAPACITY, RING_LEVEL};

/// The ring as it is laid out in retained memory
pub type RetainedRing = DiagnosticRing<DIAGNOSTIC_RING_CAPACITY>;

/// Where log lines go while a console is attached (RTT, stderr).
pub trait ConsoleSink: Sync {
    fn write_str(&self, text: &str);

    fn flush(&self) {}
}

/// Fill state of the attached ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingUsage {
    pub used: usize,
    pub capacity: usize,
    pub wrapped: bool,
}

struct Attachments {
    ring: Option<&'static mut RetainedRing>,
    console: Option<&'static dyn ConsoleSink>,
    uptime_ms: fn() -> u64,
    level: LevelFilter,
    ring_level: LevelFilter,
}

/// `log` backend that tees every line into the retained ring.
///
/// Lines look like `[#12 00:00:01.250] [INFO] [torpor_core::time] message`,
/// where `#12` is the suspend cycle the line was written in.
pub struct DiagnosticLogger {
    state: Mutex<RefCell<Attachments>>,
    cycle: AtomicI32,
}

fn no_uptime() -> u64 {
    0
}

impl DiagnosticLogger {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(Attachments {
                ring: None,
                console: None,
                uptime_ms: no_uptime,
                level: LevelFilter::Info,
                ring_level: RING_LEVEL,
            })),
            cycle: AtomicI32::new(0),
        }
    }

    /// Register as the global logger. Only the first call in a process succeeds.
    pub fn install(&'static self, level: LevelFilter) -> Result<(), SetLoggerError> {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).level = level);
        log::set_logger(self)?;
        log::set_max_level(level);
        Ok(())
    }

    pub fn attach_console(&self, console: &'static dyn ConsoleSink) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).console = Some(console));
    }

    pub fn set_uptime_source(&self, uptime_ms: fn() -> u64) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).uptime_ms = uptime_ms);
    }

    pub fn attach_ring(&self, ring: &'static mut RetainedRing) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).ring = Some(ring));
    }

    /// Hand the ring back, e.g. to snapshot it at the end of a cycle
    pub fn detach_ring(&self) -> Option<&'static mut RetainedRing> {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).ring.take())
    }

    /// Records more verbose than `level` reach the console only
    pub fn set_ring_level(&self, level: LevelFilter) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).ring_level = level);
    }

    pub fn set_cycle(&self, cycle: i32) {
        self.cycle.store(cycle, Ordering::Relaxed);
    }

    pub fn ring_usage(&self) -> Option<RingUsage> {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .ring
                .as_deref()
                .map(|ring| RingUsage {
                    used: ring.len(),
                    capacity: ring.capacity(),
                    wrapped: ring.is_wrapped(),
                })
        })
    }

    /// Write the retained history to the console, oldest line first.
    ///
    /// Returns the number of lines written, `None` without a ring or console.
    pub fn replay_to_console(&self) -> Option<usize> {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            let ring = state.ring.as_deref()?;
            let console = state.console?;

            console.write_str("==== retained log ====\n");
            let lines = ring.replay().for_each_line(|line| {
                write_utf8_prefix(console, line);
                console.write_str("\n");
            });
            console.write_str("==== end retained log ====\n");
            console.flush();
            Some(lines)
        })
    }

    fn format(&self, record: &Record, uptime_ms: u64) -> LineBuffer {
        let mut line = LineBuffer::new();
        let secs = uptime_ms / 1000;
        let _ = write!(
            line,
            "[#{} {:02}:{:02}:{:02}.{:03}] [{}] [{}] {}",
            self.cycle.load(Ordering::Relaxed),
            (secs / 3600) % 100,
            (secs / 60) % 60,
            secs % 60,
            uptime_ms % 1000,
            record.level(),
            record.module_path().unwrap_or(record.target()),
            record.args()
        );
        line.terminate();
        line
    }
}

impl Default for DiagnosticLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for DiagnosticLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let level = critical_section::with(|cs| self.state.borrow_ref(cs).level);
        metadata.level() <= level
    }

    fn log(&self, record: &Record) {
        let (console, uptime_ms, level, ring_level) = critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            (state.console, state.uptime_ms, state.level, state.ring_level)
        });
        if record.level() > level {
            return;
        }

        let line = self.format(record, uptime_ms());

        if let Some(console) = console {
            console.write_str(line.as_str());
        }
        if record.level() > ring_level {
            return;
        }
        critical_section::with(|cs| {
            if let Some(ring) = self.state.borrow_ref_mut(cs).ring.as_deref_mut() {
                ring.append(line.as_str().as_bytes());
            }
        });
    }

    fn flush(&self) {
        let console = critical_section::with(|cs| self.state.borrow_ref(cs).console);
        if let Some(console) = console {
            console.flush();
        }
    }
}

fn write_utf8_prefix(console: &dyn ConsoleSink, bytes: &[u8]) {
    match core::str::from_utf8(bytes) {
        Ok(text) => console.write_str(text),
        Err(e) => {
            if let Ok(text) = core::str::from_utf8(&bytes[..e.valid_up_to()]) {
                console.write_str(text);
            }
        }
    }
}

/// One formatted line. Overflowing text is dropped, the newline always fits.
struct LineBuffer {
    text: heapless::String<LOG_LINE_CAPACITY>,
}

impl LineBuffer {
    fn new() -> Self {
        Self {
            text: heapless::String::new(),
        }
    }

    fn terminate(&mut self) {
        let _ = self.text.push('\n');
    }

    fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.text.len() + c.len_utf8() > LOG_LINE_CAPACITY - 1 {
                break;
            }
            let _ = self.text.push(c);
        }
        Ok(())
    }
}
