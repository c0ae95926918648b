//! Time handling for the control loop
//!
//! Two clock domains are used:
//! - Milliseconds since boot ([`Timestamp`]) for tick cadences, measurement
//!   windows, trip and dwell timing
//! - A free-running 32-bit hardware microsecond counter for edge debounce in
//!   the ISR (see [`crate::pulse`]), immune to task scheduling jitter
//!
//! Intervals are compared as `fugit` durations so units cannot be mixed up.

use core::cell::Cell;

use fugit::MillisDurationU64;

/// Timestamp in milliseconds since device boot
pub type Timestamp = u64;

/// Source of time for the system
pub trait TimeSource {
    /// Current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Current time in microseconds, used to pace ADC sampling
    ///
    /// Defaults to the millisecond clock scaled up, which is good enough for
    /// sources without a finer timer.
    fn now_micros(&self) -> u64 {
        self.now().saturating_mul(1000)
    }
}

/// Time elapsed from `since` to `now`, saturating at zero if the clock went backwards
pub fn elapsed(since: Timestamp, now: Timestamp) -> MillisDurationU64 {
    MillisDurationU64::millis(now.saturating_sub(since))
}

/// System time source (requires std)
///
/// Milliseconds since the source was created, from the monotonic clock.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct SystemTime {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemTime {
    /// Start counting from now
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for SystemTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_millis() as Timestamp
    }

    fn now_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Hand-driven time source for testing and simulation
///
/// Frozen unless moved explicitly. A stepping clock also advances by a
/// fixed amount on every [`TimeSource::now_micros`] read, which lets
/// blocking loops that spin on the clock terminate.
#[derive(Debug, Clone)]
pub struct FixedTime {
    micros: Cell<u64>,
    step_us: u64,
}

impl FixedTime {
    /// Clock frozen at `timestamp` milliseconds
    pub fn new(timestamp: Timestamp) -> Self {
        Self::stepping(timestamp, 0)
    }

    /// Clock starting at `timestamp` milliseconds, moving `step_us` per microsecond read
    pub fn stepping(timestamp: Timestamp, step_us: u64) -> Self {
        Self { micros: Cell::new(timestamp.saturating_mul(1000)), step_us }
    }

    /// Jump to an absolute time in milliseconds
    pub fn set(&self, timestamp: Timestamp) {
        self.micros.set(timestamp.saturating_mul(1000));
    }

    /// Move forward by `ms` milliseconds
    pub fn advance(&self, ms: u64) {
        self.advance_micros(ms.saturating_mul(1000));
    }

    /// Move forward by `us` microseconds
    pub fn advance_micros(&self, us: u64) {
        self.micros.set(self.micros.get().saturating_add(us));
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.micros.get() / 1000
    }

    fn now_micros(&self) -> u64 {
        let now = self.micros.get();
        self.advance_micros(self.step_us);
        now
    }
}
