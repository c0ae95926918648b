//! Interrupt-fed edge counters
//!
//! The edge ISR calls [`PulseCounter::record_edge`] with the free-running
//! 32-bit hardware microsecond timer; the acquisition task drains the count
//! once per measurement window. Both sides take the same short critical
//! section, so a drain can never interleave with an increment.
//!
//! ```text
//!  ISR:   record_edge(t) ── t - last >= debounce ? count += 1 : rejected += 1
//!                                   │
//!  task:  RateWindow::sample ── window elapsed ? drain() (read-and-zero) : hold
//! ```
//!
//! The ISR side does no allocation, no blocking and no logging.

use core::cell::Cell;

use critical_section::Mutex;
use fugit::{MicrosDurationU32, MillisDurationU64};

use crate::config::CalibrationConfig;
use crate::time::{elapsed, Timestamp};

#[derive(Debug, Clone, Copy)]
struct EdgeState {
    count: u32,
    rejected: u32,
    last_edge_us: Option<u32>,
}

impl EdgeState {
    const fn new() -> Self {
        Self { count: 0, rejected: 0, last_edge_us: None }
    }
}

/// Debounced edge counter shared between the ISR and the acquisition task
pub struct PulseCounter {
    debounce: MicrosDurationU32,
    state: Mutex<Cell<EdgeState>>,
}

impl PulseCounter {
    /// Counter accepting edges at least `debounce` apart
    pub const fn new(debounce: MicrosDurationU32) -> Self {
        Self {
            debounce,
            state: Mutex::new(Cell::new(EdgeState::new())),
        }
    }

    /// Register an edge seen at hardware time `now_us`
    ///
    /// Returns `false` when the edge fell inside the debounce interval. The
    /// timer is allowed to wrap; the first edge is always accepted, and so
    /// is the first edge after an empty window (see [`Self::drain`]).
    pub fn record_edge(&self, now_us: u32) -> bool {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();

            let accepted = match state.last_edge_us {
                None => true,
                Some(last) => now_us.wrapping_sub(last) >= self.debounce.ticks(),
            };

            if accepted {
                state.count = state.count.wrapping_add(1);
                state.last_edge_us = Some(now_us);
            } else {
                state.rejected = state.rejected.wrapping_add(1);
            }

            cell.set(state);
            accepted
        })
    }

    /// Accepted edges since the previous drain, resetting the count
    ///
    /// An empty window also forgets the last edge time: it is at least one
    /// window old, longer than the debounce, and after a long calm the
    /// 32-bit timer may have wrapped past it.
    pub fn drain(&self) -> u32 {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            let count = state.count;
            state.count = 0;
            if count == 0 {
                state.last_edge_us = None;
            }
            cell.set(state);
            count
        })
    }

    /// Accepted edges waiting for the next drain
    pub fn pending(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow(cs).get().count)
    }

    /// Edges discarded by the debounce since boot
    pub fn rejected(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow(cs).get().rejected)
    }

    /// Configured debounce interval
    pub fn debounce(&self) -> MicrosDurationU32 {
        self.debounce
    }
}

/// The two edge inputs of the controller
pub struct PulseTimers {
    /// Anemometer reed switch, counted without debounce
    pub anemometer: PulseCounter,
    /// Generator electrical-frequency signal
    pub turbine: PulseCounter,
}

impl PulseTimers {
    /// Counters for a calibration profile
    pub fn new(calibration: &CalibrationConfig) -> Self {
        Self::with_debounce(calibration.rpm.debounce())
    }

    /// Counters with an explicit turbine debounce, usable in `static` items
    pub const fn with_debounce(turbine_debounce: MicrosDurationU32) -> Self {
        Self {
            anemometer: PulseCounter::new(MicrosDurationU32::from_ticks(0)),
            turbine: PulseCounter::new(turbine_debounce),
        }
    }
}

/// Converts drained edge counts into a rate over a fixed window
///
/// The counter is drained and the window restarted only once the window has
/// elapsed; in between the previous rate is held. The rate divides by the
/// time actually elapsed, so a late acquisition tick does not inflate it.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window: MillisDurationU64,
    started: Option<Timestamp>,
    rate_hz: f32,
}

impl RateWindow {
    /// Window of the given length
    pub fn new(window: MillisDurationU64) -> Self {
        Self { window, started: None, rate_hz: 0.0 }
    }

    /// Edges per second, refreshed when the window has elapsed at `now`
    pub fn sample(&mut self, counter: &PulseCounter, now: Timestamp) -> f32 {
        let Some(started) = self.started else {
            // Edges from before the first window have no known start time
            counter.drain();
            self.started = Some(now);
            return self.rate_hz;
        };

        let span = elapsed(started, now);
        if span >= self.window && span.ticks() > 0 {
            let edges = counter.drain();
            self.rate_hz = edges as f32 * 1000.0 / span.ticks() as f32;
            self.started = Some(now);
        }

        self.rate_hz
    }

    /// Last computed rate
    pub fn rate_hz(&self) -> f32 {
        self.rate_hz
    }
}
