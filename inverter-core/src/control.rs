//! Task loops
//!
//! Two periodic tasks share the store:
//!
//! ```text
//!  Acquisition (every 100 ms)            Controller (every tick)
//!  ──────────────────────────            ──────────────────────────────────
//!  wait for tick, AnalogFrontEnd::poll   1. copy snapshot + dynamic config
//!  SignalConditioner::condition          2. protection, on its own cadence
//!  SnapshotPublisher::publish ──store──► 3. drain command inbox
//!                                        4. dispatch (Automatic and Normal)
//! ```
//!
//! The controller is the single owner of the protection engine, the
//! dispatch strategy and the relay interlock, so the protection engine's
//! relay writes are never interleaved with a command or a dispatch pass.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::command::Command;
use crate::conditioner::SignalConditioner;
use crate::config::DynamicConfig;
use crate::dispatch::{DispatchDecision, DispatchStrategy};
use crate::errors::{ControlError, ControlResult};
use crate::frontend::{AdcReader, AnalogFrontEnd};
use crate::protection::{ProtectionEngine, ProtectionPhase};
use crate::pulse::PulseTimers;
use crate::relay::{RelayChannel, RelayInterlock, RelayOutputs};
use crate::snapshot::SensorSnapshot;
use crate::store::{SharedStateStore, SnapshotPublisher, INBOX_CAPACITY};
use crate::time::{TimeSource, Timestamp};

/// Who decides the source relays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchMode {
    /// Dispatch strategy runs every tick
    Automatic,
    /// Relays follow remote commands only
    Manual,
}

/// Outcome of one controller tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Phase after the protection evaluation, if one was due
    pub protection: Option<ProtectionPhase>,
    /// Commands handled this tick and their outcome
    pub commands: Vec<(Command, ControlResult<()>), INBOX_CAPACITY>,
    /// Dispatch decision applied this tick
    pub decision: Option<DispatchDecision>,
}

/// Control task: protection, commands and dispatch
pub struct Controller<'a, O, D> {
    store: &'a SharedStateStore,
    protection: ProtectionEngine<'a>,
    strategy: DispatchStrategy,
    relays: RelayInterlock<'a, O, D>,
    mode: DispatchMode,
    last_decision: Option<DispatchDecision>,
}

impl<'a, O: RelayOutputs, D: DelayNs> Controller<'a, O, D> {
    /// Controller in automatic mode
    pub fn new(
        store: &'a SharedStateStore,
        protection: ProtectionEngine<'a>,
        strategy: DispatchStrategy,
        relays: RelayInterlock<'a, O, D>,
    ) -> Self {
        Self {
            store,
            protection,
            strategy,
            relays,
            mode: DispatchMode::Automatic,
            last_decision: None,
        }
    }

    /// Current dispatch mode
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Protection engine
    pub fn protection(&self) -> &ProtectionEngine<'a> {
        &self.protection
    }

    /// Relay interlock
    pub fn relays(&self) -> &RelayInterlock<'a, O, D> {
        &self.relays
    }

    /// Last dispatch decision applied
    pub fn last_decision(&self) -> Option<&DispatchDecision> {
        self.last_decision.as_ref()
    }

    /// Run one control tick at `now`
    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        let snapshot = self.store.snapshot();
        let dynamic = self.store.dynamic_config();

        let mut report = TickReport { protection: None, commands: Vec::new(), decision: None };

        if self.protection.due(now) {
            let phase = self.protection.evaluate(&snapshot, &dynamic, &mut self.relays, now);
            report.protection = Some(phase);
        }

        let mut dispatched = false;
        for _ in 0..INBOX_CAPACITY {
            let Some(command) = self.store.next_command() else { break };
            let result = self.handle(command, &snapshot, &dynamic, now);
            if let Err(err) = &result {
                log_warn!("command {} refused: {}", command.name(), err);
            }
            dispatched |= matches!(command, Command::RunStrategy) && result.is_ok();
            // Bounded by the loop; cannot overflow
            let _ = report.commands.push((command, result));
        }

        if !dispatched
            && self.mode == DispatchMode::Automatic
            && !self.protection.state().active()
        {
            self.dispatch(&snapshot, &dynamic, now);
            dispatched = true;
        }

        if dispatched {
            report.decision = self.last_decision;
        }
        report
    }

    /// Execute one command against the current state
    pub fn handle(
        &mut self,
        command: Command,
        snapshot: &SensorSnapshot,
        dynamic: &DynamicConfig,
        now: Timestamp,
    ) -> ControlResult<()> {
        let active = self.protection.state().active();

        match command {
            Command::EmergencyAllOff => {
                self.set_mode(DispatchMode::Manual);
                self.relays.emergency_all_off(now)?;
            }
            Command::SetRelay { channel, on } => {
                let conflicts = match channel {
                    RelayChannel::Wind => on,
                    RelayChannel::Brake => !on,
                    _ => false,
                };
                if active && conflicts {
                    return Err(ControlError::ProtectionActive { channel });
                }
                self.set_mode(DispatchMode::Manual);
                self.relays.set(channel, on, now)?;
            }
            Command::RunStrategy => {
                self.set_mode(DispatchMode::Automatic);
                if active {
                    return Err(ControlError::StrategyBlocked);
                }
                self.dispatch(snapshot, dynamic, now);
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, snapshot: &SensorSnapshot, dynamic: &DynamicConfig, now: Timestamp) {
        let decision = self.strategy.decide(snapshot, dynamic);
        if let Err(err) = self.strategy.apply(&decision, &mut self.relays, now) {
            log_warn!("dispatch proposal refused: {}", err);
        }
        self.last_decision = Some(decision);
    }

    fn set_mode(&mut self, mode: DispatchMode) {
        if self.mode != mode {
            log_info!("dispatch mode {:?}", mode);
            self.mode = mode;
        }
    }
}

/// Acquisition task: sample, condition and publish
///
/// One frame is started per acquisition tick (`SamplingPlan::period_ms`).
/// Ticks stay on a fixed grid while frames start on time; a late start
/// moves the grid to that start.
pub struct Acquisition<'a> {
    front_end: AnalogFrontEnd,
    conditioner: SignalConditioner,
    publisher: SnapshotPublisher<'a>,
    period_us: u64,
    frame_started_us: Option<u64>,
    next_due_us: Option<u64>,
}

impl<'a> Acquisition<'a> {
    /// Task over the given stages, ticking at the front end's sampling period
    pub fn new(
        front_end: AnalogFrontEnd,
        conditioner: SignalConditioner,
        publisher: SnapshotPublisher<'a>,
    ) -> Self {
        let period_us = front_end.plan().period().to_micros();
        Self {
            front_end,
            conditioner,
            publisher,
            period_us,
            frame_started_us: None,
            next_due_us: None,
        }
    }

    /// Whether a frame is in progress or the next tick has arrived at `now_us`
    pub fn due(&self, now_us: u64) -> bool {
        self.frame_started_us.is_some() || self.next_due_us.map_or(true, |at| now_us >= at)
    }

    /// Advance sampling; publishes and returns the sample number once a frame completes
    ///
    /// Returns `WouldBlock` between ticks and while the frame is being sampled.
    pub fn poll<A: AdcReader>(
        &mut self,
        adc: &mut A,
        pulses: &PulseTimers,
        temperature_c: Option<f32>,
        now_us: u64,
    ) -> nb::Result<u32, Infallible> {
        if !self.due(now_us) {
            return Err(nb::Error::WouldBlock);
        }
        let started = *self.frame_started_us.get_or_insert(now_us);

        let frame = self.front_end.poll(adc, now_us)?;
        self.finish_frame(started, now_us);

        let snapshot = self.conditioner.condition(&frame, pulses, temperature_c, now_us / 1000);
        Ok(self.publisher.publish(snapshot))
    }

    /// Wait for the next tick, then sample a whole frame, condition and publish it
    ///
    /// Spins on `clock`, so the clock must advance while waiting.
    pub fn run_blocking<A: AdcReader, T: TimeSource>(
        &mut self,
        adc: &mut A,
        pulses: &PulseTimers,
        clock: &T,
    ) -> u32 {
        let mut started = clock.now_micros();
        while !self.due(started) {
            started = clock.now_micros();
        }

        let snapshot = self.conditioner.acquire(&mut self.front_end, adc, pulses, clock);
        self.finish_frame(started, clock.now_micros());
        self.publisher.publish(snapshot)
    }

    fn finish_frame(&mut self, started_us: u64, now_us: u64) {
        let on_grid = self.next_due_us.unwrap_or(started_us) + self.period_us;
        let next = if on_grid > now_us {
            on_grid
        } else {
            log_debug!("acquisition tick missed, frame started at {} us", started_us);
            started_us + self.period_us
        };
        self.frame_started_us = None;
        self.next_due_us = Some(next);
    }

    /// Publish an externally built snapshot (simulation and replay)
    pub fn publish(&mut self, snapshot: SensorSnapshot) -> u32 {
        self.publisher.publish(snapshot)
    }
}
