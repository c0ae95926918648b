//! Relay outputs and their safety interlock
//!
//! [`RelayInterlock`] is the only path to the five actuator outputs. It
//! enforces two rules before anything reaches a pin:
//!
//! - The wind branch cannot be connected while the brake resistor is engaged.
//! - Engaging the brake first disconnects the wind branch and waits for the
//!   contacts to settle, so the brake never closes across an energized path.
//!
//! Solar, grid and load have no cross-interlocks. `emergency_all_off`
//! bypasses ordering and clears everything.
//!
//! Every real transition republishes the whole [`RelayState`] (booleans
//! together with the update timestamp) through the store.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::errors::{InterlockError, InterlockResult};
use crate::store::RelayPublisher;
use crate::time::Timestamp;

/// Actuator channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayChannel {
    /// Solar branch
    Solar,
    /// Wind turbine branch
    Wind,
    /// Grid backup
    Grid,
    /// Load output
    Load,
    /// Brake resistor across the turbine
    Brake,
}

impl RelayChannel {
    /// All channels in output order
    pub const ALL: [RelayChannel; 5] = [
        RelayChannel::Solar,
        RelayChannel::Wind,
        RelayChannel::Grid,
        RelayChannel::Load,
        RelayChannel::Brake,
    ];

    /// Position in [`Self::ALL`]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Command and telemetry name
    pub const fn name(self) -> &'static str {
        match self {
            RelayChannel::Solar => "solar",
            RelayChannel::Wind => "eolica",
            RelayChannel::Grid => "red",
            RelayChannel::Load => "carga",
            RelayChannel::Brake => "freno",
        }
    }
}

impl fmt::Display for RelayChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Actuator outputs as last applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayState {
    /// Solar branch connected
    pub solar: bool,
    /// Wind branch connected
    pub wind: bool,
    /// Grid backup connected
    pub grid: bool,
    /// Load connected
    pub load: bool,
    /// Brake resistor engaged
    pub brake: bool,
    /// Time of the last transition (ms since boot)
    pub updated_at: Timestamp,
}

impl RelayState {
    /// Safe default: every output off
    pub const fn all_off() -> Self {
        Self { solar: false, wind: false, grid: false, load: false, brake: false, updated_at: 0 }
    }

    /// Output state of `channel`
    pub fn get(&self, channel: RelayChannel) -> bool {
        match channel {
            RelayChannel::Solar => self.solar,
            RelayChannel::Wind => self.wind,
            RelayChannel::Grid => self.grid,
            RelayChannel::Load => self.load,
            RelayChannel::Brake => self.brake,
        }
    }

    fn set(&mut self, channel: RelayChannel, on: bool) {
        match channel {
            RelayChannel::Solar => self.solar = on,
            RelayChannel::Wind => self.wind = on,
            RelayChannel::Grid => self.grid = on,
            RelayChannel::Load => self.load = on,
            RelayChannel::Brake => self.brake = on,
        }
    }
}

/// Physical relay drivers
pub trait RelayOutputs {
    /// Driver error
    type Error;

    /// Energize or release the coil of `channel`
    fn drive(&mut self, channel: RelayChannel, on: bool) -> Result<(), Self::Error>;
}

/// Five active-high GPIO relay drivers
pub struct PinBank<P> {
    pins: [P; 5],
}

impl<P: OutputPin> PinBank<P> {
    /// Bank from one pin per channel
    pub fn new(solar: P, wind: P, grid: P, load: P, brake: P) -> Self {
        Self { pins: [solar, wind, grid, load, brake] }
    }

    /// Pin driving `channel`
    pub fn pin(&self, channel: RelayChannel) -> &P {
        &self.pins[channel.index()]
    }

    /// Give the pins back
    pub fn release(self) -> [P; 5] {
        self.pins
    }
}

impl<P: OutputPin> RelayOutputs for PinBank<P> {
    type Error = P::Error;

    fn drive(&mut self, channel: RelayChannel, on: bool) -> Result<(), Self::Error> {
        let pin = &mut self.pins[channel.index()];
        if on {
            pin.set_high()
        } else {
            pin.set_low()
        }
    }
}

/// Sole owner of the relay outputs
pub struct RelayInterlock<'a, O, D> {
    outputs: O,
    delay: D,
    settle_ms: u32,
    state: RelayState,
    publisher: RelayPublisher<'a>,
}

impl<'a, O: RelayOutputs, D: DelayNs> RelayInterlock<'a, O, D> {
    /// Take ownership of the outputs and drive every channel off
    pub fn new(
        outputs: O,
        delay: D,
        settle_ms: u32,
        publisher: RelayPublisher<'a>,
        now: Timestamp,
    ) -> InterlockResult<Self> {
        let mut interlock = Self {
            outputs,
            delay,
            settle_ms,
            state: RelayState { updated_at: now, ..RelayState::all_off() },
            publisher,
        };

        for channel in RelayChannel::ALL {
            interlock
                .outputs
                .drive(channel, false)
                .map_err(|_| InterlockError::Output { channel })?;
        }
        interlock.publisher.publish(interlock.state);
        log_info!("relays initialised, all off");

        Ok(interlock)
    }

    /// Current output state
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Output drivers, for inspection
    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    /// Request `channel` on or off, applying the interlock rules
    pub fn set(&mut self, channel: RelayChannel, on: bool, now: Timestamp) -> InterlockResult<()> {
        match channel {
            RelayChannel::Wind => self.set_wind(on, now),
            RelayChannel::Brake => self.set_brake(on, now),
            _ => self.apply(channel, on, now),
        }
    }

    /// Solar branch
    pub fn set_solar(&mut self, on: bool, now: Timestamp) -> InterlockResult<()> {
        self.apply(RelayChannel::Solar, on, now)
    }

    /// Wind branch; connecting is refused while the brake is engaged
    pub fn set_wind(&mut self, on: bool, now: Timestamp) -> InterlockResult<()> {
        if on && self.state.brake {
            log_warn!("safety: wind connect refused, brake engaged");
            return Err(InterlockError::Rejected {
                channel: RelayChannel::Wind,
                reason: "brake engaged",
            });
        }
        self.apply(RelayChannel::Wind, on, now)
    }

    /// Grid backup
    pub fn set_grid(&mut self, on: bool, now: Timestamp) -> InterlockResult<()> {
        self.apply(RelayChannel::Grid, on, now)
    }

    /// Load output
    pub fn set_load(&mut self, on: bool, now: Timestamp) -> InterlockResult<()> {
        self.apply(RelayChannel::Load, on, now)
    }

    /// Brake resistor; engaging drops the wind branch and waits for it first
    pub fn set_brake(&mut self, on: bool, now: Timestamp) -> InterlockResult<()> {
        if on && self.state.wind {
            log_warn!("safety: disconnecting wind before brake");
            self.apply(RelayChannel::Wind, false, now)?;
            self.delay.delay_ms(self.settle_ms);
        }
        self.apply(RelayChannel::Brake, on, now)
    }

    /// Clear every output without ordering rules
    ///
    /// Every channel is attempted even if an earlier one fails; the first
    /// driver failure is returned.
    pub fn emergency_all_off(&mut self, now: Timestamp) -> InterlockResult<()> {
        log_error!("emergency: all relays off");

        let mut first_error = None;
        for channel in RelayChannel::ALL {
            if let Err(err) = self.apply(channel, false, now) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn apply(&mut self, channel: RelayChannel, on: bool, now: Timestamp) -> InterlockResult<()> {
        if self.outputs.drive(channel, on).is_err() {
            log_error!("relay driver failed on {}", channel.name());
            return Err(InterlockError::Output { channel });
        }

        if self.state.get(channel) != on {
            self.state.set(channel, on);
            self.state.updated_at = now;
            self.publisher.publish(self.state);
            log_info!("relay {} {}", channel.name(), if on { "on" } else { "off" });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SharedStateStore;
    use core::convert::Infallible;
    use proptest::prelude::*;

    /// Records every drive call; optionally fails one channel
    #[derive(Default)]
    struct Recorder {
        log: heapless::Vec<(RelayChannel, bool), 64>,
        failing: Option<RelayChannel>,
    }

    impl RelayOutputs for Recorder {
        type Error = ();

        fn drive(&mut self, channel: RelayChannel, on: bool) -> Result<(), ()> {
            if self.failing == Some(channel) {
                return Err(());
            }
            let _ = self.log.push((channel, on));
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    struct FlagPin(bool);

    impl embedded_hal::digital::ErrorType for FlagPin {
        type Error = Infallible;
    }

    impl OutputPin for FlagPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0 = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0 = true;
            Ok(())
        }
    }

    fn interlock(store: &SharedStateStore) -> RelayInterlock<'_, Recorder, NoDelay> {
        let publisher = store.take_relay_publisher().unwrap();
        RelayInterlock::new(Recorder::default(), NoDelay, 100, publisher, 0).unwrap()
    }

    #[test]
    fn starts_all_off_and_published() {
        let store = SharedStateStore::new();
        let relays = interlock(&store);

        assert_eq!(relays.state(), RelayState::all_off());
        assert_eq!(store.relay_state(), RelayState::all_off());
        assert_eq!(relays.outputs().log.len(), 5);
    }

    #[test]
    fn wind_refused_while_braking() {
        let store = SharedStateStore::new();
        let mut relays = interlock(&store);
        relays.set_brake(true, 10).unwrap();

        let err = relays.set_wind(true, 20).unwrap_err();
        assert!(matches!(err, InterlockError::Rejected { channel: RelayChannel::Wind, .. }));
        assert!(!relays.state().wind);
        assert_eq!(relays.state().updated_at, 10);
    }

    #[test]
    fn brake_drops_wind_first() {
        let store = SharedStateStore::new();
        let mut relays = interlock(&store);
        relays.set_wind(true, 10).unwrap();
        relays.set_brake(true, 20).unwrap();

        let log = &relays.outputs().log;
        let tail = &log[log.len() - 2..];
        assert_eq!(tail, &[(RelayChannel::Wind, false), (RelayChannel::Brake, true)]);
        assert!(!store.relay_state().wind);
        assert!(store.relay_state().brake);
    }

    #[test]
    fn timestamp_moves_only_on_transition() {
        let store = SharedStateStore::new();
        let mut relays = interlock(&store);
        relays.set_load(true, 50).unwrap();
        relays.set_load(true, 90).unwrap();

        assert_eq!(relays.state().updated_at, 50);
        // Pin was re-driven anyway
        let count = relays.outputs().log.iter().filter(|e| **e == (RelayChannel::Load, true)).count();
        assert_eq!(count, 2);
    }

    #[test]
    fn driver_failure_leaves_state() {
        let store = SharedStateStore::new();
        let mut relays = interlock(&store);
        relays.outputs.failing = Some(RelayChannel::Grid);

        assert_eq!(
            relays.set_grid(true, 5),
            Err(InterlockError::Output { channel: RelayChannel::Grid })
        );
        assert!(!relays.state().grid);
    }

    #[test]
    fn emergency_clears_everything() {
        let store = SharedStateStore::new();
        let mut relays = interlock(&store);
        relays.set_solar(true, 1).unwrap();
        relays.set_grid(true, 1).unwrap();
        relays.set_load(true, 1).unwrap();
        relays.set_brake(true, 1).unwrap();

        relays.emergency_all_off(2).unwrap();
        let state = store.relay_state();
        assert!(!state.solar && !state.wind && !state.grid && !state.load && !state.brake);
        assert_eq!(state.updated_at, 2);
    }

    #[test]
    fn pin_bank_drives_pins() {
        let mut bank = PinBank::new(FlagPin(false), FlagPin(false), FlagPin(false), FlagPin(false), FlagPin(false));
        bank.drive(RelayChannel::Brake, true).unwrap();
        assert!(bank.pin(RelayChannel::Brake).0);
        assert!(!bank.pin(RelayChannel::Wind).0);
    }

    fn channel() -> impl Strategy<Value = RelayChannel> {
        prop::sample::select(RelayChannel::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn wind_and_brake_never_both_on(
            ops in prop::collection::vec((channel(), any::<bool>()), 0..40),
        ) {
            let store = SharedStateStore::new();
            let mut relays = interlock(&store);

            for (t, (ch, on)) in ops.into_iter().enumerate() {
                let brake_before = relays.state().brake;
                let before = relays.state();
                let result = relays.set(ch, on, t as u64);

                if ch == RelayChannel::Wind && on && brake_before {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(relays.state(), before);
                }
                let state = relays.state();
                prop_assert!(!(state.wind && state.brake));
            }
        }
    }
}
