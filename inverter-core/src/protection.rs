//! Turbine overspeed protection
//!
//! A three-phase state machine with final authority over the relays:
//!
//! ```text
//!            any danger                 delay elapsed
//!  Normal ─────────────────► Tripped ─────────────────► Braking
//!    ▲                          │                          │
//!    │       danger clear       │                          │
//!    ├──────────────────────────┘                          │
//!    │        danger clear AND dwell elapsed since brake   │
//!    └─────────────────────────────────────────────────────┘
//! ```
//!
//! Danger is any of: wind speed above the limit, mean battery voltage above
//! the limit, or measured rotor RPM above the limit. Causes are independent
//! flags and stay set for the whole episode.
//!
//! While an episode is active the wind branch is forced off on every
//! evaluation, since dispatch or a remote command could otherwise try to
//! reconnect it. While braking the brake is re-asserted every evaluation.
//!
//! The RPM estimated from wind speed with a fixed tip-speed ratio is only
//! reported; tripping uses the frequency-measured RPM from the snapshot.

use core::f32::consts::PI;

use embedded_hal::delay::DelayNs;

use crate::config::{DynamicConfig, ProtectionLimits};
use crate::relay::{RelayInterlock, RelayOutputs};
use crate::snapshot::SensorSnapshot;
use crate::store::ProtectionPublisher;
use crate::time::{elapsed, Timestamp};

/// Phase of the protection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtectionPhase {
    /// No danger, dispatch in control
    Normal,
    /// Danger detected, turbine disconnected, brake pending
    Tripped,
    /// Brake resistor engaged
    Braking,
}

/// Externally reported protection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtectionStatus {
    /// No active episode
    Normal,
    /// Runaway episode in progress
    Tripped,
}

impl ProtectionStatus {
    /// Telemetry string
    pub const fn as_str(self) -> &'static str {
        match self {
            ProtectionStatus::Normal => "NORMAL",
            ProtectionStatus::Tripped => "EMBALAMIENTO",
        }
    }
}

/// Danger conditions, each tracked independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TripCauses {
    /// Wind speed above limit
    pub wind: bool,
    /// Mean battery voltage above limit
    pub voltage: bool,
    /// Measured rotor speed above limit
    pub rpm: bool,
}

impl TripCauses {
    const NONE: Self = Self { wind: false, voltage: false, rpm: false };

    /// Any condition holds
    pub fn any(&self) -> bool {
        self.wind || self.voltage || self.rpm
    }

    fn merge(&mut self, other: TripCauses) {
        self.wind |= other.wind;
        self.voltage |= other.voltage;
        self.rpm |= other.rpm;
    }
}

/// Current safety posture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionState {
    /// State machine phase
    pub phase: ProtectionPhase,
    /// Causes seen during the current episode
    pub causes: TripCauses,
    /// Start of the current episode
    pub detected_at: Option<Timestamp>,
    /// Brake engagement time in the current episode
    pub brake_engaged_at: Option<Timestamp>,
    /// Episodes that reached the brake since boot
    pub activations: u32,
    /// Rotor speed estimated from wind speed (RPM), reporting only
    pub estimated_rpm: f32,
    /// Power into the brake resistor while braking (W)
    pub brake_dissipation_w: f32,
    /// Wind branch above the rated turbine power
    pub turbine_overload: bool,
}

impl ProtectionState {
    /// Inactive state present at boot
    pub const fn new() -> Self {
        Self {
            phase: ProtectionPhase::Normal,
            causes: TripCauses::NONE,
            detected_at: None,
            brake_engaged_at: None,
            activations: 0,
            estimated_rpm: 0.0,
            brake_dissipation_w: 0.0,
            turbine_overload: false,
        }
    }

    /// An episode is in progress
    pub fn active(&self) -> bool {
        self.phase != ProtectionPhase::Normal
    }

    /// Brake resistor is engaged
    pub fn brake_engaged(&self) -> bool {
        self.phase == ProtectionPhase::Braking
    }

    /// Reported status
    pub fn status(&self) -> ProtectionStatus {
        if self.active() {
            ProtectionStatus::Tripped
        } else {
            ProtectionStatus::Normal
        }
    }
}

impl Default for ProtectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Overspeed protection state machine
pub struct ProtectionEngine<'a> {
    limits: ProtectionLimits,
    state: ProtectionState,
    next_due: Option<Timestamp>,
    publisher: ProtectionPublisher<'a>,
}

impl<'a> ProtectionEngine<'a> {
    /// Engine in `Normal`, publishing through `publisher`
    pub fn new(limits: ProtectionLimits, mut publisher: ProtectionPublisher<'a>) -> Self {
        let state = ProtectionState::new();
        publisher.publish(state);
        Self { limits, state, next_due: None, publisher }
    }

    /// Current state
    pub fn state(&self) -> ProtectionState {
        self.state
    }

    /// Current status
    pub fn status(&self) -> ProtectionStatus {
        self.state.status()
    }

    /// Limits in use
    pub fn limits(&self) -> &ProtectionLimits {
        &self.limits
    }

    /// Whether the evaluation period has elapsed at `now`
    pub fn due(&self, now: Timestamp) -> bool {
        self.next_due.map_or(true, |at| now >= at)
    }

    /// Rotor speed implied by `wind_ms` at the assumed tip-speed ratio
    pub fn estimate_rpm(&self, wind_ms: f32) -> f32 {
        wind_ms * self.limits.tip_speed_ratio * 60.0 / (2.0 * PI * self.limits.rotor_radius_m)
    }

    /// Conditions currently holding in `snapshot`
    pub fn danger(&self, snapshot: &SensorSnapshot) -> TripCauses {
        TripCauses {
            wind: snapshot.wind_speed_ms > self.limits.max_wind_ms,
            voltage: snapshot.battery_avg_v > self.limits.max_voltage_v,
            rpm: snapshot.turbine_rpm > self.limits.max_rpm,
        }
    }

    /// Run one evaluation against `snapshot` at `now`
    ///
    /// Relay failures are logged and retried on the next evaluation; they
    /// never move the state machine forward.
    pub fn evaluate<O: RelayOutputs, D: DelayNs>(
        &mut self,
        snapshot: &SensorSnapshot,
        dynamic: &DynamicConfig,
        relays: &mut RelayInterlock<'_, O, D>,
        now: Timestamp,
    ) -> ProtectionPhase {
        self.next_due = Some(now + self.limits.evaluation_period().ticks());

        let causes = self.danger(snapshot);
        self.state.estimated_rpm = self.estimate_rpm(snapshot.wind_speed_ms);
        self.state.turbine_overload = snapshot.wind_w > dynamic.rated_turbine_power_w;

        if self.state.phase == ProtectionPhase::Normal && causes.any() {
            if dynamic.protection_enabled {
                self.trip(causes, now);
            } else {
                log_warn!("danger detected with protection disabled");
            }
        }

        match self.state.phase {
            ProtectionPhase::Normal => {}
            ProtectionPhase::Tripped => {
                if causes.any() {
                    self.state.causes.merge(causes);
                    self.force_wind_off(relays, now);
                    self.maybe_engage_brake(snapshot, relays, now);
                } else {
                    log_info!("danger cleared before brake, protection reset");
                    self.reset();
                }
            }
            ProtectionPhase::Braking => {
                self.state.causes.merge(causes);
                self.force_wind_off(relays, now);
                self.state.brake_dissipation_w = self.dissipation(snapshot);

                let engaged_at = self.state.brake_engaged_at.unwrap_or(now);
                let dwell_done = elapsed(engaged_at, now) >= self.limits.min_dwell();

                if !causes.any() && dwell_done {
                    match relays.set_brake(false, now) {
                        Ok(()) => {
                            log_info!("danger cleared, brake released after dwell");
                            self.reset();
                        }
                        Err(_) => log_error!("brake release failed, holding"),
                    }
                } else if relays.set_brake(true, now).is_err() {
                    log_error!("brake re-assert failed");
                }
            }
        }

        self.publisher.publish(self.state);
        self.state.phase
    }

    fn trip(&mut self, causes: TripCauses, now: Timestamp) {
        log_error!(
            "runaway detected: wind={} voltage={} rpm={}",
            causes.wind,
            causes.voltage,
            causes.rpm
        );
        self.state.phase = ProtectionPhase::Tripped;
        self.state.causes = causes;
        self.state.detected_at = Some(now);
    }

    fn force_wind_off<O: RelayOutputs, D: DelayNs>(
        &mut self,
        relays: &mut RelayInterlock<'_, O, D>,
        now: Timestamp,
    ) {
        if relays.set_wind(false, now).is_err() {
            log_error!("wind disconnect failed during protection");
        }
    }

    fn maybe_engage_brake<O: RelayOutputs, D: DelayNs>(
        &mut self,
        snapshot: &SensorSnapshot,
        relays: &mut RelayInterlock<'_, O, D>,
        now: Timestamp,
    ) {
        let detected_at = self.state.detected_at.unwrap_or(now);
        if elapsed(detected_at, now) < self.limits.brake_delay() {
            return;
        }

        if relays.set_brake(true, now).is_err() {
            log_error!("brake engage failed, retrying next evaluation");
            return;
        }

        self.state.phase = ProtectionPhase::Braking;
        self.state.brake_engaged_at = Some(now);
        self.state.activations = self.state.activations.wrapping_add(1);
        self.state.brake_dissipation_w = self.dissipation(snapshot);
        log_warn!("brake engaged, activation {}", self.state.activations);

        if self.state.brake_dissipation_w > self.limits.brake_max_w {
            log_warn!("brake dissipation above resistor rating");
        }
    }

    fn dissipation(&self, snapshot: &SensorSnapshot) -> f32 {
        snapshot.battery_avg_v * snapshot.battery_avg_v / self.limits.brake_resistance_ohm
    }

    fn reset(&mut self) {
        self.state.phase = ProtectionPhase::Normal;
        self.state.causes = TripCauses::NONE;
        self.state.detected_at = None;
        self.state.brake_engaged_at = None;
        self.state.brake_dissipation_w = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use crate::relay::RelayChannel;
    use crate::store::SharedStateStore;

    #[derive(Default)]
    struct Outputs {
        failing: Cell<Option<RelayChannel>>,
    }

    impl RelayOutputs for Outputs {
        type Error = ();

        fn drive(&mut self, channel: RelayChannel, _on: bool) -> Result<(), ()> {
            if self.failing.get() == Some(channel) {
                Err(())
            } else {
                Ok(())
            }
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn windy(speed: f32) -> SensorSnapshot {
        SensorSnapshot { wind_speed_ms: speed, battery_avg_v: 50.0, ..SensorSnapshot::empty() }
    }

    struct Rig<'a> {
        engine: ProtectionEngine<'a>,
        relays: RelayInterlock<'a, Outputs, NoDelay>,
        dynamic: DynamicConfig,
    }

    impl<'a> Rig<'a> {
        fn new(store: &'a SharedStateStore) -> Self {
            let engine = ProtectionEngine::new(
                ProtectionLimits::default(),
                store.take_protection_publisher().unwrap(),
            );
            let relays = RelayInterlock::new(
                Outputs::default(),
                NoDelay,
                100,
                store.take_relay_publisher().unwrap(),
                0,
            )
            .unwrap();
            Self { engine, relays, dynamic: DynamicConfig::new() }
        }

        fn step(&mut self, snapshot: SensorSnapshot, now: Timestamp) -> ProtectionPhase {
            self.engine.evaluate(&snapshot, &self.dynamic, &mut self.relays, now)
        }
    }

    #[test]
    fn trip_disconnects_wind_immediately() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);
        rig.relays.set_wind(true, 0).unwrap();

        assert_eq!(rig.step(windy(30.0), 500), ProtectionPhase::Tripped);
        assert!(!rig.relays.state().wind);
        assert_eq!(store.protection_state().status(), ProtectionStatus::Tripped);
        assert_eq!(store.protection_state().status().as_str(), "EMBALAMIENTO");
    }

    #[test]
    fn causes_are_independent_and_sticky() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);

        let both = SensorSnapshot { wind_speed_ms: 30.0, battery_avg_v: 70.0, ..SensorSnapshot::empty() };
        rig.step(both, 0);
        rig.step(windy(30.0), 500);

        let causes = rig.engine.state().causes;
        assert!(causes.wind && causes.voltage && !causes.rpm);
    }

    #[test]
    fn measured_rpm_trips() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);

        let fast = SensorSnapshot { turbine_rpm: 650.0, ..SensorSnapshot::empty() };
        rig.step(fast, 0);
        assert!(rig.engine.state().causes.rpm);
    }

    #[test]
    fn estimated_rpm_is_reporting_only() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);

        // 20 m/s gives ~1146 RPM by tip-speed ratio, but measured RPM is low
        assert_eq!(rig.step(windy(20.0), 0), ProtectionPhase::Normal);
        assert!(rig.engine.state().estimated_rpm > 1_000.0);
    }

    #[test]
    fn brake_after_delay_counts_once() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);

        rig.step(windy(30.0), 0);
        assert_eq!(rig.step(windy(30.0), 1_500), ProtectionPhase::Tripped);
        assert_eq!(rig.step(windy(30.0), 2_000), ProtectionPhase::Braking);
        for t in 1..10 {
            rig.step(windy(30.0), 2_000 + t * 500);
        }

        let state = store.protection_state();
        assert_eq!(state.activations, 1);
        assert_eq!(state.brake_engaged_at, Some(2_000));
        assert!(rig.relays.state().brake);
        assert!((state.brake_dissipation_w - 250.0).abs() < 1e-3);
    }

    #[test]
    fn disabled_protection_starts_nothing() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);
        rig.dynamic.protection_enabled = false;

        assert_eq!(rig.step(windy(30.0), 0), ProtectionPhase::Normal);
    }

    #[test]
    fn disabling_mid_episode_runs_it_out() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);

        rig.step(windy(30.0), 0);
        rig.dynamic.protection_enabled = false;
        assert_eq!(rig.step(windy(30.0), 2_000), ProtectionPhase::Braking);
    }

    #[test]
    fn brake_failure_keeps_tripped() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);
        rig.step(windy(30.0), 0);

        rig.relays.outputs().failing.set(Some(RelayChannel::Brake));
        assert_eq!(rig.step(windy(30.0), 2_500), ProtectionPhase::Tripped);
        assert_eq!(rig.engine.state().activations, 0);

        // Driver recovers: engaged on the next evaluation
        rig.relays.outputs().failing.set(None);
        assert_eq!(rig.step(windy(30.0), 3_000), ProtectionPhase::Braking);
        assert_eq!(rig.engine.state().activations, 1);
    }

    #[test]
    fn due_follows_period() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);
        assert!(rig.engine.due(0));

        rig.step(windy(0.0), 1_000);
        assert!(!rig.engine.due(1_499));
        assert!(rig.engine.due(1_500));
    }

    #[test]
    fn overload_flag_tracks_rated_power() {
        let store = SharedStateStore::new();
        let mut rig = Rig::new(&store);

        let strong = SensorSnapshot { wind_w: 2_500.0, ..SensorSnapshot::empty() };
        rig.step(strong, 0);
        assert!(rig.engine.state().turbine_overload);
    }
}
