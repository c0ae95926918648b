//! Rule-based source dispatch
//!
//! Proposes relay states from the generation/consumption balance and the
//! battery state of charge. Only consulted while protection is `Normal`,
//! and every proposal still goes through the relay interlock.
//!
//! Rules, first match wins:
//!
//! 1. Generation covers consumption: renewables per their own threshold,
//!    load on. Surplus charges the battery inside the charge window.
//! 2. Deficit with SOC above the discharge floor: same, battery covers it.
//! 3. SOC at or below the discharge floor: grid backup and load on,
//!    renewables per their own threshold.
//!
//! SOC at or below the critical level raises an alarm on top of whichever
//! rule applied; shedding load is outside the controller's authority.

use embedded_hal::delay::DelayNs;

use crate::config::{DispatchThresholds, DynamicConfig};
use crate::errors::InterlockResult;
use crate::relay::{RelayChannel, RelayInterlock, RelayOutputs};
use crate::snapshot::SensorSnapshot;
use crate::time::Timestamp;

/// Rule that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchRule {
    /// Renewables cover the load
    Renewables,
    /// Battery covers the deficit
    Battery,
    /// Grid backup engaged
    GridBackup,
}

/// What the surplus is doing to the battery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeIntent {
    /// Surplus directed into the battery
    Charging,
    /// At or above the charge ceiling, no charging asserted
    Full,
    /// Neither
    Idle,
}

/// Proposed output per channel; `None` leaves the channel as it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayProposal {
    /// Solar branch
    pub solar: Option<bool>,
    /// Wind branch
    pub wind: Option<bool>,
    /// Grid backup
    pub grid: Option<bool>,
    /// Load
    pub load: Option<bool>,
}

impl RelayProposal {
    fn entries(&self) -> [(RelayChannel, Option<bool>); 4] {
        [
            (RelayChannel::Solar, self.solar),
            (RelayChannel::Wind, self.wind),
            (RelayChannel::Grid, self.grid),
            (RelayChannel::Load, self.load),
        ]
    }
}

/// One evaluation of the dispatch rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchDecision {
    /// Rule applied
    pub rule: DispatchRule,
    /// Proposed relay changes
    pub proposal: RelayProposal,
    /// Generation minus consumption (W)
    pub balance_w: f32,
    /// Battery charging posture
    pub charge: ChargeIntent,
    /// SOC at or below the critical level
    pub critical_soc: bool,
    /// Energy left in the battery (Wh)
    pub stored_energy_wh: f32,
    /// Hours until empty at the current deficit
    pub autonomy_h: Option<f32>,
    /// Solar output over incident irradiance
    pub solar_efficiency: Option<f32>,
}

/// Dispatch rule engine
#[derive(Debug, Clone)]
pub struct DispatchStrategy {
    thresholds: DispatchThresholds,
}

impl DispatchStrategy {
    /// Strategy with the given thresholds
    pub fn new(thresholds: DispatchThresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> &DispatchThresholds {
        &self.thresholds
    }

    /// Apply the rules to one set of readings
    pub fn evaluate(&self, soc: f32, solar_w: f32, wind_w: f32, load_w: f32) -> DispatchDecision {
        let t = &self.thresholds;
        let generation = solar_w + wind_w;
        let balance_w = generation - load_w;

        let solar = Some(solar_w > t.branch_min_power_w);
        let wind = Some(wind_w > t.branch_min_power_w);

        let (rule, proposal) = if generation >= load_w {
            (DispatchRule::Renewables, RelayProposal { solar, wind, grid: None, load: Some(true) })
        } else if soc > t.min_discharge_pct {
            (DispatchRule::Battery, RelayProposal { solar, wind, grid: None, load: Some(true) })
        } else {
            (DispatchRule::GridBackup, RelayProposal { solar, wind, grid: Some(true), load: Some(true) })
        };

        let charge = match rule {
            DispatchRule::Renewables if soc >= t.max_charge_pct => ChargeIntent::Full,
            DispatchRule::Renewables
                if balance_w > t.charge_surplus_w && soc >= t.min_discharge_pct =>
            {
                ChargeIntent::Charging
            }
            _ => ChargeIntent::Idle,
        };

        let critical_soc = soc <= t.critical_pct;
        if critical_soc {
            log_warn!("battery critical, reduce consumption");
        }
        log_debug!("dispatch: rule {:?}, balance {} W", rule, balance_w);

        DispatchDecision {
            rule,
            proposal,
            balance_w,
            charge,
            critical_soc,
            stored_energy_wh: 0.0,
            autonomy_h: None,
            solar_efficiency: None,
        }
    }

    /// Apply the rules to a snapshot, filling in the energy figures
    pub fn decide(&self, snapshot: &SensorSnapshot, dynamic: &DynamicConfig) -> DispatchDecision {
        let mut decision =
            self.evaluate(snapshot.soc_pct, snapshot.solar_w, snapshot.wind_w, snapshot.load_w);

        decision.stored_energy_wh = snapshot.soc_pct / 100.0 * dynamic.battery_capacity_wh;
        decision.autonomy_h = (decision.balance_w < 0.0)
            .then(|| decision.stored_energy_wh / -decision.balance_w);

        let incident_w = snapshot.irradiance_w_m2 * dynamic.panel_area_m2;
        decision.solar_efficiency = (incident_w > 0.0).then(|| snapshot.solar_w / incident_w);

        decision
    }

    /// Push a decision through the interlock
    ///
    /// Every proposed channel is attempted; the first rejection or driver
    /// failure is returned.
    pub fn apply<O: RelayOutputs, D: DelayNs>(
        &self,
        decision: &DispatchDecision,
        relays: &mut RelayInterlock<'_, O, D>,
        now: Timestamp,
    ) -> InterlockResult<()> {
        let mut first_error = None;
        for (channel, wanted) in decision.proposal.entries() {
            let Some(on) = wanted else { continue };
            if let Err(err) = relays.set(channel, on, now) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
