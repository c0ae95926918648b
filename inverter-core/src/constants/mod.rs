//! Constants for the inverter core
//!
//! Default values for the reference hardware revision (ESP32 internal ADC,
//! shunt + op-amp current sensing, reed-switch anemometer, 10 pole-pair
//! direct-drive generator). Every value here can be overridden per
//! deployment through [`crate::config::CalibrationConfig`].
//!
//! ## Organization
//!
//! - **Adc**: converter resolution, divider and shunt scaling, noise floors
//! - **Turbine**: anemometer and generator conversion factors
//! - **Protection**: overspeed limits, brake timing, brake resistor rating
//! - **Dispatch**: state-of-charge thresholds and branch power thresholds
//! - **Timing**: task cadences, measurement windows, sampling plans

/// ADC resolution, calibration factors and sensor-absent floors.
pub mod adc;

/// Anemometer and generator conversion factors.
pub mod turbine;

/// Overspeed limits and brake timing.
pub mod protection;

/// Battery state-of-charge and power thresholds for the dispatch rules.
pub mod dispatch;

/// Task cadences, measurement windows and per-channel sample counts.
pub mod timing;

pub use adc::{ADC_MAX_CODE, ADC_REFERENCE_V, VOLTAGE_FLOOR_CODE, CURRENT_ZERO_CODE};
pub use dispatch::{SOC_MIN_DISCHARGE_PCT, SOC_MAX_CHARGE_PCT, SOC_CRITICAL_PCT};
pub use protection::{MAX_SAFE_WIND_MS, MAX_SAFE_VOLTAGE_V, MAX_SAFE_RPM};
pub use timing::{ACQUISITION_PERIOD_MS, PROTECTION_PERIOD_MS};
