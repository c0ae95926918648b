//! One coherent reading cycle
//!
//! A [`SensorSnapshot`] is built in full by the conditioner from a single
//! [`RawFrame`] and published by swap; consumers always see every field
//! from the same acquisition tick.

use crate::frontend::{AnalogChannel, RawFrame, CHANNEL_COUNT};
use crate::time::Timestamp;

/// Uncalibrated pin voltages (0 to ADC reference)
///
/// Reported for field calibration of the dividers and shunt amplifiers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrontEndVolts {
    /// Mean of the three battery taps
    pub battery_v: f32,
    /// Wind shunt after DC recovery
    pub wind_dc_v: f32,
    /// Solar shunt
    pub solar_v: f32,
    /// Load shunt
    pub load_v: f32,
}

impl FrontEndVolts {
    const ZERO: Self = Self { battery_v: 0.0, wind_dc_v: 0.0, solar_v: 0.0, load_v: 0.0 };
}

/// Calibrated readings from one acquisition tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    /// Capture time (ms since boot)
    pub timestamp: Timestamp,
    /// Publish counter value of this snapshot
    pub sample: u32,
    /// Mean raw code per channel
    pub raw: RawFrame,
    /// Per-tap battery voltage, 0 when the tap is absent (V)
    pub battery_v: [f32; 3],
    /// Mean over connected taps (V)
    pub battery_avg_v: f32,
    /// Solar branch current, positive into the bus (A)
    pub solar_a: f32,
    /// Wind branch current (A)
    pub wind_a: f32,
    /// Load current (A)
    pub load_a: f32,
    /// Solar branch power (W)
    pub solar_w: f32,
    /// Wind branch power (W)
    pub wind_w: f32,
    /// Load power (W)
    pub load_w: f32,
    /// Solar irradiance (W/m²)
    pub irradiance_w_m2: f32,
    /// Wind speed (m/s)
    pub wind_speed_ms: f32,
    /// Generator electrical frequency (Hz)
    pub electrical_hz: f32,
    /// Measured rotor speed (RPM)
    pub turbine_rpm: f32,
    /// Battery state of charge (%)
    pub soc_pct: f32,
    /// Ambient temperature (°C)
    pub temperature_c: f32,
    /// Stage-1 pin voltages
    pub front_end: FrontEndVolts,
}

impl SensorSnapshot {
    /// All-zero snapshot present before the first acquisition
    pub const fn empty() -> Self {
        Self {
            timestamp: 0,
            sample: 0,
            raw: RawFrame::from_codes([0; CHANNEL_COUNT]),
            battery_v: [0.0; 3],
            battery_avg_v: 0.0,
            solar_a: 0.0,
            wind_a: 0.0,
            load_a: 0.0,
            solar_w: 0.0,
            wind_w: 0.0,
            load_w: 0.0,
            irradiance_w_m2: 0.0,
            wind_speed_ms: 0.0,
            electrical_hz: 0.0,
            turbine_rpm: 0.0,
            soc_pct: 0.0,
            temperature_c: 0.0,
            front_end: FrontEndVolts::ZERO,
        }
    }

    /// Solar plus wind power (W)
    pub fn generation_w(&self) -> f32 {
        self.solar_w + self.wind_w
    }

    /// Generation minus consumption (W)
    pub fn balance_w(&self) -> f32 {
        self.generation_w() - self.load_w
    }

    /// Raw code of `channel`
    pub fn raw_code(&self, channel: AnalogChannel) -> u16 {
        self.raw.code(channel)
    }

    /// Whether battery tap `tap` read as absent (floor or plausibility reject)
    pub fn battery_tap_absent(&self, tap: usize) -> bool {
        self.battery_v.get(tap).map_or(true, |v| *v == 0.0)
    }
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
