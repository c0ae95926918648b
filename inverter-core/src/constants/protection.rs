//! Turbine overspeed protection limits

/// Maximum safe wind speed (m/s).
pub const MAX_SAFE_WIND_MS: f32 = 25.0;

/// Maximum safe average terminal voltage (V).
///
/// Kept below the divider's full-scale reading
/// (4095 × [`super::adc::VOLTAGE_FACTOR_V_PER_CODE`] ≈ 60 V), otherwise
/// the measured voltage could never exceed it.
pub const MAX_SAFE_VOLTAGE_V: f32 = 58.0;

/// Maximum safe mechanical rotor speed (RPM).
pub const MAX_SAFE_RPM: f32 = 500.0;

/// Time from trip detection to brake engagement (ms).
pub const BRAKE_ACTIVATION_DELAY_MS: u32 = 2_000;

/// Minimum time the brake stays engaged before it may release (ms).
pub const BRAKE_MIN_DWELL_MS: u32 = 10_000;

/// Pause between dropping the wind relay and closing the brake relay (ms).
pub const RELAY_SETTLE_MS: u32 = 100;

/// Brake resistor value (Ω).
pub const BRAKE_RESISTANCE_OHM: f32 = 10.0;

/// Brake resistor power rating (W).
pub const BRAKE_RESISTOR_MAX_W: f32 = 2_000.0;
