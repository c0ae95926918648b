//! ADC and analog calibration defaults
//!
//! The ESP32 ADC runs at 12 bits with 11 dB attenuation, so codes span
//! 0..=4095 over 0..=3.3 V.

/// Full-scale ADC code (12-bit converter).
pub const ADC_MAX_CODE: u16 = 4095;

/// ADC reference voltage at 11 dB attenuation (V).
pub const ADC_REFERENCE_V: f32 = 3.3;

// ===== VOLTAGE CHANNELS =====

/// Volts per ADC code on the battery channels.
///
/// 100k/10k divider (×11) over the 3.3 V / 4095 code step. Full scale
/// reads just under 60 V.
pub const VOLTAGE_FACTOR_V_PER_CODE: f32 = 0.01465;

/// Codes below this mean a floating, disconnected input (~0.08 V at the pin).
pub const VOLTAGE_FLOOR_CODE: u16 = 100;

/// Lowest plausible bank voltage (V). Anything below reads as absent.
pub const VOLTAGE_PLAUSIBLE_MIN_V: f32 = 10.0;

/// Highest plausible bank voltage (V). Anything above reads as absent.
///
/// Must stay above [`super::protection::MAX_SAFE_VOLTAGE_V`], otherwise an
/// overvoltage would be reported as a missing sensor and never trip.
pub const VOLTAGE_PLAUSIBLE_MAX_V: f32 = 80.0;

// ===== CURRENT CHANNELS =====

/// Amps per ADC code: 300 A shunt (75 mV) behind a 44× op-amp.
pub const CURRENT_FACTOR_A_PER_CODE: f32 = 0.0732;

/// ADC code at zero current (mid-rail bias).
pub const CURRENT_ZERO_CODE: u16 = 2048;

/// Offset-subtracted codes inside ±this band never flip the sign negative.
pub const CURRENT_SIGN_DEADBAND_CODES: u16 = 10;

/// Currents below this magnitude are reported as exactly zero (A).
pub const CURRENT_NOISE_FLOOR_A: f32 = 0.5;

// ===== IRRADIANCE =====

/// W/m² per ADC code: LDR spanning 0..=1200 W/m² over full scale.
pub const IRRADIANCE_FACTOR: f32 = 0.293;

// ===== BATTERY =====

/// Terminal voltage read as 0 % state of charge (48 V lead-acid bank).
pub const BATTERY_EMPTY_V: f32 = 44.0;

/// Terminal voltage read as 100 % state of charge.
pub const BATTERY_FULL_V: f32 = 54.0;

/// Temperature reported when no probe is fitted (°C).
pub const DEFAULT_TEMPERATURE_C: f32 = 25.0;

// ===== WIND CHANNEL FILTER =====

/// Rate at which the rectified wind channel is filtered (one sample per acquisition tick).
pub const WIND_FILTER_SAMPLE_RATE_HZ: f32 = 10.0;

/// Low-pass cutoff for recovering the DC level of the rectified wind channel.
pub const WIND_FILTER_CUTOFF_HZ: f32 = 1.0;

/// Butterworth quality factor (1/√2).
pub const BUTTERWORTH_Q: f32 = 0.707_106_77;
