//! Anemometer and generator conversion factors

/// Anemometer pulses per cup revolution (one magnet, one reed switch).
pub const ANEMOMETER_PULSES_PER_REV: u8 = 1;

/// Anemometer cup radius (m).
pub const ANEMOMETER_RADIUS_M: f32 = 0.1;

/// Empirical correction from cup speed to free-stream wind speed.
pub const ANEMOMETER_CORRECTION: f32 = 1.18;

/// Rising edges per electrical cycle on the generator frequency input.
pub const EDGES_PER_ELECTRICAL_CYCLE: u8 = 1;

/// Generator pole pairs.
pub const POLE_PAIRS: u8 = 10;

/// Gearbox ratio between rotor and generator (1.0 = direct drive).
pub const GEAR_RATIO: f32 = 1.0;

/// Minimum spacing between accepted generator edges (µs).
pub const RPM_DEBOUNCE_US: u32 = 500;

/// Tip-speed ratio assumed for the display-only RPM estimate.
pub const ASSUMED_TIP_SPEED_RATIO: f32 = 6.0;

/// Rotor radius used by the display-only RPM estimate (m).
pub const ROTOR_RADIUS_M: f32 = 1.0;
