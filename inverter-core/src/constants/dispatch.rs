//! Dispatch thresholds

/// Do not discharge the battery below this state of charge (%).
pub const SOC_MIN_DISCHARGE_PCT: f32 = 25.0;

/// Do not charge the battery above this state of charge (%).
pub const SOC_MAX_CHARGE_PCT: f32 = 80.0;

/// State of charge reported as a critical alarm (%).
pub const SOC_CRITICAL_PCT: f32 = 10.0;

/// A renewable branch is connected only above this output (W).
pub const BRANCH_MIN_POWER_W: f32 = 50.0;

/// Surplus above which the battery is considered charging (W).
pub const CHARGE_SURPLUS_W: f32 = 100.0;

/// Default battery bank capacity (Wh).
pub const BATTERY_CAPACITY_WH: f32 = 5_000.0;

/// Default solar panel area (m²).
pub const SOLAR_PANEL_AREA_M2: f32 = 16.0;

/// Default rated turbine power (W).
pub const RATED_TURBINE_POWER_W: f32 = 2_000.0;
