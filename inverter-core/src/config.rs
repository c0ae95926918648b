//! Deployment configuration
//!
//! Two kinds of configuration reach the core:
//!
//! - [`CalibrationConfig`]: fixed per hardware revision, loaded once at
//!   startup and never mutated afterwards. Hardware revisions are named
//!   profiles of this one struct (see the `inverter-schemas` crate), never
//!   copies of a header file.
//! - [`DynamicConfig`]: tunables written at any time by the external
//!   configuration collaborator through [`crate::store::SharedStateStore`]
//!   and re-read by the core on every evaluation.
//!
//! Durations are stored as plain integers so profiles stay readable JSON;
//! the accessors hand them out as `fugit` durations.

use fugit::{MicrosDurationU32, MillisDurationU64};
use thiserror_no_std::Error;

use crate::constants::{adc, dispatch, protection, timing, turbine};

/// Current calibration layout revision
pub const CALIBRATION_REVISION: u16 = 2;

/// Calibration profile rejected by [`CalibrationConfig::validate`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value that makes a conversion meaningless
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Profile written for a different calibration layout
    #[error("unsupported calibration revision {found}")]
    UnsupportedRevision {
        /// Revision found in the profile
        found: u16,
    },
}

/// ADC converter characteristics
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdcCalibration {
    /// Full-scale code
    pub max_code: u16,
    /// Voltage at full scale (V)
    pub reference_v: f32,
}

impl AdcCalibration {
    /// Pin voltage for a raw code
    pub fn code_to_volts(&self, code: u16) -> f32 {
        code as f32 * self.reference_v / self.max_code as f32
    }
}

/// Battery voltage divider channels
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoltageCalibration {
    /// Volts per code after the divider
    pub factor_v_per_code: f32,
    /// Codes below this read as disconnected
    pub floor_code: u16,
    /// Lowest plausible reading (V)
    pub plausible_min_v: f32,
    /// Highest plausible reading (V)
    pub plausible_max_v: f32,
}

/// Bidirectional shunt current channels
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentCalibration {
    /// Amps per code
    pub factor_a_per_code: f32,
    /// Code at zero current
    pub zero_code: u16,
    /// Negative offsets within this many codes keep a positive sign
    pub sign_deadband_codes: u16,
    /// Magnitudes below this are reported as zero (A)
    pub noise_floor_a: f32,
}

/// Anemometer conversion
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindCalibration {
    /// Pulses per cup revolution
    pub pulses_per_rev: u8,
    /// Cup radius (m)
    pub radius_m: f32,
    /// Cup speed to wind speed correction
    pub correction: f32,
    /// Measurement window (ms)
    pub window_ms: u32,
}

impl WindCalibration {
    /// Measurement window
    pub fn window(&self) -> MillisDurationU64 {
        MillisDurationU64::millis(self.window_ms as u64)
    }
}

/// Generator electrical-frequency input
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RpmCalibration {
    /// Accepted edges per electrical cycle
    pub edges_per_cycle: u8,
    /// Generator pole pairs
    pub pole_pairs: u8,
    /// Rotor to generator gear ratio
    pub gear_ratio: f32,
    /// Measurement window (ms)
    pub window_ms: u32,
    /// Minimum spacing between accepted edges (µs)
    pub debounce_us: u32,
}

impl RpmCalibration {
    /// Measurement window
    pub fn window(&self) -> MillisDurationU64 {
        MillisDurationU64::millis(self.window_ms as u64)
    }

    /// Edge debounce interval
    pub fn debounce(&self) -> MicrosDurationU32 {
        MicrosDurationU32::micros(self.debounce_us)
    }
}

/// State-of-charge interpolation endpoints
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryCalibration {
    /// Terminal voltage at 0 % (V)
    pub empty_v: f32,
    /// Terminal voltage at 100 % (V)
    pub full_v: f32,
}

/// Biquad low-pass design parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterSpec {
    /// Rate the filter is stepped at (Hz)
    pub sample_rate_hz: f32,
    /// Cutoff frequency (Hz)
    pub cutoff_hz: f32,
    /// Quality factor
    pub q: f32,
}

/// Samples and pacing for one group of channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelPlan {
    /// Samples averaged per acquisition
    pub samples: u8,
    /// Gap between consecutive samples (µs)
    pub gap_us: u32,
}

impl ChannelPlan {
    /// Gap between consecutive samples
    pub fn gap(&self) -> MicrosDurationU32 {
        MicrosDurationU32::micros(self.gap_us)
    }

    fn span_us(&self) -> u64 {
        self.samples as u64 * self.gap_us as u64
    }
}

/// Acquisition tick and per-channel sample counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplingPlan {
    /// Acquisition tick (ms); one frame is published per tick
    pub period_ms: u32,
    /// Battery voltage channels
    pub battery: ChannelPlan,
    /// Current channels
    pub current: ChannelPlan,
    /// Irradiance channel
    pub irradiance: ChannelPlan,
}

impl SamplingPlan {
    /// Acquisition tick
    pub fn period(&self) -> MillisDurationU64 {
        MillisDurationU64::millis(self.period_ms as u64)
    }

    /// Sampling time of one frame, ignoring conversion time
    pub fn frame_span(&self) -> MicrosDurationU32 {
        let span_us = 3 * self.battery.span_us()
            + 3 * self.current.span_us()
            + self.irradiance.span_us();
        MicrosDurationU32::micros(span_us.min(u32::MAX as u64) as u32)
    }
}

/// Turbine overspeed limits and brake timing
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtectionLimits {
    /// Maximum safe wind speed (m/s)
    pub max_wind_ms: f32,
    /// Maximum safe average terminal voltage (V)
    pub max_voltage_v: f32,
    /// Maximum safe rotor speed (RPM)
    pub max_rpm: f32,
    /// Detection to brake engagement (ms)
    pub brake_delay_ms: u32,
    /// Minimum brake engagement before release (ms)
    pub min_dwell_ms: u32,
    /// Evaluation period (ms)
    pub evaluation_period_ms: u32,
    /// Wind relay drop to brake relay close (ms)
    pub relay_settle_ms: u32,
    /// Brake resistor (Ω)
    pub brake_resistance_ohm: f32,
    /// Brake resistor rating (W)
    pub brake_max_w: f32,
    /// Tip-speed ratio for the display RPM estimate
    pub tip_speed_ratio: f32,
    /// Rotor radius for the display RPM estimate (m)
    pub rotor_radius_m: f32,
}

impl ProtectionLimits {
    /// Detection to brake engagement
    pub fn brake_delay(&self) -> MillisDurationU64 {
        MillisDurationU64::millis(self.brake_delay_ms as u64)
    }

    /// Minimum brake engagement before release
    pub fn min_dwell(&self) -> MillisDurationU64 {
        MillisDurationU64::millis(self.min_dwell_ms as u64)
    }

    /// Evaluation period
    pub fn evaluation_period(&self) -> MillisDurationU64 {
        MillisDurationU64::millis(self.evaluation_period_ms as u64)
    }
}

impl Default for ProtectionLimits {
    fn default() -> Self {
        Self {
            max_wind_ms: protection::MAX_SAFE_WIND_MS,
            max_voltage_v: protection::MAX_SAFE_VOLTAGE_V,
            max_rpm: protection::MAX_SAFE_RPM,
            brake_delay_ms: protection::BRAKE_ACTIVATION_DELAY_MS,
            min_dwell_ms: protection::BRAKE_MIN_DWELL_MS,
            evaluation_period_ms: timing::PROTECTION_PERIOD_MS,
            relay_settle_ms: protection::RELAY_SETTLE_MS,
            brake_resistance_ohm: protection::BRAKE_RESISTANCE_OHM,
            brake_max_w: protection::BRAKE_RESISTOR_MAX_W,
            tip_speed_ratio: turbine::ASSUMED_TIP_SPEED_RATIO,
            rotor_radius_m: turbine::ROTOR_RADIUS_M,
        }
    }
}

/// Dispatch rule thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatchThresholds {
    /// Minimum discharge state of charge (%)
    pub min_discharge_pct: f32,
    /// Maximum charge state of charge (%)
    pub max_charge_pct: f32,
    /// Critical alarm state of charge (%)
    pub critical_pct: f32,
    /// Branch output needed to connect a renewable source (W)
    pub branch_min_power_w: f32,
    /// Surplus treated as charging (W)
    pub charge_surplus_w: f32,
}

impl Default for DispatchThresholds {
    fn default() -> Self {
        Self {
            min_discharge_pct: dispatch::SOC_MIN_DISCHARGE_PCT,
            max_charge_pct: dispatch::SOC_MAX_CHARGE_PCT,
            critical_pct: dispatch::SOC_CRITICAL_PCT,
            branch_min_power_w: dispatch::BRANCH_MIN_POWER_W,
            charge_surplus_w: dispatch::CHARGE_SURPLUS_W,
        }
    }
}

/// Fixed per-deployment constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationConfig {
    /// Layout revision the profile was written for
    pub revision: u16,
    /// ADC converter
    pub adc: AdcCalibration,
    /// Battery voltage channels
    pub voltage: VoltageCalibration,
    /// Current channels
    pub current: CurrentCalibration,
    /// W/m² per irradiance code
    pub irradiance_factor: f32,
    /// Anemometer
    pub wind: WindCalibration,
    /// Generator frequency input
    pub rpm: RpmCalibration,
    /// State-of-charge endpoints
    pub battery: BatteryCalibration,
    /// DC recovery filter for the rectified wind channel
    pub wind_filter: FilterSpec,
    /// Samples per channel
    pub sampling: SamplingPlan,
    /// Overspeed protection
    pub protection: ProtectionLimits,
    /// Dispatch rules
    pub dispatch: DispatchThresholds,
    /// Reported when no temperature probe is fitted (°C)
    pub default_temperature_c: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            revision: CALIBRATION_REVISION,
            adc: AdcCalibration {
                max_code: adc::ADC_MAX_CODE,
                reference_v: adc::ADC_REFERENCE_V,
            },
            voltage: VoltageCalibration {
                factor_v_per_code: adc::VOLTAGE_FACTOR_V_PER_CODE,
                floor_code: adc::VOLTAGE_FLOOR_CODE,
                plausible_min_v: adc::VOLTAGE_PLAUSIBLE_MIN_V,
                plausible_max_v: adc::VOLTAGE_PLAUSIBLE_MAX_V,
            },
            current: CurrentCalibration {
                factor_a_per_code: adc::CURRENT_FACTOR_A_PER_CODE,
                zero_code: adc::CURRENT_ZERO_CODE,
                sign_deadband_codes: adc::CURRENT_SIGN_DEADBAND_CODES,
                noise_floor_a: adc::CURRENT_NOISE_FLOOR_A,
            },
            irradiance_factor: adc::IRRADIANCE_FACTOR,
            wind: WindCalibration {
                pulses_per_rev: turbine::ANEMOMETER_PULSES_PER_REV,
                radius_m: turbine::ANEMOMETER_RADIUS_M,
                correction: turbine::ANEMOMETER_CORRECTION,
                window_ms: timing::WIND_WINDOW_MS,
            },
            rpm: RpmCalibration {
                edges_per_cycle: turbine::EDGES_PER_ELECTRICAL_CYCLE,
                pole_pairs: turbine::POLE_PAIRS,
                gear_ratio: turbine::GEAR_RATIO,
                window_ms: timing::RPM_WINDOW_MS,
                debounce_us: turbine::RPM_DEBOUNCE_US,
            },
            battery: BatteryCalibration {
                empty_v: adc::BATTERY_EMPTY_V,
                full_v: adc::BATTERY_FULL_V,
            },
            wind_filter: FilterSpec {
                sample_rate_hz: adc::WIND_FILTER_SAMPLE_RATE_HZ,
                cutoff_hz: adc::WIND_FILTER_CUTOFF_HZ,
                q: adc::BUTTERWORTH_Q,
            },
            sampling: SamplingPlan {
                period_ms: timing::ACQUISITION_PERIOD_MS,
                battery: ChannelPlan {
                    samples: timing::BATTERY_SAMPLES,
                    gap_us: timing::BATTERY_SAMPLE_GAP_US,
                },
                current: ChannelPlan {
                    samples: timing::CURRENT_SAMPLES,
                    gap_us: timing::CURRENT_SAMPLE_GAP_US,
                },
                irradiance: ChannelPlan {
                    samples: timing::IRRADIANCE_SAMPLES,
                    gap_us: timing::IRRADIANCE_SAMPLE_GAP_US,
                },
            },
            protection: ProtectionLimits::default(),
            dispatch: DispatchThresholds::default(),
            default_temperature_c: adc::DEFAULT_TEMPERATURE_C,
        }
    }
}

impl CalibrationConfig {
    /// Highest battery voltage the divider can report (V)
    pub fn voltage_ceiling_v(&self) -> f32 {
        self.adc.max_code as f32 * self.voltage.factor_v_per_code
    }

    /// Reject profiles whose conversions would divide by zero, invert or never trip
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.revision != CALIBRATION_REVISION {
            return Err(ConfigError::UnsupportedRevision { found: self.revision });
        }

        check(self.adc.max_code > 0, "adc.max_code", "must be non-zero")?;
        check(self.adc.reference_v > 0.0, "adc.reference_v", "must be positive")?;

        check(self.voltage.factor_v_per_code > 0.0, "voltage.factor_v_per_code", "must be positive")?;
        check(
            self.voltage.plausible_min_v < self.voltage.plausible_max_v,
            "voltage.plausible_min_v",
            "must be below plausible_max_v",
        )?;
        // An overvoltage clamped to "absent" could never trip the protection
        check(
            self.voltage.plausible_max_v > self.protection.max_voltage_v,
            "voltage.plausible_max_v",
            "must exceed protection.max_voltage_v",
        )?;
        check(
            self.voltage_ceiling_v() > self.protection.max_voltage_v,
            "protection.max_voltage_v",
            "must be below the divider's full-scale reading",
        )?;

        check(self.current.factor_a_per_code > 0.0, "current.factor_a_per_code", "must be positive")?;
        check(self.current.zero_code <= self.adc.max_code, "current.zero_code", "outside ADC range")?;

        check(self.wind.pulses_per_rev > 0, "wind.pulses_per_rev", "must be non-zero")?;
        check(self.wind.window_ms > 0, "wind.window_ms", "must be non-zero")?;

        check(self.rpm.edges_per_cycle > 0, "rpm.edges_per_cycle", "must be non-zero")?;
        check(self.rpm.pole_pairs > 0, "rpm.pole_pairs", "must be non-zero")?;
        check(self.rpm.gear_ratio > 0.0, "rpm.gear_ratio", "must be positive")?;
        check(self.rpm.window_ms > 0, "rpm.window_ms", "must be non-zero")?;
        // An empty window then proves the last edge is older than the debounce
        check(
            self.rpm.window_ms as u64 * 1000 > self.rpm.debounce_us as u64,
            "rpm.debounce_us",
            "must be shorter than rpm.window_ms",
        )?;

        check(self.battery.empty_v < self.battery.full_v, "battery.empty_v", "must be below full_v")?;

        check(self.wind_filter.sample_rate_hz > 0.0, "wind_filter.sample_rate_hz", "must be positive")?;
        check(self.wind_filter.q > 0.0, "wind_filter.q", "must be positive")?;
        check(
            self.wind_filter.cutoff_hz > 0.0
                && self.wind_filter.cutoff_hz < self.wind_filter.sample_rate_hz / 2.0,
            "wind_filter.cutoff_hz",
            "must lie between 0 and Nyquist",
        )?;

        check(self.sampling.battery.samples > 0, "sampling.battery.samples", "must be non-zero")?;
        check(self.sampling.current.samples > 0, "sampling.current.samples", "must be non-zero")?;
        check(self.sampling.irradiance.samples > 0, "sampling.irradiance.samples", "must be non-zero")?;
        check(self.sampling.period_ms > 0, "sampling.period_ms", "must be non-zero")?;
        check(
            (self.sampling.frame_span().ticks() as u64) < self.sampling.period_ms as u64 * 1000,
            "sampling.period_ms",
            "too short for one frame of samples",
        )?;
        // The biquad is stepped once per published frame
        let tick_rate_hz = 1000.0 / self.sampling.period_ms as f32;
        check(
            libm::fabsf(tick_rate_hz - self.wind_filter.sample_rate_hz)
                <= self.wind_filter.sample_rate_hz * 1e-3,
            "wind_filter.sample_rate_hz",
            "must match the acquisition tick",
        )?;

        check(self.protection.evaluation_period_ms > 0, "protection.evaluation_period_ms", "must be non-zero")?;
        check(self.protection.brake_resistance_ohm > 0.0, "protection.brake_resistance_ohm", "must be positive")?;
        check(self.protection.rotor_radius_m > 0.0, "protection.rotor_radius_m", "must be positive")?;

        check(
            self.dispatch.critical_pct <= self.dispatch.min_discharge_pct
                && self.dispatch.min_discharge_pct < self.dispatch.max_charge_pct,
            "dispatch.min_discharge_pct",
            "thresholds must satisfy critical <= min_discharge < max_charge",
        )?;

        Ok(())
    }
}

fn check(ok: bool, field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason })
    }
}

/// Tunables updatable from outside the core
///
/// Replaced whole through the shared store; the core re-reads it on every
/// evaluation, no restart needed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynamicConfig {
    /// Battery bank capacity (Wh)
    pub battery_capacity_wh: f32,
    /// Solar panel area (m²)
    pub panel_area_m2: f32,
    /// Rated turbine power (W)
    pub rated_turbine_power_w: f32,
    /// Overspeed protection may start new episodes
    pub protection_enabled: bool,
}

impl DynamicConfig {
    /// Compile-time defaults, usable in `static` initializers
    pub const fn new() -> Self {
        Self {
            battery_capacity_wh: dispatch::BATTERY_CAPACITY_WH,
            panel_area_m2: dispatch::SOLAR_PANEL_AREA_M2,
            rated_turbine_power_w: dispatch::RATED_TURBINE_POWER_W,
            protection_enabled: true,
        }
    }
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        assert_eq!(CalibrationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn plausibility_window_must_enclose_trip_limit() {
        let mut config = CalibrationConfig::default();
        config.voltage.plausible_max_v = 65.0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "voltage.plausible_max_v", .. })
        ));
    }

    #[test]
    fn trip_limit_must_be_readable() {
        let mut config = CalibrationConfig::default();
        assert!(config.voltage_ceiling_v() > config.protection.max_voltage_v);

        config.protection.max_voltage_v = 65.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "protection.max_voltage_v", .. })
        ));
    }

    #[test]
    fn filter_rate_follows_acquisition_tick() {
        let mut config = CalibrationConfig::default();
        config.sampling.period_ms = 50;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "wind_filter.sample_rate_hz", .. })
        ));

        config.wind_filter.sample_rate_hz = 20.0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn tick_must_fit_a_frame() {
        let mut config = CalibrationConfig::default();
        assert_eq!(config.sampling.frame_span().ticks(), 13_600);

        config.sampling.period_ms = 10;
        config.wind_filter.sample_rate_hz = 100.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "sampling.period_ms", .. })
        ));
    }

    #[test]
    fn debounce_longer_than_window_rejected() {
        let mut config = CalibrationConfig::default();
        config.rpm.debounce_us = config.rpm.window_ms * 1000;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "rpm.debounce_us", .. })
        ));
    }

    #[test]
    fn cutoff_above_nyquist_rejected() {
        let mut config = CalibrationConfig::default();
        config.wind_filter.cutoff_hz = config.wind_filter.sample_rate_hz;

        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_pole_pairs_rejected() {
        let mut config = CalibrationConfig::default();
        config.rpm.pole_pairs = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn old_revision_rejected() {
        let config = CalibrationConfig { revision: 1, ..CalibrationConfig::default() };

        assert_eq!(config.validate(), Err(ConfigError::UnsupportedRevision { found: 1 }));
    }

    #[test]
    fn durations_convert() {
        let limits = ProtectionLimits::default();
        assert_eq!(limits.brake_delay().to_millis(), 2_000);
        assert_eq!(limits.min_dwell().to_millis(), 10_000);

        let rpm = CalibrationConfig::default().rpm;
        assert_eq!(rpm.debounce().to_micros(), 500);
    }

    #[test]
    fn adc_scaling() {
        let adc = CalibrationConfig::default().adc;
        assert!((adc.code_to_volts(4095) - 3.3).abs() < 1e-5);
        assert_eq!(adc.code_to_volts(0), 0.0);
    }
}
