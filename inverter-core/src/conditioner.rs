//! Raw codes and edge counts to physical quantities
//!
//! Conversion rules:
//!
//! - Voltage taps: code below the floor is a floating input and reads 0 V;
//!   a converted value outside the plausibility window also reads 0 V.
//!   The raw code is always kept so "absent" and "zero" stay distinguishable.
//! - Currents are bidirectional around a zero code. Small negative offsets
//!   inside the dead-band keep a positive sign, and magnitudes under the
//!   noise floor read exactly 0 A.
//! - Branch power is the mean battery voltage times the branch current.
//! - Wind speed and rotor speed come from [`PulseTimers`] drained over their
//!   own windows; between windows the previous value is held.
//! - The rectified wind channel is passed through a persistent biquad to
//!   recover its DC level.
//!
//! No conversion ever fails. A missing sensor is a zero value next to its
//! raw code.

use core::f32::consts::PI;

use crate::config::CalibrationConfig;
use crate::filter::Biquad;
use crate::frontend::{AdcReader, AnalogChannel, AnalogFrontEnd, RawFrame};
use crate::pulse::{PulseTimers, RateWindow};
use crate::snapshot::{FrontEndVolts, SensorSnapshot};
use crate::time::{TimeSource, Timestamp};

const BATTERY_TAPS: [AnalogChannel; 3] = [
    AnalogChannel::BatteryVoltage1,
    AnalogChannel::BatteryVoltage2,
    AnalogChannel::BatteryVoltage3,
];

/// Derives a [`SensorSnapshot`] from one [`RawFrame`] plus the pulse counters
pub struct SignalConditioner {
    calibration: CalibrationConfig,
    wind_filter: Biquad,
    wind_window: RateWindow,
    rpm_window: RateWindow,
}

impl SignalConditioner {
    /// Conditioner for a calibration profile
    pub fn new(calibration: &CalibrationConfig) -> Self {
        Self {
            calibration: *calibration,
            wind_filter: Biquad::lowpass(&calibration.wind_filter),
            wind_window: RateWindow::new(calibration.wind.window()),
            rpm_window: RateWindow::new(calibration.rpm.window()),
        }
    }

    /// Calibration in use
    pub fn calibration(&self) -> &CalibrationConfig {
        &self.calibration
    }

    /// Battery tap voltage for a mean code (V), 0 when absent
    pub fn voltage(&self, code: u16) -> f32 {
        let cal = &self.calibration.voltage;
        if code < cal.floor_code {
            return 0.0;
        }

        let volts = code as f32 * cal.factor_v_per_code;
        if volts < cal.plausible_min_v || volts > cal.plausible_max_v {
            return 0.0;
        }
        volts
    }

    /// Signed branch current for a mean code (A)
    pub fn current(&self, code: u16) -> f32 {
        let cal = &self.calibration.current;
        let offset = code as i32 - cal.zero_code as i32;
        let magnitude = offset.unsigned_abs() as f32 * cal.factor_a_per_code;

        if magnitude < cal.noise_floor_a {
            return 0.0;
        }
        if offset < -(cal.sign_deadband_codes as i32) {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Irradiance for a mean photoresistor code (W/m²)
    pub fn irradiance(&self, code: u16) -> f32 {
        code as f32 * self.calibration.irradiance_factor
    }

    /// State of charge for a terminal voltage (%), clamped to 0..=100
    pub fn state_of_charge(&self, volts: f32) -> f32 {
        let cal = &self.calibration.battery;
        let soc = (volts - cal.empty_v) / (cal.full_v - cal.empty_v) * 100.0;
        soc.clamp(0.0, 100.0)
    }

    /// Wind speed for an anemometer pulse rate (m/s)
    pub fn wind_speed(&self, pulses_per_s: f32) -> f32 {
        let cal = &self.calibration.wind;
        let rps = pulses_per_s / cal.pulses_per_rev as f32;
        2.0 * PI * cal.radius_m * rps * cal.correction
    }

    /// Electrical frequency (Hz) and rotor RPM for an accepted edge rate
    pub fn rotor_speed(&self, edges_per_s: f32) -> (f32, f32) {
        let cal = &self.calibration.rpm;
        let hz = edges_per_s / cal.edges_per_cycle as f32;
        let rpm = hz * 60.0 / (cal.pole_pairs as f32 * cal.gear_ratio);
        (hz, rpm)
    }

    /// Build the snapshot for `frame`, captured at `now`
    ///
    /// Steps the wind DC filter exactly once and drains each pulse counter
    /// only when its window has elapsed.
    pub fn condition(
        &mut self,
        frame: &RawFrame,
        pulses: &PulseTimers,
        temperature_c: Option<f32>,
        now: Timestamp,
    ) -> SensorSnapshot {
        let mut battery_v = [0.0f32; 3];
        let mut connected = 0u8;
        let mut sum = 0.0f32;
        for (slot, tap) in battery_v.iter_mut().zip(BATTERY_TAPS) {
            *slot = self.voltage(frame.code(tap));
            if *slot > 0.0 {
                sum += *slot;
                connected += 1;
            }
        }
        let battery_avg_v = if connected > 0 { sum / connected as f32 } else { 0.0 };

        let solar_a = self.current(frame.code(AnalogChannel::SolarCurrent));
        let wind_a = self.current(frame.code(AnalogChannel::WindCurrent));
        let load_a = self.current(frame.code(AnalogChannel::LoadCurrent));

        let anemometer_hz = self.wind_window.sample(&pulses.anemometer, now);
        let edge_hz = self.rpm_window.sample(&pulses.turbine, now);
        let (electrical_hz, turbine_rpm) = self.rotor_speed(edge_hz);

        let adc = self.calibration.adc;
        let tap_codes: u32 = BATTERY_TAPS.iter().map(|tap| frame.code(*tap) as u32).sum();
        let front_end = FrontEndVolts {
            battery_v: tap_codes as f32 / BATTERY_TAPS.len() as f32 * adc.reference_v
                / adc.max_code as f32,
            wind_dc_v: self
                .wind_filter
                .process(adc.code_to_volts(frame.code(AnalogChannel::WindCurrent))),
            solar_v: adc.code_to_volts(frame.code(AnalogChannel::SolarCurrent)),
            load_v: adc.code_to_volts(frame.code(AnalogChannel::LoadCurrent)),
        };

        SensorSnapshot {
            timestamp: now,
            sample: 0,
            raw: *frame,
            battery_v,
            battery_avg_v,
            solar_a,
            wind_a,
            load_a,
            solar_w: battery_avg_v * solar_a,
            wind_w: battery_avg_v * wind_a,
            load_w: battery_avg_v * load_a,
            irradiance_w_m2: self.irradiance(frame.code(AnalogChannel::Irradiance)),
            wind_speed_ms: self.wind_speed(anemometer_hz),
            electrical_hz,
            turbine_rpm,
            soc_pct: self.state_of_charge(battery_avg_v),
            temperature_c: temperature_c
                .filter(|t| t.is_finite())
                .unwrap_or(self.calibration.default_temperature_c),
            front_end,
        }
    }

    /// Sample every channel and build a snapshot in one call
    pub fn acquire<A: AdcReader, T: TimeSource>(
        &mut self,
        front_end: &mut AnalogFrontEnd,
        adc: &mut A,
        pulses: &PulseTimers,
        clock: &T,
    ) -> SensorSnapshot {
        let frame = front_end.acquire_blocking(adc, clock);
        self.condition(&frame, pulses, None, clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::CHANNEL_COUNT;
    use proptest::prelude::*;

    fn conditioner() -> SignalConditioner {
        SignalConditioner::new(&CalibrationConfig::default())
    }

    fn frame(battery: [u16; 3], solar: u16, wind: u16, load: u16, ldr: u16) -> RawFrame {
        let codes: [u16; CHANNEL_COUNT] =
            [battery[0], battery[1], battery[2], solar, wind, load, ldr];
        RawFrame::from_codes(codes)
    }

    #[test]
    fn voltage_plausibility_window() {
        let cond = conditioner();
        // 3000 codes → 43.95 V
        assert!((cond.voltage(3000) - 43.95).abs() < 0.01);
        // 500 codes → 7.3 V, below the window
        assert_eq!(cond.voltage(500), 0.0);
        // Full scale → 60 V, inside the window
        assert!(cond.voltage(4095) > 59.0);
    }

    #[test]
    fn current_direction_and_deadband() {
        let cond = conditioner();
        assert_eq!(cond.current(2048), 0.0);
        // 8 codes below zero: above the noise floor but inside the sign dead-band
        assert!(cond.current(2040) > 0.0);
        assert!(cond.current(2000) < 0.0);
        assert!((cond.current(2148) - 7.32).abs() < 0.01);
    }

    #[test]
    fn soc_clamped() {
        let cond = conditioner();
        assert_eq!(cond.state_of_charge(0.0), 0.0);
        assert_eq!(cond.state_of_charge(60.0), 100.0);
        assert!((cond.state_of_charge(49.0) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn battery_average_ignores_absent_taps() {
        let mut cond = conditioner();
        let pulses = PulseTimers::new(&CalibrationConfig::default());

        let snapshot = cond.condition(&frame([3344, 0, 3344], 2048, 2048, 2048, 0), &pulses, None, 0);

        assert_eq!(snapshot.battery_v[1], 0.0);
        assert!((snapshot.battery_avg_v - 3344.0 * 0.01465).abs() < 0.01);
        assert_eq!(snapshot.raw_code(AnalogChannel::BatteryVoltage2), 0);
    }

    #[test]
    fn branch_power_uses_mean_voltage() {
        let mut cond = conditioner();
        let pulses = PulseTimers::new(&CalibrationConfig::default());

        // 3413 codes ≈ 50 V, solar 2185 codes ≈ +10 A, load 1912 codes ≈ -10 A
        let snapshot = cond.condition(&frame([3413; 3], 2185, 2048, 1912, 1000), &pulses, None, 0);

        assert!((snapshot.solar_w - 50.0 * 10.03).abs() < 5.0);
        assert!(snapshot.load_w < 0.0);
        assert_eq!(snapshot.wind_w, 0.0);
        assert!((snapshot.irradiance_w_m2 - 293.0).abs() < 0.01);
    }

    #[test]
    fn wind_speed_from_pulses() {
        let mut cond = conditioner();
        let pulses = PulseTimers::new(&CalibrationConfig::default());
        let idle = frame([0; 3], 2048, 2048, 2048, 0);

        cond.condition(&idle, &pulses, None, 0);
        for t in 0..20u32 {
            pulses.anemometer.record_edge(t * 1000);
        }
        // Window not elapsed: held at zero, pulses untouched
        assert_eq!(cond.condition(&idle, &pulses, None, 500).wind_speed_ms, 0.0);

        let snapshot = cond.condition(&idle, &pulses, None, 1_000);
        let expected = 2.0 * PI * 0.1 * 20.0 * 1.18;
        assert!((snapshot.wind_speed_ms - expected).abs() < 1e-3);

        // Held between windows
        assert_eq!(cond.condition(&idle, &pulses, None, 1_400).wind_speed_ms, snapshot.wind_speed_ms);
    }

    #[test]
    fn rotor_speed_from_electrical_frequency() {
        let cond = conditioner();
        // 100 Hz electrical on 10 pole pairs, direct drive → 600 RPM
        let (hz, rpm) = cond.rotor_speed(100.0);
        assert_eq!(hz, 100.0);
        assert!((rpm - 600.0).abs() < 1e-3);
    }

    #[test]
    fn temperature_fallback() {
        let mut cond = conditioner();
        let pulses = PulseTimers::new(&CalibrationConfig::default());
        let idle = frame([0; 3], 2048, 2048, 2048, 0);

        assert_eq!(cond.condition(&idle, &pulses, None, 0).temperature_c, 25.0);
        assert_eq!(cond.condition(&idle, &pulses, Some(31.5), 0).temperature_c, 31.5);
        assert_eq!(cond.condition(&idle, &pulses, Some(f32::NAN), 0).temperature_c, 25.0);
    }

    #[test]
    fn wind_dc_converges() {
        let mut cond = conditioner();
        let pulses = PulseTimers::new(&CalibrationConfig::default());
        let wind = frame([0; 3], 2048, 3000, 2048, 0);

        let mut last = 0.0;
        for tick in 0..200 {
            last = cond.condition(&wind, &pulses, None, tick * 100).front_end.wind_dc_v;
        }
        assert!((last - 3000.0 * 3.3 / 4095.0).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn floating_voltage_tap_reads_zero(code in 0u16..100) {
            prop_assert_eq!(conditioner().voltage(code), 0.0);
        }

        #[test]
        fn current_noise_floor_and_sign(code in 0u16..=4095) {
            let cond = conditioner();
            let offset = code as i32 - 2048;
            let magnitude = offset.unsigned_abs() as f32 * 0.0732;
            let current = cond.current(code);

            if magnitude < 0.5 {
                prop_assert_eq!(current, 0.0);
            } else if offset > 10 {
                prop_assert!(current > 0.0);
            } else if offset < -10 {
                prop_assert!(current < 0.0);
            }
        }

        #[test]
        fn soc_always_in_range(volts in -100.0f32..200.0) {
            let soc = conditioner().state_of_charge(volts);
            prop_assert!((0.0..=100.0).contains(&soc));
        }
    }
}
