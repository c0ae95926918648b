//! Outbound telemetry frames
//!
//! Field names follow the deployed backend, which predates this firmware and
//! keys everything in Spanish. Frames are built from copies taken out of the
//! store, so building one never holds a lock.

use core::sync::atomic::{AtomicU32, Ordering};

use inverter_core::{
    AnalogChannel, CalibrationConfig, ProtectionState, RelayState, SensorSnapshot,
};
use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Relay outputs as reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFrame {
    pub solar: bool,
    pub eolica: bool,
    pub red: bool,
    pub carga: bool,
    pub freno: bool,
}

impl From<&RelayState> for RelayFrame {
    fn from(state: &RelayState) -> Self {
        Self {
            solar: state.solar,
            eolica: state.wind,
            red: state.grid,
            carga: state.load,
            freno: state.brake,
        }
    }
}

/// Raw ADC codes and pin volts per channel, for field calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawAdcFrame {
    pub adc1_bat1: f32,
    pub adc1_bat1_raw: u16,
    pub adc2_bat2: f32,
    pub adc2_bat2_raw: u16,
    pub adc3_bat3: f32,
    pub adc3_bat3_raw: u16,
    pub adc4_solar: f32,
    pub adc4_solar_raw: u16,
    pub adc5_wind: f32,
    pub adc5_wind_raw: u16,
    pub adc6_load: f32,
    pub adc6_load_raw: u16,
    pub adc7_ldr: f32,
    pub adc7_ldr_raw: u16,
}

impl RawAdcFrame {
    /// Codes from `snapshot`, converted with the calibration's ADC reference
    pub fn new(snapshot: &SensorSnapshot, calibration: &CalibrationConfig) -> Self {
        let code = |channel| snapshot.raw_code(channel);
        let volts = |channel| calibration.adc.code_to_volts(snapshot.raw_code(channel));
        Self {
            adc1_bat1: volts(AnalogChannel::BatteryVoltage1),
            adc1_bat1_raw: code(AnalogChannel::BatteryVoltage1),
            adc2_bat2: volts(AnalogChannel::BatteryVoltage2),
            adc2_bat2_raw: code(AnalogChannel::BatteryVoltage2),
            adc3_bat3: volts(AnalogChannel::BatteryVoltage3),
            adc3_bat3_raw: code(AnalogChannel::BatteryVoltage3),
            adc4_solar: volts(AnalogChannel::SolarCurrent),
            adc4_solar_raw: code(AnalogChannel::SolarCurrent),
            adc5_wind: volts(AnalogChannel::WindCurrent),
            adc5_wind_raw: code(AnalogChannel::WindCurrent),
            adc6_load: volts(AnalogChannel::LoadCurrent),
            adc6_load_raw: code(AnalogChannel::LoadCurrent),
            adc7_ldr: volts(AnalogChannel::Irradiance),
            adc7_ldr_raw: code(AnalogChannel::Irradiance),
        }
    }
}

/// Full telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub device_id: String,
    pub firmware_version: String,
    /// Milliseconds since boot at capture
    pub timestamp: u64,
    /// Store sample number of the snapshot this frame was built from
    pub muestra: u32,
    pub voltaje_bat1: f32,
    pub voltaje_bat2: f32,
    pub voltaje_bat3: f32,
    pub voltaje_promedio: f32,
    pub corriente_solar: f32,
    pub corriente_eolica: f32,
    pub corriente_consumo: f32,
    pub potencia_solar: f32,
    pub potencia_eolica: f32,
    pub potencia_consumo: f32,
    pub irradiancia: f32,
    pub velocidad_viento: f32,
    pub frecuencia_electrica: f32,
    pub rpm_turbina: f32,
    pub soc: f32,
    pub temperatura: f32,
    pub relays: RelayFrame,
    /// `NORMAL` or `EMBALAMIENTO`
    pub proteccion_estado: String,
    pub embalamiento_detectado: bool,
    pub freno_activaciones: u32,
    pub raw_adc: RawAdcFrame,
}

impl TelemetryFrame {
    /// Assemble a frame from store copies
    pub fn new(
        device_id: &str,
        snapshot: &SensorSnapshot,
        protection: &ProtectionState,
        relays: &RelayState,
        calibration: &CalibrationConfig,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            firmware_version: inverter_core::VERSION.to_string(),
            timestamp: snapshot.timestamp,
            muestra: snapshot.sample,
            voltaje_bat1: snapshot.battery_v[0],
            voltaje_bat2: snapshot.battery_v[1],
            voltaje_bat3: snapshot.battery_v[2],
            voltaje_promedio: snapshot.battery_avg_v,
            corriente_solar: snapshot.solar_a,
            corriente_eolica: snapshot.wind_a,
            corriente_consumo: snapshot.load_a,
            potencia_solar: snapshot.solar_w,
            potencia_eolica: snapshot.wind_w,
            potencia_consumo: snapshot.load_w,
            irradiancia: snapshot.irradiance_w_m2,
            velocidad_viento: snapshot.wind_speed_ms,
            frecuencia_electrica: snapshot.electrical_hz,
            rpm_turbina: snapshot.turbine_rpm,
            soc: snapshot.soc_pct,
            temperatura: snapshot.temperature_c,
            relays: RelayFrame::from(relays),
            proteccion_estado: protection.status().as_str().to_string(),
            embalamiento_detectado: protection.active(),
            freno_activaciones: protection.activations,
            raw_adc: RawAdcFrame::new(snapshot, calibration),
        }
    }

    /// JSON body for the uplink
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Stage-1 front-end volts, sent on their own sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontEndFrame {
    pub device_id: String,
    pub seq: u32,
    /// Seconds since boot
    pub ts: u64,
    pub v_bat_v: f32,
    pub v_wind_v_dc: f32,
    pub v_solar_v: f32,
    pub v_load_v: f32,
}

impl FrontEndFrame {
    /// Frame for `snapshot`, numbered with the next uplink sequence value
    pub fn new(device_id: &str, seq: u32, snapshot: &SensorSnapshot) -> Self {
        let volts = snapshot.front_end;
        Self {
            device_id: device_id.to_string(),
            seq,
            ts: snapshot.timestamp / 1000,
            v_bat_v: volts.battery_v,
            v_wind_v_dc: volts.wind_dc_v,
            v_solar_v: volts.solar_v,
            v_load_v: volts.load_v,
        }
    }

    /// JSON body for the uplink
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sequence number of acknowledged uplinks
///
/// Only advances when the backend confirmed receipt, so gaps seen upstream
/// are lost packets rather than skipped numbers.
#[derive(Debug, Default)]
pub struct UplinkSequence {
    acknowledged: AtomicU32,
}

impl UplinkSequence {
    /// Sequence starting at zero
    pub const fn new() -> Self {
        Self { acknowledged: AtomicU32::new(0) }
    }

    /// Value to stamp on the next frame
    pub fn current(&self) -> u32 {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Record a confirmed uplink; returns the new value
    pub fn acknowledge(&self) -> u32 {
        self.acknowledged.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}
