//! Profile in, commands in, telemetry out, around a live controller
#![cfg(test)]

use embedded_hal::delay::DelayNs;
use inverter_core::{
    Controller, DispatchMode, DispatchStrategy, ProtectionEngine, RelayChannel, RelayInterlock,
    RelayOutputs, SensorSnapshot, SharedStateStore,
};
use inverter_schemas::{
    decode_command_batch, DynamicConfigPatch, TelemetryFrame, UplinkSequence, BUILTIN_PROFILES,
    DEFAULT_PROFILE,
};

struct Outputs;

impl RelayOutputs for Outputs {
    type Error = ();

    fn drive(&mut self, _channel: RelayChannel, _on: bool) -> Result<(), ()> {
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[test]
fn remote_session() {
    let calibration = BUILTIN_PROFILES.calibration(DEFAULT_PROFILE).unwrap();
    let store: &'static SharedStateStore = Box::leak(Box::new(SharedStateStore::new()));

    let relays = RelayInterlock::new(
        Outputs,
        NoDelay,
        calibration.protection.relay_settle_ms,
        store.take_relay_publisher().unwrap(),
        0,
    )
    .unwrap();
    let protection =
        ProtectionEngine::new(calibration.protection, store.take_protection_publisher().unwrap());
    let mut controller =
        Controller::new(store, protection, DispatchStrategy::new(calibration.dispatch), relays);
    let mut publisher = store.take_snapshot_publisher().unwrap();

    // Configuration patch from the backend
    let patch = DynamicConfigPatch::from_json(r#"{"wind_power_w": 1500}"#).unwrap();
    store.update_dynamic_config(patch.apply(store.dynamic_config()).unwrap());

    publisher.publish(SensorSnapshot {
        timestamp: 1_000,
        battery_avg_v: 49.0,
        soc_pct: 50.0,
        wind_w: 1_600.0,
        load_w: 300.0,
        ..SensorSnapshot::empty()
    });

    // Poll response with one bad entry
    let json = r#"{"commands": [
        {"command": "carga", "parameter": "on"},
        {"command": "bogus"},
        {"command": "eolica", "parameter": "on"}
    ]}"#;
    for command in decode_command_batch(json).unwrap().into_iter().flatten() {
        store.push_command(command).unwrap();
    }
    assert_eq!(store.pending_commands(), 2);

    let report = controller.tick(1_000);
    assert!(report.commands.iter().all(|(_, result)| result.is_ok()));
    assert_eq!(controller.mode(), DispatchMode::Manual);
    assert!(store.protection_state().turbine_overload);

    let sequence = UplinkSequence::new();
    let frame = TelemetryFrame::new(
        "ESP32_001",
        &store.snapshot(),
        &store.protection_state(),
        &store.relay_state(),
        &calibration,
    );
    let json = frame.to_json().unwrap();
    sequence.acknowledge();

    assert!(json.contains(r#""proteccion_estado":"NORMAL""#));
    assert!(frame.relays.carga && frame.relays.eolica);
    assert_eq!(frame.muestra, 1);
    assert_eq!(sequence.current(), 1);
}
