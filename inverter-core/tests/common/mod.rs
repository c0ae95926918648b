//! Shared fixtures for the integration tests
//!
//! - [`ScriptedAdc`]: per-channel codes set from physical values
//! - [`RecordingPin`]: relay pins writing into one shared journal, so tests
//!   can check the order in which outputs changed
//! - [`NoDelay`]: settle delays that return immediately
//! - [`Bench`]: store, controller and acquisition task wired together

#![allow(dead_code)]

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use inverter_core::{
    control::{Acquisition, Controller, TickReport},
    frontend::CHANNEL_COUNT,
    AdcReader, AnalogChannel, AnalogFrontEnd, CalibrationConfig, DispatchStrategy, PinBank,
    ProtectionEngine, PulseTimers, RelayChannel, RelayInterlock, SensorSnapshot,
    SharedStateStore, SignalConditioner, Timestamp,
};

/// ADC returning a settable code per channel
#[derive(Debug, Clone)]
pub struct ScriptedAdc {
    codes: [u16; CHANNEL_COUNT],
    pub reads: u32,
}

impl ScriptedAdc {
    /// Every current channel at its zero code, voltage taps floating
    pub fn idle() -> Self {
        let mut adc = Self { codes: [0; CHANNEL_COUNT], reads: 0 };
        for channel in [AnalogChannel::SolarCurrent, AnalogChannel::WindCurrent, AnalogChannel::LoadCurrent] {
            adc.set_code(channel, 2048);
        }
        adc
    }

    pub fn set_code(&mut self, channel: AnalogChannel, code: u16) {
        self.codes[channel.index()] = code;
    }

    /// All three battery taps at `volts`
    pub fn set_battery(&mut self, volts: f32) {
        let code = (volts / 0.01465).round() as u16;
        for channel in [
            AnalogChannel::BatteryVoltage1,
            AnalogChannel::BatteryVoltage2,
            AnalogChannel::BatteryVoltage3,
        ] {
            self.set_code(channel, code);
        }
    }

    /// Branch current in amps, positive into the bus
    pub fn set_current(&mut self, channel: AnalogChannel, amps: f32) {
        let code = 2048 + (amps / 0.0732).round() as i32;
        self.set_code(channel, code.clamp(0, 4095) as u16);
    }
}

impl AdcReader for ScriptedAdc {
    type Error = Infallible;

    fn read(&mut self, channel: AnalogChannel) -> nb::Result<u16, Infallible> {
        self.reads += 1;
        Ok(self.codes[channel.index()])
    }
}

/// Shared log of pin writes
pub type Journal = Rc<RefCell<Vec<(RelayChannel, bool)>>>;

/// Relay pin appending every write to a journal
pub struct RecordingPin {
    channel: RelayChannel,
    journal: Journal,
    level: bool,
}

impl RecordingPin {
    pub fn is_high(&self) -> bool {
        self.level
    }
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level = false;
        self.journal.borrow_mut().push((self.channel, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level = true;
        self.journal.borrow_mut().push((self.channel, true));
        Ok(())
    }
}

/// Pin bank over recording pins plus the journal they share
pub fn recording_bank() -> (PinBank<RecordingPin>, Journal) {
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let pin = |channel| RecordingPin { channel, journal: journal.clone(), level: false };
    let bank = PinBank::new(
        pin(RelayChannel::Solar),
        pin(RelayChannel::Wind),
        pin(RelayChannel::Grid),
        pin(RelayChannel::Load),
        pin(RelayChannel::Brake),
    );
    (bank, journal)
}

/// Delay that returns immediately
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Store with a `'static` lifetime so the tasks can borrow it freely
pub fn leaked_store() -> &'static SharedStateStore {
    Box::leak(Box::new(SharedStateStore::new()))
}

/// Everything needed to run the control loop on the host
pub struct Bench {
    pub store: &'static SharedStateStore,
    pub controller: Controller<'static, PinBank<RecordingPin>, NoDelay>,
    pub acquisition: Acquisition<'static>,
    pub pulses: PulseTimers,
    pub journal: Journal,
}

impl Bench {
    pub fn new(calibration: CalibrationConfig) -> Self {
        let store = leaked_store();
        let (bank, journal) = recording_bank();

        let relays = RelayInterlock::new(
            bank,
            NoDelay,
            calibration.protection.relay_settle_ms,
            store.take_relay_publisher().unwrap(),
            0,
        )
        .unwrap();
        let protection = ProtectionEngine::new(
            calibration.protection,
            store.take_protection_publisher().unwrap(),
        );
        let controller = Controller::new(
            store,
            protection,
            DispatchStrategy::new(calibration.dispatch),
            relays,
        );
        let acquisition = Acquisition::new(
            AnalogFrontEnd::new(calibration.sampling),
            SignalConditioner::new(&calibration),
            store.take_snapshot_publisher().unwrap(),
        );

        Self { store, controller, acquisition, pulses: PulseTimers::new(&calibration), journal }
    }

    /// Publish a synthetic snapshot and run one controller tick at `now`
    pub fn step(&mut self, snapshot: SensorSnapshot, now: Timestamp) -> TickReport {
        self.acquisition.publish(SensorSnapshot { timestamp: now, ..snapshot });
        self.controller.tick(now)
    }

    /// Relay writes recorded so far
    pub fn writes(&self) -> Vec<(RelayChannel, bool)> {
        self.journal.borrow().clone()
    }
}

/// Snapshot with a healthy 50 V battery and the given wind speed
pub fn wind_at(speed_ms: f32) -> SensorSnapshot {
    SensorSnapshot {
        wind_speed_ms: speed_ms,
        battery_avg_v: 50.0,
        soc_pct: 60.0,
        ..SensorSnapshot::empty()
    }
}

/// Snapshot with the battery at `volts`
pub fn battery_at(volts: f32) -> SensorSnapshot {
    SensorSnapshot { battery_avg_v: volts, soc_pct: 60.0, ..SensorSnapshot::empty() }
}

/// Drive the acquisition task from `start_ms` until a frame is published
///
/// Returns the sample number and the time the frame completed.
pub fn acquire_from(bench: &mut Bench, adc: &mut ScriptedAdc, start_ms: Timestamp) -> (u32, Timestamp) {
    let mut now_us = start_ms * 1000;
    loop {
        match bench.acquisition.poll(adc, &bench.pulses, Some(21.5), now_us) {
            Ok(sample) => return (sample, now_us / 1000),
            Err(nb::Error::WouldBlock) => now_us += 50,
            Err(nb::Error::Other(never)) => match never {},
        }
    }
}
