//! Real-time core of the hybrid renewable inverter controller
//!
//! Measures the solar, wind, battery and load branches, protects the wind
//! turbine against overspeed and decides which sources feed the load.
//!
//! Key constraints:
//! - Runs on a single microcontroller (ESP32 class, dual core)
//! - No heap allocation anywhere in the control path
//! - Pulse counters are shared with interrupt context
//! - The protection engine has final authority over the relays
//!
//! ```no_run
//! use inverter_core::{
//!     config::CalibrationConfig, store::SharedStateStore, pulse::PulseTimers,
//! };
//!
//! static STORE: SharedStateStore = SharedStateStore::new();
//!
//! let calibration = CalibrationConfig::default();
//! let pulses = PulseTimers::new(&calibration);
//! let snapshots = STORE.take_snapshot_publisher().unwrap();
//! # let _ = (pulses, snapshots);
//! ```
//!
//! Task layout on the target:
//!
//! ```text
//!  edge ISR ──► PulseTimers ─┐
//!                            ▼
//!  acquisition task: AnalogFrontEnd ─► SignalConditioner ─► store.snapshot
//!                                                              │ copy
//!  control task:  ProtectionEngine ─► DispatchStrategy ─► RelayInterlock
//!                                                              │
//!  telemetry / dashboard ◄────────────── store (copy-then-release)
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod logging;

pub mod command;
pub mod conditioner;
pub mod config;
pub mod constants;
pub mod control;
pub mod dispatch;
pub mod errors;
pub mod filter;
pub mod frontend;
pub mod protection;
pub mod pulse;
pub mod relay;
pub mod snapshot;
pub mod store;
pub mod time;

// Public API
pub use command::Command;
pub use conditioner::SignalConditioner;
pub use config::{CalibrationConfig, ConfigError, DynamicConfig};
pub use control::{Acquisition, Controller, DispatchMode, TickReport};
pub use dispatch::{ChargeIntent, DispatchDecision, DispatchRule, DispatchStrategy};
pub use errors::{CommandError, ControlError, InterlockError};
pub use filter::Biquad;
pub use frontend::{AdcReader, AnalogChannel, AnalogFrontEnd, RawFrame};
pub use protection::{
    ProtectionEngine, ProtectionPhase, ProtectionState, ProtectionStatus, TripCauses,
};
pub use pulse::{PulseCounter, PulseTimers};
pub use relay::{PinBank, RelayChannel, RelayInterlock, RelayOutputs, RelayState};
pub use snapshot::SensorSnapshot;
pub use store::SharedStateStore;
pub use time::{FixedTime, TimeSource, Timestamp};

/// Crate version, reported in telemetry
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
