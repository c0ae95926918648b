//! Network boundary of the hybrid inverter controller
//!
//! Everything that crosses between the control core and the outside world
//! is decoded or encoded here, so the core never sees a string:
//!
//! ```text
//!  profiles/*.json ──► ProfileRegistry ──► CalibrationConfig ──► inverter-core
//!  {"command",..}  ──► decode_command  ──► Command ──► SharedStateStore inbox
//!  config patch    ──► DynamicConfigPatch::apply ──► update_dynamic_config
//!  store copies    ──► TelemetryFrame / FrontEndFrame ──► uplink (UplinkSequence)
//! ```
//!
//! ## Profiles
//!
//! Each hardware revision is one JSON file under `profiles/`, embedded at
//! build time. A profile is only handed out after
//! [`CalibrationConfig::validate`](inverter_core::CalibrationConfig::validate)
//! accepted it.
//!
//! ```rust
//! use inverter_schemas::{ProfileRegistry, DEFAULT_PROFILE};
//!
//! let registry = ProfileRegistry::load_embedded()?;
//! let calibration = registry.calibration(DEFAULT_PROFILE)?;
//! assert_eq!(calibration.protection.max_voltage_v, 58.0);
//! # Ok::<(), inverter_schemas::SchemaError>(())
//! ```

use inverter_core::{CommandError, ConfigError};

pub mod inbound;
pub mod profiles;
pub mod telemetry;

pub use inbound::{decode_command, decode_command_batch, DynamicConfigPatch};
pub use profiles::{Profile, ProfileRegistry, BUILTIN_PROFILES, DEFAULT_PROFILE};
pub use telemetry::{FrontEndFrame, RawAdcFrame, RelayFrame, TelemetryFrame, UplinkSequence};

/// Boundary errors
#[derive(Debug, thiserror_no_std::Error)]
pub enum SchemaError {
    /// Payload is not valid JSON for the expected shape
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Profile or field name not known
    #[error("not found: {0}")]
    NotFound(String),

    /// Profile parsed but failed calibration checks
    #[error("profile {profile} rejected: {source}")]
    InvalidProfile {
        /// Profile name
        profile: String,
        /// Check that failed
        source: ConfigError,
    },

    /// Command payload decoded but not accepted
    #[error("command rejected: {0}")]
    Command(#[from] CommandError),

    /// Patch value out of range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}
