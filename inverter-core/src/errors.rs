//! Error types for the control core
//!
//! Nothing in the sensing path returns an error: an absent or floating
//! sensor is reported as a zero value next to its raw ADC code (see
//! [`crate::conditioner`]). Errors only exist where a request can be refused:
//!
//! - [`InterlockError`]: the relay interlock refused or failed a transition
//! - [`ControlError`]: the controller refused a command while protection is active
//! - [`CommandError`]: an inbound command could not be decoded or queued
//!
//! All of them are small, carry no heap data and never halt the control loop.
//!
//! ```rust
//! use inverter_core::{InterlockError, RelayChannel};
//!
//! fn report(err: InterlockError) {
//!     match err {
//!         InterlockError::Rejected { channel, reason } => {
//!             // safety rule held, nothing was applied
//!             let _ = (channel, reason);
//!         }
//!         InterlockError::Output { channel } => {
//!             // GPIO driver failed, recorded state unchanged
//!             let _ = channel;
//!         }
//!     }
//! }
//! # report(InterlockError::Output { channel: RelayChannel::Grid });
//! ```

use heapless::String;
use thiserror_no_std::Error;

use crate::relay::RelayChannel;

/// Longest unknown command name kept for reporting
pub const MAX_COMMAND_NAME: usize = 24;

/// Longest rejected parameter kept for reporting
pub const MAX_PARAMETER: usize = 16;

/// Result type for relay interlock operations
pub type InterlockResult<T> = Result<T, InterlockError>;

/// Result type for controller command handling
pub type ControlResult<T> = Result<T, ControlError>;

/// Relay transition refused or failed by the interlock
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockError {
    /// A safety rule forbids the requested combination
    #[error("{channel} rejected: {reason}")]
    Rejected {
        /// Channel the request targeted
        channel: RelayChannel,
        /// Rule that refused it
        reason: &'static str,
    },

    /// The output driver reported a failure; recorded state was left unchanged
    #[error("output driver failed on {channel}")]
    Output {
        /// Channel whose pin write failed
        channel: RelayChannel,
    },
}

/// Command refused by the controller
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The interlock refused or failed the transition
    #[error("interlock: {0}")]
    Interlock(#[from] InterlockError),

    /// The channel is held by an active protection episode
    #[error("{channel} is held by an active protection episode")]
    ProtectionActive {
        /// Channel the command targeted
        channel: RelayChannel,
    },

    /// Dispatch cannot run while protection is tripped
    #[error("dispatch strategy blocked by active protection")]
    StrategyBlocked,
}

/// Inbound command could not be decoded or queued
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Command name is not part of the core command set
    #[error("unknown command: {name}")]
    Unknown {
        /// Name as received (truncated)
        name: String<MAX_COMMAND_NAME>,
    },

    /// Relay command with a parameter other than on/off/1/0
    #[error("invalid parameter for {command}: {parameter}")]
    InvalidParameter {
        /// Command the parameter belonged to
        command: &'static str,
        /// Parameter as received (truncated)
        parameter: String<MAX_PARAMETER>,
    },

    /// Command inbox is full; the command was dropped
    #[error("command inbox full")]
    InboxFull,
}

/// Copy as much of `text` as fits, cutting on a char boundary
pub(crate) fn truncated<const N: usize>(text: &str) -> String<N> {
    let mut out = String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

#[cfg(feature = "defmt")]
impl defmt::Format for InterlockError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Rejected { channel, reason } => {
                defmt::write!(fmt, "{} rejected: {}", channel, reason)
            }
            Self::Output { channel } => defmt::write!(fmt, "output driver failed on {}", channel),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Interlock(err) => defmt::write!(fmt, "interlock: {}", err),
            Self::ProtectionActive { channel } => {
                defmt::write!(fmt, "{} held by protection", channel)
            }
            Self::StrategyBlocked => defmt::write!(fmt, "dispatch blocked by protection"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CommandError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Unknown { name } => defmt::write!(fmt, "unknown command: {}", name.as_str()),
            Self::InvalidParameter { command, parameter } => {
                defmt::write!(fmt, "invalid parameter for {}: {}", command, parameter.as_str())
            }
            Self::InboxFull => defmt::write!(fmt, "command inbox full"),
        }
    }
}
